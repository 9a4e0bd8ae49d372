//! 十六进制摘要与带默认值的解码约定
//!
//! 总线/串口采集到的原始数据以十六进制文本形式记录（每字节 2 个字符，可含空格）。
//! 解码时按固定字节偏移读取字段；文本残缺或含非法字符时，缺失字段取零值，
//! 解码结果标记为 [`Decoded::Partial`]，从不返回错误。

use thiserror::Error;

/// 载荷解码错误
///
/// 数据残缺不属于错误（见 [`Decoded::Partial`]），只有无法识别的报文 ID 会失败。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown message ID: 0x{0:X}")]
    UnknownId(u32),
}

/// 解码结果
///
/// - `Complete`: 所有字段都来自输入数据
/// - `Partial`: 输入不足或含非法字符，缺失字段已置为默认值
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Complete(T),
    Partial(T),
}

impl<T> Decoded<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Decoded::Complete(_))
    }

    pub fn record(&self) -> &T {
        match self {
            Decoded::Complete(r) | Decoded::Partial(r) => r,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Decoded::Complete(r) | Decoded::Partial(r) => r,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Complete(r) => Decoded::Complete(f(r)),
            Decoded::Partial(r) => Decoded::Partial(f(r)),
        }
    }
}

/// 已解析的十六进制摘要
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HexDigest {
    bytes: Vec<u8>,
    malformed: bool,
}

impl HexDigest {
    /// 解析十六进制文本（忽略空白）
    ///
    /// 遇到非法字符或奇数长度时停止，已解析的前缀保留，并标记为残缺。
    pub fn parse(text: &str) -> Self {
        let compact: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        let mut bytes = Vec::with_capacity(compact.len() / 2);
        let mut malformed = compact.len() % 2 != 0;

        for pair in compact.chunks_exact(2) {
            let mut out = [0u8; 1];
            if hex::decode_to_slice(pair, &mut out).is_err() {
                malformed = true;
                break;
            }
            bytes.push(out[0]);
        }

        Self { bytes, malformed }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            malformed: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// 是否至少包含 `needed` 字节且无非法字符
    pub fn covers(&self, needed: usize) -> bool {
        !self.malformed && self.bytes.len() >= needed
    }

    fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let slice = self.bytes.get(offset..offset + N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Some(out)
    }

    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    pub fn u16_be(&self, offset: usize) -> Option<u16> {
        self.array::<2>(offset).map(crate::bytes_to_u16_be)
    }

    pub fn i16_be(&self, offset: usize) -> Option<i16> {
        self.array::<2>(offset).map(crate::bytes_to_i16_be)
    }

    pub fn u24_be(&self, offset: usize) -> Option<u32> {
        self.array::<3>(offset).map(crate::bytes_to_u24_be)
    }

    pub fn i24_be(&self, offset: usize) -> Option<i32> {
        self.array::<3>(offset).map(crate::bytes_to_i24_be)
    }

    pub fn u32_be(&self, offset: usize) -> Option<u32> {
        self.array::<4>(offset).map(crate::bytes_to_u32_be)
    }

    pub fn i32_be(&self, offset: usize) -> Option<i32> {
        self.array::<4>(offset).map(crate::bytes_to_i32_be)
    }

    /// 紧凑大写十六进制（无空格）
    pub fn to_compact(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

/// 紧凑大写十六进制（无空格）
pub fn compact_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// 空格分隔的大写十六进制（末尾无空格）
pub fn spaced_hex(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&format!("{:02X}", byte));
    }
    text
}

/// 去除文本中的全部空白
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
