//! CAN/CAN-FD 帧记录与编解码
//!
//! 提供 DLC 到载荷长度的映射、帧类型分类、以及显示用的 ID/数据格式化。
//! 所有函数均为无状态纯函数。

use crate::ProtocolError;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// CAN FD 帧最大载荷长度
pub const MAX_FD_PAYLOAD: usize = 64;

/// 经典 CAN 帧最大载荷长度
pub const MAX_CLASSIC_PAYLOAD: usize = 8;

/// 远程帧的数据显示占位
pub const REMOTE_REQUEST_TEXT: &str = "Remote Request";

/// 将 DLC 转换为实际载荷长度
///
/// - `dlc <= 8`：原样返回
/// - 标准 CAN 帧（非 FD）：大于 8 一律截断为 8
/// - FD 帧：9..=15 映射到 12/16/20/24/32/48/64
/// - 超出 0..=15 的值原样返回（上游可能存在问题，调用方自行处理）
pub fn payload_length(dlc: u8, is_standard: bool) -> usize {
    if dlc <= 8 {
        return dlc as usize;
    }

    if is_standard {
        return MAX_CLASSIC_PAYLOAD;
    }

    match dlc {
        9 => 12,
        10 => 16,
        11 => 20,
        12 => 24,
        13 => 32,
        14 => 48,
        15 => 64,
        _ => dlc as usize,
    }
}

/// 将载荷长度反推为 DLC（取能容纳该长度的最小 DLC）
pub fn dlc_for_length(len: usize) -> u8 {
    match len {
        0..=8 => len as u8,
        9..=12 => 9,
        13..=16 => 10,
        17..=20 => 11,
        21..=24 => 12,
        25..=32 => 13,
        33..=48 => 14,
        _ => 15,
    }
}

/// 报文类型位标志
///
/// 位定义与常见 CAN 适配器驱动保持一致，可直接从驱动返回值构造。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageType(u8);

impl MessageType {
    pub const STANDARD: Self = Self(0x00);
    pub const RTR: Self = Self(0x01);
    pub const EXTENDED: Self = Self(0x02);
    pub const FD: Self = Self(0x04);
    pub const BRS: Self = Self(0x08);
    pub const ESI: Self = Self(0x10);
    pub const STATUS: Self = Self(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_extended(self) -> bool {
        self.contains(Self::EXTENDED)
    }

    pub fn is_remote(self) -> bool {
        self.contains(Self::RTR)
    }

    pub fn is_fd(self) -> bool {
        self.contains(Self::FD)
    }

    pub fn is_status(self) -> bool {
        self.contains(Self::STATUS)
    }

    /// 是否为标准 CAN（未置 FD 位）
    pub fn is_standard_can(self) -> bool {
        !self.is_fd()
    }
}

impl BitOr for MessageType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// 经典 CAN 驱动返回的分段时间戳
///
/// 换算为微秒：`micros + 1000 * millis + 0x1_0000_0000 * 1000 * millis_overflow`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegacyTimestamp {
    pub millis: u32,
    pub millis_overflow: u16,
    pub micros: u16,
}

impl LegacyTimestamp {
    pub fn as_micros(&self) -> u64 {
        self.micros as u64
            + 1000 * self.millis as u64
            + 0x1_0000_0000u64 * 1000 * self.millis_overflow as u64
    }
}

/// 接收到的 CAN/CAN-FD 帧
///
/// 载荷固定 64 字节存储，避免堆分配；有效长度由 `dlc` 和 FD 标志决定。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 报文类型位标志
    pub msg_type: MessageType,

    /// 数据长度码 (0-15)
    pub dlc: u8,

    /// 帧数据（未使用部分为 0）
    data: [u8; MAX_FD_PAYLOAD],

    /// 到达时间戳（微秒）
    pub timestamp_us: u64,
}

impl CanFrame {
    /// 通用构造器
    ///
    /// `data` 超出 64 字节的部分被丢弃。
    pub fn new(id: u32, msg_type: MessageType, dlc: u8, data: &[u8], timestamp_us: u64) -> Self {
        let mut fixed = [0u8; MAX_FD_PAYLOAD];
        let len = data.len().min(MAX_FD_PAYLOAD);
        fixed[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            msg_type,
            dlc,
            data: fixed,
            timestamp_us,
        }
    }

    /// 创建标准数据帧，DLC 由数据长度推导
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        let len = data.len().min(MAX_CLASSIC_PAYLOAD);
        Self::new(id as u32, MessageType::STANDARD, len as u8, &data[..len], 0)
    }

    /// 创建扩展数据帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        let len = data.len().min(MAX_CLASSIC_PAYLOAD);
        Self::new(id, MessageType::EXTENDED, len as u8, &data[..len], 0)
    }

    /// 创建 FD 数据帧
    pub fn new_fd(id: u32, extended: bool, brs: bool, data: &[u8]) -> Self {
        let mut msg_type = MessageType::FD;
        if extended {
            msg_type |= MessageType::EXTENDED;
        }
        if brs {
            msg_type |= MessageType::BRS;
        }
        let len = data.len().min(MAX_FD_PAYLOAD);
        Self::new(id, msg_type, dlc_for_length(len), &data[..len], 0)
    }

    /// 由经典 CAN 驱动记录转换
    ///
    /// 经典帧最多携带 8 字节，`len` 大于 8 时只复制前 8 字节，DLC 保留原值。
    pub fn from_legacy(
        id: u32,
        msg_type: MessageType,
        len: u8,
        data: [u8; MAX_CLASSIC_PAYLOAD],
        timestamp: LegacyTimestamp,
    ) -> Self {
        let copied = (len as usize).min(MAX_CLASSIC_PAYLOAD);
        Self::new(id, msg_type, len, &data[..copied], timestamp.as_micros())
    }

    /// 设置时间戳（builder 风格）
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// 有效载荷长度
    pub fn payload_len(&self) -> usize {
        payload_length(self.dlc, self.msg_type.is_standard_can()).min(MAX_FD_PAYLOAD)
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.payload_len()]
    }

    pub fn is_extended(&self) -> bool {
        self.msg_type.is_extended()
    }

    pub fn is_remote(&self) -> bool {
        self.msg_type.is_remote()
    }

    /// 帧类型文本（STATUS / STD / EXT / STD/RTR / EXT [ FD BRS ESI ] 等）
    pub fn type_string(&self) -> String {
        classify(self.msg_type)
    }

    /// ID 文本：扩展帧 8 位、标准帧 3 位十六进制，后缀 `h`
    pub fn id_string(&self) -> String {
        format_id(self.id, self.is_extended())
    }

    /// 数据文本：每字节前置空格的十六进制；远程帧返回占位文本
    pub fn data_string(&self) -> String {
        if self.is_remote() {
            return REMOTE_REQUEST_TEXT.to_string();
        }
        format_data(self.data_slice())
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanFrame")
            .field("id", &format_args!("0x{:X}", self.id))
            .field("msg_type", &format_args!("0x{:02X}", self.msg_type.bits()))
            .field("dlc", &self.dlc)
            .field("data", &self.data_slice())
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}

/// 帧类型分类
///
/// 状态帧直接返回 `STATUS`；远程帧忽略 FD 子标志；
/// 其余情况下存在 FD/BRS/ESI 任一标志时追加 ` [  FD BRS ESI ]` 片段。
pub fn classify(msg_type: MessageType) -> String {
    if msg_type.is_status() {
        return "STATUS".to_string();
    }

    let mut text = String::from(if msg_type.is_extended() { "EXT" } else { "STD" });

    if msg_type.is_remote() {
        text.push_str("/RTR");
    } else if msg_type.bits() > MessageType::EXTENDED.bits() {
        text.push_str(" [ ");
        if msg_type.contains(MessageType::FD) {
            text.push_str(" FD");
        }
        if msg_type.contains(MessageType::BRS) {
            text.push_str(" BRS");
        }
        if msg_type.contains(MessageType::ESI) {
            text.push_str(" ESI");
        }
        text.push_str(" ]");
    }

    text
}

/// 格式化 ID
pub fn format_id(id: u32, extended: bool) -> String {
    if extended {
        format!("{:08X}h", id)
    } else {
        format!("{:03X}h", id)
    }
}

/// 解析 `format_id` 的输出，返回数值 ID
pub fn parse_id(text: &str) -> Option<u32> {
    let trimmed = text.trim().trim_end_matches('h');
    u32::from_str_radix(trimmed, 16).ok()
}

/// 格式化数据字节：` %02X` 逐字节拼接
pub fn format_data(data: &[u8]) -> String {
    let mut text = String::with_capacity(data.len() * 3);
    for byte in data {
        text.push_str(&format!(" {:02X}", byte));
    }
    text
}

// ============================================================================
// 驱动原始记录解析
// ============================================================================

/// FD 驱动记录长度：ID(4, LE) + MSGTYPE(1) + DLC(1) + DATA(64)
pub const FD_RECORD_LEN: usize = 70;

/// 经典驱动记录长度：ID(4, LE) + MSGTYPE(1) + LEN(1) + DATA(8)
pub const CLASSIC_RECORD_LEN: usize = 14;

/// 解析 FD 驱动返回的原始记录
///
/// # 错误
/// - `ProtocolError::InvalidLength`: 缓冲区不足 70 字节
/// - `ProtocolError::InvalidDlc`: DLC 超出 0..=15
pub fn parse_fd_record(buf: &[u8], timestamp_us: u64) -> Result<CanFrame, ProtocolError> {
    if buf.len() < FD_RECORD_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: FD_RECORD_LEN,
            actual: buf.len(),
        });
    }

    let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let msg_type = MessageType::from_bits(buf[4]);
    let dlc = buf[5];
    if dlc > 15 {
        return Err(ProtocolError::InvalidDlc(dlc));
    }
    validate_id(id, msg_type)?;

    Ok(CanFrame::new(id, msg_type, dlc, &buf[6..FD_RECORD_LEN], timestamp_us))
}

/// 解析经典驱动返回的原始记录（分段时间戳）
pub fn parse_classic_record(
    buf: &[u8],
    timestamp: LegacyTimestamp,
) -> Result<CanFrame, ProtocolError> {
    if buf.len() < CLASSIC_RECORD_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: CLASSIC_RECORD_LEN,
            actual: buf.len(),
        });
    }

    let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let msg_type = MessageType::from_bits(buf[4]);
    validate_id(id, msg_type)?;

    let mut data = [0u8; MAX_CLASSIC_PAYLOAD];
    data.copy_from_slice(&buf[6..CLASSIC_RECORD_LEN]);
    Ok(CanFrame::from_legacy(id, msg_type, buf[5], data, timestamp))
}

fn validate_id(id: u32, msg_type: MessageType) -> Result<(), ProtocolError> {
    let limit = if msg_type.is_extended() { 0x1FFF_FFFF } else { 0x7FF };
    if id > limit && !msg_type.is_status() {
        return Err(ProtocolError::InvalidCanId { id });
    }
    Ok(())
}
