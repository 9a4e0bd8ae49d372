//! 惯性传感器帧解析（逻辑 ID 0x306）
//!
//! 串口每帧 22 字节：
//!
//! ```text
//! [0]      同步字节 0xFF
//! [1..17]  8 个大端 i16：横滚角、俯仰角、横滚/俯仰/偏航角速度、X/Y/Z 加速度
//! [17..19] 温度（u16）
//! [19..21] 设备时间（u16）
//! [21]     校验和 = (bytes[1..=20] 按 u8 回绕求和) % 255
//! ```

use crate::payload::{Decoded, HexDigest, spaced_hex};

/// 帧长度
pub const INERTIAL_FRAME_LEN: usize = 22;

/// 同步字节
pub const SYNC_BYTE: u8 = 0xFF;

/// 同步搜索窗口：两帧加一个字节，保证窗口内必有完整帧及下一帧帧头
pub const SYNC_WINDOW_LEN: usize = 2 * INERTIAL_FRAME_LEN + 1;

/// i16 满量程
const FULL_SCALE: f64 = 32768.0;

/// 角度量程（度）
pub const ANGLE_SCALE: f64 = 180.0;

/// 角速度量程（度/秒）
pub const RATE_SCALE: f64 = 200.0 * 1.5;

/// 加速度量程（g），逐帧实时解码路径
///
/// 与导出路径量程不同，两者针对同一物理通道，尚待确认哪一个与设备配置一致，
/// 因此分别保留。
pub const ACC_SCALE_LIVE: f64 = 2.0 * 1.5;

/// 加速度量程（g），显示与导出路径
pub const ACC_SCALE_EXPORT: f64 = 4.0 * 1.5;

/// 加速度换算所用的量程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelScale {
    /// 逐帧实时解码（`ACC_SCALE_LIVE`）
    Live,
    /// 显示与导出（`ACC_SCALE_EXPORT`）
    Export,
}

impl AccelScale {
    pub fn factor(self) -> f64 {
        match self {
            AccelScale::Live => ACC_SCALE_LIVE,
            AccelScale::Export => ACC_SCALE_EXPORT,
        }
    }
}

/// 计算帧校验和
///
/// `frame` 不足 21 字节时只累加已有部分。
pub fn checksum(frame: &[u8]) -> u8 {
    let end = frame.len().min(INERTIAL_FRAME_LEN - 1);
    let sum = frame
        .iter()
        .take(end)
        .skip(1)
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum % 255
}

/// 帧校验：长度、同步字节、校验和
pub fn is_valid_frame(frame: &[u8]) -> bool {
    frame.len() >= INERTIAL_FRAME_LEN
        && frame[0] == SYNC_BYTE
        && checksum(frame) == frame[INERTIAL_FRAME_LEN - 1]
}

/// 在同步窗口中搜索帧边界
///
/// 返回为对齐到下一帧起点还需丢弃的字节数；窗口内没有可信帧边界时返回 `None`。
pub fn find_sync_offset(window: &[u8]) -> Option<usize> {
    if window.len() < SYNC_WINDOW_LEN {
        return None;
    }

    (0..INERTIAL_FRAME_LEN).find_map(|start| {
        let frame = &window[start..start + INERTIAL_FRAME_LEN];
        let next_header = window[start + INERTIAL_FRAME_LEN];
        if next_header != SYNC_BYTE || !is_valid_frame(frame) {
            return None;
        }
        // 窗口尾部已读入的下一帧字节数
        let trailing = SYNC_WINDOW_LEN - (start + INERTIAL_FRAME_LEN);
        Some((INERTIAL_FRAME_LEN - trailing % INERTIAL_FRAME_LEN) % INERTIAL_FRAME_LEN)
    })
}

/// 帧原始文本：`%02X` 以空格连接（末尾无空格）
pub fn frame_hex(frame: &[u8]) -> String {
    spaced_hex(frame)
}

/// 帧内原始字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InertialRaw {
    pub roll_angle: i16,
    pub pitch_angle: i16,
    pub roll_rate: i16,
    pub pitch_rate: i16,
    pub yaw_rate: i16,
    pub acc_x: i16,
    pub acc_y: i16,
    pub acc_z: i16,
    pub temperature: u16,
    pub time: u16,
}

impl InertialRaw {
    /// 换算为物理量
    pub fn scaled(&self, accel: AccelScale) -> InertialReading {
        let angle = |v: i16| v as f64 * ANGLE_SCALE / FULL_SCALE;
        let rate = |v: i16| v as f64 * RATE_SCALE / FULL_SCALE;
        let acc = |v: i16| v as f64 * accel.factor() / FULL_SCALE;

        InertialReading {
            roll_angle: angle(self.roll_angle),
            pitch_angle: angle(self.pitch_angle),
            roll_rate: rate(self.roll_rate),
            pitch_rate: rate(self.pitch_rate),
            yaw_rate: rate(self.yaw_rate),
            acc_x: acc(self.acc_x),
            acc_y: acc(self.acc_y),
            acc_z: acc(self.acc_z),
            temperature: temperature_celsius(self.temperature),
            time: self.time,
        }
    }
}

/// 物理量读数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InertialReading {
    /// 度
    pub roll_angle: f64,
    pub pitch_angle: f64,
    /// 度/秒
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    /// g
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    /// 摄氏度
    pub temperature: f64,
    pub time: u16,
}

/// 温度换算：`((raw × 5 / 4096) − 1.375) × 44.44`
pub fn temperature_celsius(raw: u16) -> f64 {
    ((raw as f64 * 5.0 / 4096.0) - 1.375) * 44.44
}

/// 坏帧比例：`(总帧数 − 有效帧数) / 总帧数`，总帧数为 0 时为 0
pub fn bad_ratio(count: u64, effective: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        count.saturating_sub(effective) as f64 / count as f64
    }
}

/// 解码十六进制摘要形式的惯性帧
///
/// 不足 22 字节时缺失字段置零，返回 `Decoded::Partial`。
pub fn decode_inertial(frame_hex: &str) -> Decoded<InertialRaw> {
    decode_inertial_digest(&HexDigest::parse(frame_hex))
}

/// 解码已解析的摘要
pub fn decode_inertial_digest(d: &HexDigest) -> Decoded<InertialRaw> {
    let i16_at = |offset: usize| d.i16_be(offset).unwrap_or_default();

    let raw = InertialRaw {
        roll_angle: i16_at(1),
        pitch_angle: i16_at(3),
        roll_rate: i16_at(5),
        pitch_rate: i16_at(7),
        yaw_rate: i16_at(9),
        acc_x: i16_at(11),
        acc_y: i16_at(13),
        acc_z: i16_at(15),
        temperature: d.u16_be(17).unwrap_or_default(),
        time: d.u16_be(19).unwrap_or_default(),
    };

    if d.covers(INERTIAL_FRAME_LEN) {
        Decoded::Complete(raw)
    } else {
        Decoded::Partial(raw)
    }
}
