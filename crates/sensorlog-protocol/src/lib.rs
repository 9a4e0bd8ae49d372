//! # Sensorlog Protocol
//!
//! CAN/CAN-FD 帧编解码与传感器载荷解析（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 报文 ID 常量定义
//! - `frame`: 帧记录、DLC 长度表、显示格式化
//! - `payload`: 十六进制摘要解析（带默认值的解码约定）
//! - `gps`: GPS 报文（0x301-0x305）解析
//! - `inertial`: 惯性传感器帧（0x306，22 字节串口记录）解析
//!
//! ## 字节序
//!
//! GPS 与惯性传感器载荷均为 Motorola (MSB) 高位在前（大端字节序）。
//! 本模块提供了字节序转换工具函数。

pub mod frame;
pub mod gps;
pub mod ids;
pub mod inertial;
pub mod payload;

// 重新导出常用类型
pub use frame::*;
pub use gps::*;
pub use ids::*;
pub use inertial::*;
pub use payload::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Invalid DLC: {0}")]
    InvalidDlc(u8),
}

/// 字节序转换工具函数
///
/// 大端字节序转 i32
pub fn bytes_to_i32_be(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// 大端字节序转 u32
pub fn bytes_to_u32_be(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 大端 24 位无符号整数
pub fn bytes_to_u24_be(bytes: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

/// 大端 24 位有符号整数（二进制补码，最高位为符号位）
pub fn bytes_to_i24_be(bytes: [u8; 3]) -> i32 {
    let raw = bytes_to_u24_be(bytes) as i32;
    if bytes[0] & 0x80 != 0 {
        raw - 0x100_0000
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_i32_be() {
        assert_eq!(bytes_to_i32_be([0x12, 0x34, 0x56, 0x78]), 0x12345678);
        assert_eq!(bytes_to_i32_be([0xFF, 0xFF, 0xFF, 0xFF]), -1);
    }

    #[test]
    fn test_bytes_to_u32_be() {
        assert_eq!(bytes_to_u32_be([0xFF, 0xFF, 0xFF, 0xFF]), u32::MAX);
    }

    #[test]
    fn test_bytes_to_i16_be_negative() {
        assert_eq!(bytes_to_i16_be([0xFF, 0xFE]), -2);
        assert_eq!(bytes_to_u16_be([0xFF, 0xFE]), 0xFFFE);
    }

    #[test]
    fn test_bytes_to_u24_be() {
        assert_eq!(bytes_to_u24_be([0x12, 0x34, 0x56]), 0x123456);
    }

    #[test]
    fn test_bytes_to_i24_be_sign_extension() {
        assert_eq!(bytes_to_i24_be([0x7F, 0xFF, 0xFF]), 0x7FFFFF);
        assert_eq!(bytes_to_i24_be([0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(bytes_to_i24_be([0x80, 0x00, 0x00]), -0x800000);
    }
}
