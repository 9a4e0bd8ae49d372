//! USB 串口设备抽象
//!
//! 惯性传感器与快门控制器都挂在 USB 串口芯片上，按设备序列号定位。
//! 核心逻辑只依赖 [`SerialDevice`] 与 [`ShutterSwitch`] 两个 trait。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
mod usb;

#[cfg(feature = "serial")]
pub use usb::{UsbSerialDevice, UsbShutterSwitch, list_devices};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 惯性传感器的 USB 序列号
pub const INERTIAL_DEVICE_SERIAL: &str = "FTU7GDEE";

/// 快门控制器的 USB 序列号
pub const SHUTTER_DEVICE_SERIAL: &str = "FTH7PDPZ";

/// 串口错误
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial device not found: {0}")]
    NotFound(String),
    #[error("Serial backend error: {0}")]
    Backend(String),
    #[error("Serial device closed")]
    Closed,
}

/// 数据位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

/// 校验位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// 停止位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// 帧格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl DataFormat {
    /// 8N1
    pub const EIGHT_N_ONE: DataFormat = DataFormat {
        data_bits: DataBits::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
    };
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::EIGHT_N_ONE
    }
}

/// 流控
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    #[default]
    None,
    RtsCts,
    XonXoff,
}

/// 串口设备
///
/// `read` 的语义是"读满缓冲区或读超时"：返回实际读到的字节数，
/// 超时且未读到任何字节时返回 `Ok(0)`。
pub trait SerialDevice: Send {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), SerialError>;

    fn set_data_format(&mut self, format: DataFormat) -> Result<(), SerialError>;

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<(), SerialError>;

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<(), SerialError>;

    /// 写入字节，返回写入数量
    fn write(&mut self, data: &[u8]) -> Result<usize, SerialError>;

    /// 读取字节，直到缓冲区写满或超时
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    fn close(&mut self) -> Result<(), SerialError>;
}

impl<T: SerialDevice + ?Sized> SerialDevice for Box<T> {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), SerialError> {
        (**self).set_baud_rate(baud)
    }

    fn set_data_format(&mut self, format: DataFormat) -> Result<(), SerialError> {
        (**self).set_data_format(format)
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<(), SerialError> {
        (**self).set_flow_control(flow)
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<(), SerialError> {
        (**self).set_timeouts(read, write)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).read(buf)
    }

    fn close(&mut self) -> Result<(), SerialError> {
        (**self).close()
    }
}

/// 快门玻璃开关（RTS 线电平）
pub trait ShutterSwitch: Send {
    fn set(&mut self, on: bool) -> Result<(), SerialError>;
}

impl<T: ShutterSwitch + ?Sized> ShutterSwitch for Box<T> {
    fn set(&mut self, on: bool) -> Result<(), SerialError> {
        (**self).set(on)
    }
}
