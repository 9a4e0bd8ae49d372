//! # Sensorlog Adapter Layer
//!
//! 硬件抽象层：CAN 总线适配器与 USB 串口设备的统一接口。
//!
//! 核心逻辑只关心"读一帧或超时"、"写 N 字节再读回 M 字节"这类操作，
//! 具体驱动（SocketCAN、USB 串口、测试用 mock）在各自模块中实现。

use sensorlog_protocol::CanFrame;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod serial;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanBus;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use serial::{
    DataBits, DataFormat, FlowControl, INERTIAL_DEVICE_SERIAL, Parity, SHUTTER_DEVICE_SERIAL,
    SerialDevice, SerialError, ShutterSwitch, StopBits,
};

/// 适配器操作的状态码
///
/// 对核心逻辑而言只有三类结果有意义：成功、"比特率与请求不一致"的警告、其他失败。
/// 读取时另有"队列为空"（正常的排空结束标志）和"非法操作"（立即中止排空）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    Ok,
    /// 初始化成功，但实际比特率与请求值不同
    Caution,
    /// 接收队列为空
    QueueEmpty,
    /// 通道未初始化或操作不被允许
    IllegalOperation,
    /// 参数不被当前后端支持
    IllegalParameter,
    /// 其他驱动错误码
    Other(u32),
}

impl BusStatus {
    pub fn is_ok(self) -> bool {
        self == BusStatus::Ok
    }

    /// 初始化结果是否可以继续（`Caution` 视为成功）
    pub fn is_usable(self) -> bool {
        matches!(self, BusStatus::Ok | BusStatus::Caution)
    }

    pub fn into_result(self) -> Result<(), CanError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(CanError::Status(self))
        }
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusStatus::Ok => write!(f, "OK"),
            BusStatus::Caution => write!(f, "bitrate differs from the requested one"),
            BusStatus::QueueEmpty => write!(f, "receive queue empty"),
            BusStatus::IllegalOperation => write!(f, "illegal operation"),
            BusStatus::IllegalParameter => write!(f, "illegal parameter"),
            BusStatus::Other(code) => write!(f, "driver error 0x{:X}", code),
        }
    }
}

/// 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Adapter status: {0}")]
    Status(BusStatus),
    #[error("Device not started")]
    NotStarted,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::AccessDenied | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 通道初始化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// 通道名（如 "can0"）
    pub channel: String,
    /// 经典 CAN 比特率（bit/s）
    pub bitrate: u32,
    /// CAN FD 比特率描述串；`Some` 时以 FD 模式初始化
    pub fd_bitrate: Option<String>,
}

impl BusConfig {
    pub fn new(channel: impl Into<String>, bitrate: u32) -> Self {
        Self {
            channel: channel.into(),
            bitrate,
            fd_bitrate: None,
        }
    }

    pub fn with_fd(mut self, fd_bitrate: impl Into<String>) -> Self {
        self.fd_bitrate = Some(fd_bitrate.into());
        self
    }

    pub fn is_fd(&self) -> bool {
        self.fd_bitrate.is_some()
    }
}

/// 报文 ID 范围过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFilter {
    pub from: u32,
    pub to: u32,
    pub extended: bool,
}

impl MessageFilter {
    pub fn new(from: u32, to: u32, extended: bool) -> Self {
        Self {
            from: from.min(to),
            to: from.max(to),
            extended,
        }
    }

    pub fn accepts(&self, frame: &CanFrame) -> bool {
        (self.from..=self.to).contains(&frame.id) && (self.extended || !frame.is_extended())
    }
}

/// 过滤器当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// 全部放行
    Open,
    /// 全部拦截
    Closed,
    /// 按范围放行
    Custom(MessageFilter),
}

/// 可读写的适配器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    ListenOnly,
    BusOffAutoReset,
    ReceiveStatus,
    TraceStatus,
    ChannelIdentifying,
    BitrateAdapting,
}

/// CAN 总线适配器
///
/// 所有操作都返回不透明的状态码；核心逻辑只区分成功与失败
/// （以及初始化时的 `Caution`）。
pub trait BusAdapter: Send {
    /// 初始化通道
    fn initialize(&mut self, config: &BusConfig) -> BusStatus;

    /// 释放通道
    fn uninitialize(&mut self) -> BusStatus;

    /// 从接收队列取出一帧
    ///
    /// 队列为空时返回 `Err(BusStatus::QueueEmpty)`。
    fn read_frame(&mut self) -> Result<CanFrame, BusStatus>;

    /// 等待帧到达信号
    ///
    /// 有帧可读时返回 `true`，超时返回 `false`。
    fn wait_for_frame(&mut self, timeout: Duration) -> bool;

    fn set_filter(&mut self, filter: FilterState) -> BusStatus;

    fn filter(&mut self) -> Result<FilterState, BusStatus>;

    fn set_parameter(&mut self, parameter: Parameter, value: u32) -> BusStatus;

    fn parameter(&mut self, parameter: Parameter) -> Result<u32, BusStatus>;

    /// 清空收发队列
    fn reset(&mut self) -> BusStatus;

    /// 通道状态
    fn status(&mut self) -> BusStatus;
}

impl<T: BusAdapter + ?Sized> BusAdapter for Box<T> {
    fn initialize(&mut self, config: &BusConfig) -> BusStatus {
        (**self).initialize(config)
    }

    fn uninitialize(&mut self) -> BusStatus {
        (**self).uninitialize()
    }

    fn read_frame(&mut self) -> Result<CanFrame, BusStatus> {
        (**self).read_frame()
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> bool {
        (**self).wait_for_frame(timeout)
    }

    fn set_filter(&mut self, filter: FilterState) -> BusStatus {
        (**self).set_filter(filter)
    }

    fn filter(&mut self) -> Result<FilterState, BusStatus> {
        (**self).filter()
    }

    fn set_parameter(&mut self, parameter: Parameter, value: u32) -> BusStatus {
        (**self).set_parameter(parameter, value)
    }

    fn parameter(&mut self, parameter: Parameter) -> Result<u32, BusStatus> {
        (**self).parameter(parameter)
    }

    fn reset(&mut self) -> BusStatus {
        (**self).reset()
    }

    fn status(&mut self) -> BusStatus {
        (**self).status()
    }
}
