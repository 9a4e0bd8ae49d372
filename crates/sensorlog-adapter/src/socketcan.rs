//! SocketCAN 总线适配器实现
//!
//! 基于 Linux SocketCAN 子系统，使用 CAN FD socket 同时接收经典帧与 FD 帧。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **比特率配置**：由系统工具（`ip link`）完成，`initialize` 不修改接口比特率
//! - **过滤器**：在用户态按 ID 范围过滤
//! - **时间戳**：使用软件接收时间（微秒）

use crate::{BusAdapter, BusConfig, BusStatus, CanDeviceError, CanDeviceErrorKind, CanError};
use crate::{FilterState, Parameter};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use sensorlog_protocol::{CanFrame, MessageType, dlc_for_length};
use socketcan::{CanAnyFrame, CanFdSocket, EmbeddedFrame, Frame, Socket};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use sensorlog_adapter::{BusAdapter, BusConfig, SocketCanBus};
///
/// let mut bus = SocketCanBus::new("can0");
/// let status = bus.initialize(&BusConfig::new("can0", 500_000));
/// assert!(status.is_usable());
/// ```
pub struct SocketCanBus {
    interface: String,
    socket: Option<CanFdSocket>,
    filter: FilterState,
    parameters: HashMap<Parameter, u32>,
}

impl SocketCanBus {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            socket: None,
            filter: FilterState::Open,
            parameters: HashMap::new(),
        }
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 打开接口（不经过 `initialize` 的状态码路径，错误信息更完整）
    pub fn open(&mut self) -> Result<(), CanError> {
        let socket = CanFdSocket::open(&self.interface).map_err(|e| {
            let kind = match e.kind() {
                io::ErrorKind::NotFound => CanDeviceErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => CanDeviceErrorKind::AccessDenied,
                _ => CanDeviceErrorKind::Backend,
            };
            CanError::Device(CanDeviceError::new(
                kind,
                format!("Failed to open CAN interface '{}': {}", self.interface, e),
            ))
        })?;
        socket.set_nonblocking(true).map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened (FD socket)", self.interface);
        self.socket = Some(socket);
        Ok(())
    }

    fn accepts(&self, frame: &CanFrame) -> bool {
        match self.filter {
            FilterState::Open => true,
            FilterState::Closed => false,
            FilterState::Custom(filter) => filter.accepts(frame),
        }
    }

    fn now_us() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    fn convert(frame: CanAnyFrame, timestamp_us: u64) -> CanFrame {
        match frame {
            CanAnyFrame::Normal(f) => {
                let msg_type = if f.is_extended() {
                    MessageType::EXTENDED
                } else {
                    MessageType::STANDARD
                };
                CanFrame::new(f.raw_id(), msg_type, f.data().len() as u8, f.data(), timestamp_us)
            },
            CanAnyFrame::Remote(f) => {
                let mut msg_type = MessageType::RTR;
                if f.is_extended() {
                    msg_type |= MessageType::EXTENDED;
                }
                CanFrame::new(f.raw_id(), msg_type, f.dlc() as u8, &[], timestamp_us)
            },
            CanAnyFrame::Error(f) => {
                CanFrame::new(f.raw_id(), MessageType::STATUS, f.data().len() as u8, f.data(), timestamp_us)
            },
            CanAnyFrame::Fd(f) => {
                let mut msg_type = MessageType::FD;
                if f.is_extended() {
                    msg_type |= MessageType::EXTENDED;
                }
                if f.is_brs() {
                    msg_type |= MessageType::BRS;
                }
                if f.is_esi() {
                    msg_type |= MessageType::ESI;
                }
                let data = f.data();
                CanFrame::new(f.raw_id(), msg_type, dlc_for_length(data.len()), data, timestamp_us)
            },
        }
    }
}

impl BusAdapter for SocketCanBus {
    fn initialize(&mut self, config: &BusConfig) -> BusStatus {
        if config.channel != self.interface {
            warn!(
                "Channel '{}' requested, adapter bound to '{}'",
                config.channel, self.interface
            );
        }
        if self.socket.is_some() {
            return BusStatus::IllegalOperation;
        }
        match self.open() {
            // 比特率由 ip link 决定，无法确认与请求值一致
            Ok(()) => BusStatus::Caution,
            Err(e) => {
                warn!("{}", e);
                BusStatus::Other(libc::ENODEV as u32)
            },
        }
    }

    fn uninitialize(&mut self) -> BusStatus {
        match self.socket.take() {
            Some(_) => BusStatus::Ok,
            None => BusStatus::IllegalOperation,
        }
    }

    fn read_frame(&mut self) -> Result<CanFrame, BusStatus> {
        loop {
            let socket = self.socket.as_ref().ok_or(BusStatus::IllegalOperation)?;
            let raw = match socket.read_frame() {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(BusStatus::QueueEmpty);
                },
                Err(e) => {
                    warn!("SocketCAN read failed on '{}': {}", self.interface, e);
                    return Err(BusStatus::Other(e.raw_os_error().unwrap_or(0) as u32));
                },
            };

            let frame = Self::convert(raw, Self::now_us());
            if self.accepts(&frame) {
                return Ok(frame);
            }
        }
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };

        use std::os::fd::BorrowedFd;
        let fd = socket.as_raw_fd();
        let pollfd = PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN);
        let timeout_ms = timeout.as_millis().min(65535) as u16;
        matches!(poll(&mut [pollfd], PollTimeout::from(timeout_ms)), Ok(n) if n > 0)
    }

    fn set_filter(&mut self, filter: FilterState) -> BusStatus {
        self.filter = filter;
        BusStatus::Ok
    }

    fn filter(&mut self) -> Result<FilterState, BusStatus> {
        Ok(self.filter)
    }

    fn set_parameter(&mut self, parameter: Parameter, value: u32) -> BusStatus {
        match parameter {
            // SocketCAN 没有对应的设置项，仅记录
            Parameter::TraceStatus | Parameter::ReceiveStatus => {
                self.parameters.insert(parameter, value);
                BusStatus::Ok
            },
            _ => BusStatus::IllegalParameter,
        }
    }

    fn parameter(&mut self, parameter: Parameter) -> Result<u32, BusStatus> {
        self.parameters
            .get(&parameter)
            .copied()
            .ok_or(BusStatus::IllegalParameter)
    }

    fn reset(&mut self) -> BusStatus {
        // 排空内核接收队列
        loop {
            match self.read_frame() {
                Ok(_) => continue,
                Err(BusStatus::QueueEmpty) => return BusStatus::Ok,
                Err(status) => return status,
            }
        }
    }

    fn status(&mut self) -> BusStatus {
        if self.socket.is_some() {
            BusStatus::Ok
        } else {
            BusStatus::IllegalOperation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_bus() {
        let mut bus = SocketCanBus::new("vcan_missing");
        assert_eq!(bus.interface(), "vcan_missing");
        assert_eq!(bus.read_frame(), Err(BusStatus::IllegalOperation));
        assert!(!bus.wait_for_frame(Duration::from_millis(1)));
        assert_eq!(bus.uninitialize(), BusStatus::IllegalOperation);
        assert_eq!(bus.status(), BusStatus::IllegalOperation);
    }

    #[test]
    fn test_missing_interface_fails() {
        let mut bus = SocketCanBus::new("sensorlog_no_such_if");
        let status = bus.initialize(&BusConfig::new("sensorlog_no_such_if", 500_000));
        assert!(!status.is_usable());
    }

    #[test]
    fn test_parameter_support() {
        let mut bus = SocketCanBus::new("can0");
        assert_eq!(bus.set_parameter(Parameter::TraceStatus, 1), BusStatus::Ok);
        assert_eq!(bus.parameter(Parameter::TraceStatus), Ok(1));
        assert_eq!(
            bus.set_parameter(Parameter::ListenOnly, 1),
            BusStatus::IllegalParameter
        );
    }
}
