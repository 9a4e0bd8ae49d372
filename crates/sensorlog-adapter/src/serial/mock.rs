//! 脚本化 Mock 串口
//!
//! - [`MockSerialHandle::feed`] 向接收缓冲追加字节
//! - [`MockSerialHandle::respond`] 登记"写入某命令后自动回送"的应答
//! - `read` 在读超时内等待数据，读满或超时即返回

use super::{DataFormat, FlowControl, SerialDevice, SerialError, ShutterSwitch};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockSerialState {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    responses: HashMap<Vec<u8>, Vec<u8>>,
    baud: u32,
    format: Option<DataFormat>,
    flow: Option<FlowControl>,
    read_timeout: Duration,
    closed: bool,
}

struct MockSerialShared {
    state: Mutex<MockSerialState>,
    arrived: Condvar,
}

pub struct MockSerialDevice {
    shared: Arc<MockSerialShared>,
}

#[derive(Clone)]
pub struct MockSerialHandle {
    shared: Arc<MockSerialShared>,
}

impl Default for MockSerialDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerialDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockSerialShared {
                state: Mutex::new(MockSerialState {
                    read_timeout: Duration::from_millis(10),
                    ..Default::default()
                }),
                arrived: Condvar::new(),
            }),
        }
    }

    pub fn handle(&self) -> MockSerialHandle {
        MockSerialHandle {
            shared: self.shared.clone(),
        }
    }
}

impl MockSerialHandle {
    pub fn feed(&self, bytes: &[u8]) {
        self.shared.state.lock().rx.extend(bytes.iter().copied());
        self.shared.arrived.notify_all();
    }

    /// 写入 `command` 后把 `reply` 追加到接收缓冲
    pub fn respond(&self, command: &[u8], reply: &[u8]) {
        self.shared
            .state
            .lock()
            .responses
            .insert(command.to_vec(), reply.to_vec());
    }

    /// 所有已写入的字节
    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().written.clone()
    }

    pub fn baud(&self) -> u32 {
        self.shared.state.lock().baud
    }

    pub fn format(&self) -> Option<DataFormat> {
        self.shared.state.lock().format
    }

    pub fn flow(&self) -> Option<FlowControl> {
        self.shared.state.lock().flow
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().rx.len()
    }
}

impl SerialDevice for MockSerialDevice {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), SerialError> {
        self.shared.state.lock().baud = baud;
        Ok(())
    }

    fn set_data_format(&mut self, format: DataFormat) -> Result<(), SerialError> {
        self.shared.state.lock().format = Some(format);
        Ok(())
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<(), SerialError> {
        self.shared.state.lock().flow = Some(flow);
        Ok(())
    }

    fn set_timeouts(&mut self, read: Duration, _write: Duration) -> Result<(), SerialError> {
        self.shared.state.lock().read_timeout = read;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(SerialError::Closed);
        }
        state.written.extend_from_slice(data);
        if let Some(reply) = state.responses.get(data).cloned() {
            state.rx.extend(reply);
            self.shared.arrived.notify_all();
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(SerialError::Closed);
        }
        let deadline = Instant::now() + state.read_timeout;
        while state.rx.len() < buf.len() {
            if self
                .shared
                .arrived
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<(), SerialError> {
        self.shared.state.lock().closed = true;
        Ok(())
    }
}

/// 记录开关历史的 Mock 快门
#[derive(Clone, Default)]
pub struct MockShutterSwitch {
    history: Arc<Mutex<Vec<bool>>>,
}

impl MockShutterSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<bool> {
        self.history.lock().clone()
    }
}

impl ShutterSwitch for MockShutterSwitch {
    fn set(&mut self, on: bool) -> Result<(), SerialError> {
        self.history.lock().push(on);
        Ok(())
    }
}
