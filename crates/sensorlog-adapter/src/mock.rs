//! Mock 总线适配器（无硬件依赖）
//!
//! 测试通过 [`MockBusHandle`] 向接收队列注入帧或错误状态，
//! 被测代码持有 [`MockBusAdapter`] 按真实适配器的方式读取。

use crate::{BusAdapter, BusConfig, BusStatus, FilterState, Parameter};
use parking_lot::{Condvar, Mutex};
use sensorlog_protocol::CanFrame;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

struct MockState {
    queue: VecDeque<Result<CanFrame, BusStatus>>,
    initialized: bool,
    init_status: BusStatus,
    config: Option<BusConfig>,
    filter: FilterState,
    parameters: HashMap<Parameter, u32>,
    reads: u64,
}

struct MockShared {
    state: Mutex<MockState>,
    arrived: Condvar,
}

/// Mock 适配器
pub struct MockBusAdapter {
    shared: Arc<MockShared>,
}

/// 测试侧控制句柄
#[derive(Clone)]
pub struct MockBusHandle {
    shared: Arc<MockShared>,
}

impl Default for MockBusAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBusAdapter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                state: Mutex::new(MockState {
                    queue: VecDeque::new(),
                    initialized: false,
                    init_status: BusStatus::Ok,
                    config: None,
                    filter: FilterState::Open,
                    parameters: HashMap::new(),
                    reads: 0,
                }),
                arrived: Condvar::new(),
            }),
        }
    }

    pub fn handle(&self) -> MockBusHandle {
        MockBusHandle {
            shared: self.shared.clone(),
        }
    }
}

impl MockBusHandle {
    /// 注入一帧并触发到达信号
    pub fn push_frame(&self, frame: CanFrame) {
        self.shared.state.lock().queue.push_back(Ok(frame));
        self.shared.arrived.notify_all();
    }

    /// 注入一个读取错误（如 `IllegalOperation`）
    pub fn push_error(&self, status: BusStatus) {
        self.shared.state.lock().queue.push_back(Err(status));
        self.shared.arrived.notify_all();
    }

    /// 设置下一次 `initialize` 的返回值
    pub fn set_init_status(&self, status: BusStatus) {
        self.shared.state.lock().init_status = status;
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    pub fn config(&self) -> Option<BusConfig> {
        self.shared.state.lock().config.clone()
    }

    pub fn parameter(&self, parameter: Parameter) -> Option<u32> {
        self.shared.state.lock().parameters.get(&parameter).copied()
    }

    pub fn filter(&self) -> FilterState {
        self.shared.state.lock().filter
    }

    /// 队列中尚未读取的条目数
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// `read_frame` 被调用的次数
    pub fn reads(&self) -> u64 {
        self.shared.state.lock().reads
    }
}

impl BusAdapter for MockBusAdapter {
    fn initialize(&mut self, config: &BusConfig) -> BusStatus {
        let mut state = self.shared.state.lock();
        let status = state.init_status;
        if status.is_usable() {
            state.initialized = true;
            state.config = Some(config.clone());
        }
        status
    }

    fn uninitialize(&mut self) -> BusStatus {
        let mut state = self.shared.state.lock();
        if !state.initialized {
            return BusStatus::IllegalOperation;
        }
        state.initialized = false;
        BusStatus::Ok
    }

    fn read_frame(&mut self) -> Result<CanFrame, BusStatus> {
        let mut state = self.shared.state.lock();
        state.reads += 1;
        if !state.initialized {
            return Err(BusStatus::IllegalOperation);
        }

        while let Some(entry) = state.queue.pop_front() {
            let frame = entry?;
            let accepted = match state.filter {
                FilterState::Open => true,
                FilterState::Closed => false,
                FilterState::Custom(filter) => filter.accepts(&frame),
            };
            if accepted {
                return Ok(frame);
            }
        }
        Err(BusStatus::QueueEmpty)
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.queue.is_empty() {
            let _ = self.shared.arrived.wait_for(&mut state, timeout);
        }
        !state.queue.is_empty()
    }

    fn set_filter(&mut self, filter: FilterState) -> BusStatus {
        self.shared.state.lock().filter = filter;
        BusStatus::Ok
    }

    fn filter(&mut self) -> Result<FilterState, BusStatus> {
        Ok(self.shared.state.lock().filter)
    }

    fn set_parameter(&mut self, parameter: Parameter, value: u32) -> BusStatus {
        let mut state = self.shared.state.lock();
        if !state.initialized {
            return BusStatus::IllegalOperation;
        }
        state.parameters.insert(parameter, value);
        BusStatus::Ok
    }

    fn parameter(&mut self, parameter: Parameter) -> Result<u32, BusStatus> {
        self.shared
            .state
            .lock()
            .parameters
            .get(&parameter)
            .copied()
            .ok_or(BusStatus::IllegalParameter)
    }

    fn reset(&mut self) -> BusStatus {
        self.shared.state.lock().queue.clear();
        BusStatus::Ok
    }

    fn status(&mut self) -> BusStatus {
        if self.shared.state.lock().initialized {
            BusStatus::Ok
        } else {
            BusStatus::IllegalOperation
        }
    }
}
