//! 驱动层错误类型定义

use sensorlog_adapter::{BusStatus, CanError, SerialError};
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 适配器错误
    #[error("CAN adapter error: {0}")]
    Can(#[from] CanError),

    /// 串口设备错误
    #[error("Serial device error: {0}")]
    Serial(#[from] SerialError),

    /// 通道初始化失败
    #[error("Bus initialization failed: {0}")]
    Init(BusStatus),

    /// 会话已启动
    #[error("Session already started")]
    AlreadyStarted,

    /// 会话未启动
    #[error("Session not started")]
    NotStarted,

    /// 线程未在限定时间内退出，已被放弃
    ///
    /// 线程可能仍阻塞在设备读取中，设备状态与已采集数据可能不完整。
    #[error("{thread} thread did not stop within {timeout:?}, device state may be lost")]
    ForcedTermination {
        thread: &'static str,
        timeout: Duration,
    },

    /// 线程 panic
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// 等待连接超时
    #[error("Connection Time-Out")]
    ConnectionTimeout,

    /// 网络 IO 错误
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
}

impl DriverError {
    /// 是否为强制终止（数据可能受损）
    pub fn is_forced_termination(&self) -> bool {
        matches!(self, DriverError::ForcedTermination { .. })
    }
}
