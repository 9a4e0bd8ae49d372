//! 采集驱动层
//!
//! 本模块负责两条独立时钟的数据流（CAN 总线与惯性传感器串口）的采集、
//! 聚合与共享存储，包括：
//! - 总线线程：等待帧到达信号，排空接收队列
//! - 惯性传感器线程：握手协议、同步搜索、定长帧读取与校验
//! - 网络推送线程：单连接 TCP 行推送
//! - 显示刷新：消费聚合表的 dirty 标记
//! - 快门时间线：定时触发事件记录
//!
//! 所有跨线程的样本、聚合表与最新行都放在同一把锁后面
//! （[`SharedRecordStore`]），计数器与终止标志使用原子量。

mod aggregator;
pub mod bus;
mod clock;
mod display;
mod error;
pub mod inertial;
mod log;
pub mod metrics;
pub mod network;
mod session;
pub mod shutter;
mod signal;
mod store;

pub use aggregator::{MessageAggregator, MessageKey, Observation, TrackedMessage};
pub use bus::{BusLoopConfig, ReadingMode, SharedBus, bus_loop, drain_queue, process_frame};
pub use clock::{cpu_epoch, cpu_millis, cpu_millis_at};
pub use display::{DisplayRow, DisplayUpdate, refresh_display};
pub use error::DriverError;
pub use inertial::{InertialConfig, inertial_loop};
pub use log::{EventLog, LogReceiver};
pub use metrics::{AcquisitionMetrics, MetricsSnapshot};
pub use network::{DEFAULT_PORT, NetworkConfig, NetworkExporter, NetworkOutcome};
pub use session::{AcquisitionSession, ReleaseOutcome, SessionBuilder};
pub use shutter::{ShutterAction, ShutterController, ShutterTimeline};
pub use signal::DataReady;
pub use store::*;
