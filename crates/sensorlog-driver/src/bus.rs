//! 总线采集循环
//!
//! 等待帧到达信号（短超时），收到信号后排空接收队列：
//! 队列为空是正常的结束条件，非法操作立即中止排空。

use crate::clock::cpu_millis;
use crate::metrics::AcquisitionMetrics;
use crate::signal::DataReady;
use crate::store::SharedRecordStore;
use parking_lot::Mutex;
use sensorlog_adapter::{BusAdapter, BusStatus};
use sensorlog_protocol::{CanFrame, GpsRecord, HexDigest, ID_GPS_POSITION_Y, decode_gps_digest};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{trace, warn};

/// 线程间共享的总线适配器
pub type SharedBus = Arc<Mutex<Box<dyn BusAdapter>>>;

/// 单次排空中允许的连续非致命读错误数
const MAX_DRAIN_ERRORS: usize = 16;

/// 读取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingMode {
    /// 独立线程等待帧到达信号
    #[default]
    Event,
    /// 独立线程按固定间隔排空
    Timer,
    /// 仅在调用 `read_pending` 时排空
    Manual,
}

/// 总线循环配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusLoopConfig {
    /// 等待帧到达信号的超时（毫秒）
    pub wait_timeout_ms: u64,
    /// 定时模式的排空间隔（毫秒）
    pub timer_interval_ms: u64,
}

impl Default for BusLoopConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 1,
            timer_interval_ms: 50,
        }
    }
}

/// 总线线程主循环
///
/// 每次迭代检查一次 `is_running`；`mode` 为 `Manual` 时立即返回。
pub fn bus_loop(
    bus: SharedBus,
    store: SharedRecordStore,
    net_ready: DataReady,
    mode: ReadingMode,
    config: BusLoopConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<AcquisitionMetrics>,
) {
    let wait_timeout = Duration::from_millis(config.wait_timeout_ms);
    let timer_interval = Duration::from_millis(config.timer_interval_ms);

    while is_running.load(Ordering::Acquire) {
        match mode {
            ReadingMode::Event => {
                let mut bus = bus.lock();
                if !bus.wait_for_frame(wait_timeout) {
                    continue;
                }
                drain_queue(&mut **bus, &store, &net_ready, &metrics);
            },
            ReadingMode::Timer => {
                std::thread::sleep(timer_interval);
                drain_queue(&mut **bus.lock(), &store, &net_ready, &metrics);
            },
            ReadingMode::Manual => return,
        }
    }

    trace!("Bus loop exited");
}

/// 排空接收队列
///
/// 返回结束排空的状态码：`QueueEmpty` 为正常结束。
pub fn drain_queue(
    bus: &mut dyn BusAdapter,
    store: &SharedRecordStore,
    net_ready: &DataReady,
    metrics: &AcquisitionMetrics,
) -> BusStatus {
    metrics.bus_drains.fetch_add(1, Ordering::Relaxed);
    let mut errors = 0;

    loop {
        match bus.read_frame() {
            Ok(frame) => {
                errors = 0;
                process_frame(frame, store, net_ready, metrics);
            },
            Err(BusStatus::QueueEmpty) => return BusStatus::QueueEmpty,
            Err(BusStatus::IllegalOperation) => {
                metrics.bus_read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Bus read aborted: {}", BusStatus::IllegalOperation);
                return BusStatus::IllegalOperation;
            },
            Err(status) => {
                errors += 1;
                trace!("Bus read status: {}", status);
                if errors >= MAX_DRAIN_ERRORS {
                    metrics.bus_read_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Bus read aborted after {} errors: {}", errors, status);
                    return status;
                }
            },
        }
    }
}

/// 处理一帧：聚合、追加样本，0x302 报文更新网络推送行并置位信号
pub fn process_frame(
    frame: CanFrame,
    store: &SharedRecordStore,
    net_ready: &DataReady,
    metrics: &AcquisitionMetrics,
) {
    let cpu = cpu_millis();
    let line_updated = {
        let mut state = store.lock();
        state.record_frame(frame, cpu);

        if frame.id == ID_GPS_POSITION_Y {
            let digest = HexDigest::from_bytes(frame.data_slice());
            match decode_gps_digest(frame.id, &digest).map(|d| d.into_inner()) {
                Ok(GpsRecord::PositionY(record)) => {
                    state.net_line = record.network_line();
                    true
                },
                _ => false,
            }
        } else {
            false
        }
    };

    metrics.bus_frames.fetch_add(1, Ordering::Relaxed);
    if line_updated {
        net_ready.notify();
    }
}
