//! 采集会话
//!
//! 提供对外的 [`AcquisitionSession`]，封装总线线程、惯性传感器线程、
//! 网络推送线程与共享存储的生命周期。
//!
//! 线程只通过协作式标志停止；限定时间内未退出的线程被放弃，
//! 以 [`DriverError::ForcedTermination`] 报告，此时设备状态可能已损坏。

use crate::bus::{BusLoopConfig, ReadingMode, SharedBus, bus_loop, drain_queue};
use crate::display::{DisplayUpdate, refresh_display};
use crate::error::DriverError;
use crate::inertial::{InertialConfig, inertial_loop};
use crate::log::{EventLog, LogReceiver};
use crate::metrics::{AcquisitionMetrics, MetricsSnapshot};
use crate::network::{NetworkConfig, NetworkExporter, NetworkOutcome};
use crate::signal::DataReady;
use crate::store::{GPS_SAMPLE_CAPACITY, INERTIAL_SAMPLE_CAPACITY, SessionRecords, SharedRecordStore};
use parking_lot::Mutex;
use sensorlog_adapter::{BusAdapter, BusConfig, BusStatus, FilterState, Parameter, SerialDevice};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info, warn};

/// 总线线程的停止等待上限
const BUS_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 惯性线程的停止等待上限（需覆盖一次串口读超时）
const INERTIAL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 释放通道时获取总线锁的等待上限
const BUS_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// 限时 join 失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinFailure {
    TimedOut,
    Panicked,
}

/// Extension trait for timeout-capable thread joins
pub(crate) trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, JoinFailure>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, JoinFailure> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，超时后继续在后台等待
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(mpsc::RecvTimeoutError::Disconnected) => Err(JoinFailure::Panicked),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(JoinFailure::TimedOut),
        }
    }
}

/// 会话构建器
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    bus_config: BusConfig,
    reading_mode: ReadingMode,
    bus_loop: BusLoopConfig,
    inertial: InertialConfig,
}

impl SessionBuilder {
    pub fn new(bus_config: BusConfig) -> Self {
        Self {
            bus_config,
            reading_mode: ReadingMode::default(),
            bus_loop: BusLoopConfig::default(),
            inertial: InertialConfig::default(),
        }
    }

    pub fn reading_mode(mut self, mode: ReadingMode) -> Self {
        self.reading_mode = mode;
        self
    }

    pub fn bus_loop_config(mut self, config: BusLoopConfig) -> Self {
        self.bus_loop = config;
        self
    }

    pub fn inertial_config(mut self, config: InertialConfig) -> Self {
        self.inertial = config;
        self
    }

    /// 初始化通道并启动采集线程
    ///
    /// `Caution`（实际比特率与请求不同）视为成功；其他非 OK 状态返回
    /// [`DriverError::Init`]，此时不启动任何线程。
    pub fn start(
        self,
        mut bus: Box<dyn BusAdapter>,
        inertial: Option<Box<dyn SerialDevice>>,
    ) -> Result<AcquisitionSession, DriverError> {
        let (log, log_rx) = EventLog::new();

        match bus.initialize(&self.bus_config) {
            BusStatus::Ok => log.info(format!("Channel {} initialized", self.bus_config.channel)),
            BusStatus::Caution => {
                log.warn("The bitrate being used is different than the given one")
            },
            status => {
                log.warn(format!("Channel initialization failed: {}", status));
                return Err(DriverError::Init(status));
            },
        }

        let store = SharedRecordStore::new();
        let metrics = Arc::new(AcquisitionMetrics::new());
        let net_ready = DataReady::new();

        store.reset_gps();
        store.reserve_gps(GPS_SAMPLE_CAPACITY, &log);
        let trace = bus.set_parameter(Parameter::TraceStatus, 1);
        if !trace.is_ok() {
            warn!("Failed to enable trace status: {}", trace);
        }

        let bus: SharedBus = Arc::new(Mutex::new(bus));
        let bus_running = Arc::new(AtomicBool::new(true));
        let bus_thread = match self.reading_mode {
            ReadingMode::Manual => None,
            mode => {
                let (bus, store, ready, running, metrics) = (
                    bus.clone(),
                    store.clone(),
                    net_ready.clone(),
                    bus_running.clone(),
                    metrics.clone(),
                );
                let config = self.bus_loop.clone();
                Some(spawn(move || bus_loop(bus, store, ready, mode, config, running, metrics)))
            },
        };

        let inertial_running = Arc::new(AtomicBool::new(true));
        let realign = Arc::new(AtomicBool::new(false));
        let inertial_thread = inertial.map(|device| {
            store.reset_inertial();
            store.reserve_inertial(INERTIAL_SAMPLE_CAPACITY, &log);
            let (store, config, realign, running, metrics, log) = (
                store.clone(),
                self.inertial.clone(),
                realign.clone(),
                inertial_running.clone(),
                metrics.clone(),
                log.clone(),
            );
            spawn(move || inertial_loop(device, store, config, realign, running, metrics, log))
        });

        store.clear_shutter();
        info!(
            "Acquisition session started (mode: {:?}, inertial: {})",
            self.reading_mode,
            inertial_thread.is_some()
        );

        Ok(AcquisitionSession {
            bus,
            store,
            metrics,
            net_ready,
            log,
            log_rx,
            reading_mode: self.reading_mode,
            bus_running,
            bus_thread,
            inertial_running,
            inertial_thread,
            realign,
            network: None,
            released: false,
        })
    }
}

/// 会话结束的产物
#[derive(Debug)]
pub struct ReleaseOutcome {
    /// 会话期间采集的全部记录
    pub records: SessionRecords,
    /// 停止线程时发生的故障
    pub faults: Vec<DriverError>,
}

impl ReleaseOutcome {
    /// 所有线程都按时退出
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// 采集会话
pub struct AcquisitionSession {
    bus: SharedBus,
    store: SharedRecordStore,
    metrics: Arc<AcquisitionMetrics>,
    net_ready: DataReady,
    log: EventLog,
    log_rx: LogReceiver,
    reading_mode: ReadingMode,
    bus_running: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
    inertial_running: Arc<AtomicBool>,
    inertial_thread: Option<JoinHandle<()>>,
    realign: Arc<AtomicBool>,
    network: Option<NetworkExporter>,
    released: bool,
}

impl AcquisitionSession {
    pub fn store(&self) -> &SharedRecordStore {
        &self.store
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// 日志行接收端（可多次获取，共享同一队列）
    pub fn log_receiver(&self) -> LogReceiver {
        self.log_rx.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reading_mode(&self) -> ReadingMode {
        self.reading_mode
    }

    pub fn has_inertial(&self) -> bool {
        self.inertial_thread.is_some()
    }

    /// 立即排空接收队列（手动模式或定时器驱动）
    pub fn read_pending(&self) -> BusStatus {
        drain_queue(
            &mut **self.bus.lock(),
            &self.store,
            &self.net_ready,
            &self.metrics,
        )
    }

    /// 切换时间列显示模式：`true` 为到达间隔，`false` 为时间戳
    pub fn set_show_period(&self, show_period: bool) {
        self.store.with(|s| s.aggregator.set_show_period(show_period));
    }

    /// 请求惯性数据流重新同步（惯性线程在下一帧后执行）
    pub fn request_realign(&self) {
        self.realign.store(true, Ordering::Release);
    }

    /// 是否有尚未完成的重新同步请求
    pub fn realign_pending(&self) -> bool {
        self.realign.load(Ordering::Acquire)
    }

    /// 取出待显示内容
    pub fn refresh_display(&self, shown_rows: usize) -> DisplayUpdate {
        refresh_display(&self.store, shown_rows)
    }

    pub fn clear_table(&self) {
        self.store.clear_table();
    }

    pub fn set_filter(&self, filter: FilterState) -> BusStatus {
        let status = self.bus.lock().set_filter(filter);
        if status.is_ok() {
            self.log.info(format!("Filter configured: {:?}", filter));
        } else {
            self.log.warn(format!("Filter configuration failed: {}", status));
        }
        status
    }

    pub fn filter(&self) -> Result<FilterState, BusStatus> {
        self.bus.lock().filter()
    }

    pub fn set_parameter(&self, parameter: Parameter, value: u32) -> BusStatus {
        let status = self.bus.lock().set_parameter(parameter, value);
        if status.is_ok() {
            self.log.info(format!("Parameter {:?} set to {}", parameter, value));
        } else {
            self.log.warn(format!("Failed to set {:?}: {}", parameter, status));
        }
        status
    }

    pub fn parameter(&self, parameter: Parameter) -> Result<u32, BusStatus> {
        self.bus.lock().parameter(parameter)
    }

    /// 清空收发队列
    pub fn reset_bus(&self) -> BusStatus {
        let status = self.bus.lock().reset();
        if status.is_ok() {
            self.log.info("Receive and transmit queues have been cleared");
        }
        status
    }

    pub fn bus_status(&self) -> BusStatus {
        self.bus.lock().status()
    }

    /// 启动网络推送
    ///
    /// 上一个推送器仍在运行时返回 [`DriverError::AlreadyStarted`]。
    pub fn start_network(&mut self, config: NetworkConfig) -> Result<(), DriverError> {
        if let Some(exporter) = &self.network
            && !exporter.is_finished()
        {
            return Err(DriverError::AlreadyStarted);
        }
        if let Some(previous) = self.network.take() {
            let _ = previous.stop();
        }

        self.net_ready.reset();
        let exporter = NetworkExporter::start(
            config,
            self.store.clone(),
            self.net_ready.clone(),
            self.metrics.clone(),
            self.log.clone(),
        )?;
        self.network = Some(exporter);
        Ok(())
    }

    /// 网络推送是否在运行
    pub fn network_active(&self) -> bool {
        self.network.as_ref().is_some_and(|n| !n.is_finished())
    }

    /// 推送器监听的地址
    pub fn network_addr(&self) -> Option<SocketAddr> {
        self.network.as_ref().map(|n| n.local_addr())
    }

    /// 停止网络推送
    pub fn stop_network(&mut self) -> Result<NetworkOutcome, DriverError> {
        match self.network.take() {
            Some(exporter) => exporter.stop(),
            None => Err(DriverError::NotStarted),
        }
    }

    /// 停止所有线程、释放通道并取出记录
    pub fn release(mut self) -> ReleaseOutcome {
        let faults = self.shutdown();
        let records = self.store.take_records();
        self.store.clear_table();
        ReleaseOutcome { records, faults }
    }

    fn shutdown(&mut self) -> Vec<DriverError> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        let mut faults = Vec::new();

        if let Some(exporter) = self.network.take() {
            match exporter.stop() {
                Ok(_) | Err(DriverError::ConnectionTimeout) => {},
                Err(e) => faults.push(e),
            }
        }

        self.bus_running.store(false, Ordering::Release);
        if let Some(handle) = self.bus_thread.take() {
            match handle.join_timeout(BUS_JOIN_TIMEOUT) {
                Ok(()) => {},
                Err(JoinFailure::TimedOut) => {
                    error!("Bus thread failed to shut down within {:?}", BUS_JOIN_TIMEOUT);
                    faults.push(DriverError::ForcedTermination {
                        thread: "bus",
                        timeout: BUS_JOIN_TIMEOUT,
                    });
                },
                Err(JoinFailure::Panicked) => faults.push(DriverError::ThreadPanicked("bus")),
            }
        }

        match self.bus.try_lock_for(BUS_LOCK_TIMEOUT) {
            Some(mut bus) => {
                let status = bus.uninitialize();
                if !status.is_ok() {
                    warn!("Channel release returned {}", status);
                }
            },
            None => error!("Bus adapter still locked, channel not released"),
        }

        self.inertial_running.store(false, Ordering::Release);
        if let Some(handle) = self.inertial_thread.take() {
            match handle.join_timeout(INERTIAL_JOIN_TIMEOUT) {
                Ok(()) => {},
                Err(JoinFailure::TimedOut) => {
                    self.log.warn("Accelerometer No Response! Data may be damaged!");
                    faults.push(DriverError::ForcedTermination {
                        thread: "inertial",
                        timeout: INERTIAL_JOIN_TIMEOUT,
                    });
                },
                Err(JoinFailure::Panicked) => faults.push(DriverError::ThreadPanicked("inertial")),
            }
        }

        info!("Acquisition session released");
        faults
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        for fault in self.shutdown() {
            error!("Session shutdown: {}", fault);
        }
    }
}
