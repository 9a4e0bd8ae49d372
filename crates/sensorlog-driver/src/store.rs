//! 共享记录存储
//!
//! 所有跨线程的数据（GPS 样本、惯性样本、聚合表、待推送行、快门事件）
//! 放在同一个 [`SharedState`] 中，由一把互斥锁保护。
//! 任何读写都在 [`SharedRecordStore::lock`] 返回的守卫作用域内完成。

use crate::aggregator::{MessageAggregator, Observation};
use crate::log::EventLog;
use parking_lot::{Mutex, MutexGuard};
use sensorlog_protocol::{CanFrame, DistanceTracker, bad_ratio, parse_id};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// GPS 样本预留容量（约 30 分钟报文量）
pub const GPS_SAMPLE_CAPACITY: usize = 950_000;

/// 惯性样本预留容量（约 30 分钟报文量）
pub const INERTIAL_SAMPLE_CAPACITY: usize = 300_000;

/// 总线报文样本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsSample {
    /// ID 文本（如 `301h`）
    pub id_text: String,
    /// 数据文本（如 ` 0A 00 12 34 56 78 9A BC`）
    pub data_text: String,
    /// 捕获时的 CPU 时间戳（毫秒）
    pub cpu_millis: Option<i64>,
}

impl GpsSample {
    pub fn from_frame(frame: &CanFrame, cpu_millis: i64) -> Self {
        Self {
            id_text: frame.id_string(),
            data_text: frame.data_string(),
            cpu_millis: Some(cpu_millis),
        }
    }

    /// 数值 ID；文本无法解析时为 `None`
    pub fn id(&self) -> Option<u32> {
        parse_id(&self.id_text)
    }
}

/// 惯性传感器样本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InertialSample {
    /// 22 字节帧，`%02X` 以空格连接
    pub frame_text: String,
    pub cpu_millis: i64,
}

/// 快门事件标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutterLabel {
    /// 计时开始
    Start,
    /// 快门玻璃关闭（遮挡）
    Off,
    /// 变道提示
    LaneChange,
    /// 提醒
    Alarm,
    /// 快门玻璃打开
    On,
}

impl ShutterLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutterLabel::Start => "Start",
            ShutterLabel::Off => "OFF",
            ShutterLabel::LaneChange => "LC",
            ShutterLabel::Alarm => "Alarm",
            ShutterLabel::On => "ON",
        }
    }
}

impl fmt::Display for ShutterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShutterLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Start" => Ok(ShutterLabel::Start),
            "OFF" => Ok(ShutterLabel::Off),
            "LC" => Ok(ShutterLabel::LaneChange),
            "Alarm" => Ok(ShutterLabel::Alarm),
            "ON" => Ok(ShutterLabel::On),
            other => Err(format!("unknown shutter label '{}'", other)),
        }
    }
}

/// 快门事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterEvent {
    pub millis: i64,
    pub label: ShutterLabel,
}

/// 锁内共享状态
#[derive(Debug, Default)]
pub struct SharedState {
    /// 聚合表
    pub aggregator: MessageAggregator,
    /// 总线样本（追加，不修改）
    pub gps_samples: Vec<GpsSample>,
    /// 惯性样本（追加，不修改）
    pub inertial_samples: Vec<InertialSample>,
    /// 快门事件
    pub shutter_events: Vec<ShutterEvent>,
    /// 待推送的网络行
    pub net_line: String,
    /// 最新一帧有效惯性数据文本
    pub latest_inertial: String,
    /// 读到的惯性帧总数
    pub inertial_total: u64,
    /// 通过校验的惯性帧数
    pub inertial_valid: u64,
    /// 里程修正（显示路径）
    pub distance: DistanceTracker,
}

impl SharedState {
    /// 会话范围的惯性坏帧比例
    pub fn inertial_bad_ratio(&self) -> f64 {
        bad_ratio(self.inertial_total, self.inertial_valid)
    }

    /// 记录一帧总线数据：更新聚合表并追加样本
    pub fn record_frame(&mut self, frame: CanFrame, cpu_millis: i64) -> Observation {
        self.gps_samples.push(GpsSample::from_frame(&frame, cpu_millis));
        self.aggregator.observe(frame)
    }

    /// 记录一帧惯性数据
    ///
    /// 只有通过校验的帧进入样本列表；总数总是递增。
    pub fn record_inertial(&mut self, frame_text: String, valid: bool, cpu_millis: i64) {
        self.inertial_total += 1;
        if valid {
            self.inertial_valid += 1;
            self.latest_inertial = frame_text.clone();
            self.inertial_samples.push(InertialSample {
                frame_text,
                cpu_millis,
            });
        }
    }

    pub fn push_shutter(&mut self, label: ShutterLabel, millis: i64) {
        self.shutter_events.push(ShutterEvent { millis, label });
    }

    /// 最后一个快门事件标签
    pub fn last_shutter_label(&self) -> Option<ShutterLabel> {
        self.shutter_events.last().map(|e| e.label)
    }
}

/// 会话结束时从存储中取出的全部记录
#[derive(Debug, Clone, Default)]
pub struct SessionRecords {
    pub gps_samples: Vec<GpsSample>,
    pub inertial_samples: Vec<InertialSample>,
    pub shutter_events: Vec<ShutterEvent>,
    pub inertial_total: u64,
    pub inertial_valid: u64,
}

impl SessionRecords {
    pub fn inertial_bad_ratio(&self) -> f64 {
        bad_ratio(self.inertial_total, self.inertial_valid)
    }
}

/// 共享记录存储句柄（可在线程间克隆）
#[derive(Clone, Default)]
pub struct SharedRecordStore {
    inner: Arc<Mutex<SharedState>>,
}

impl SharedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入临界区
    ///
    /// 守卫不可重入：持有守卫期间不要再次调用 `lock`。
    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.inner.lock()
    }

    /// 在临界区内执行闭包
    pub fn with<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.lock())
    }

    /// 预留总线样本容量，失败只记录日志
    pub fn reserve_gps(&self, capacity: usize, log: &EventLog) -> bool {
        let mut state = self.lock();
        let additional = capacity.saturating_sub(state.gps_samples.len());
        match state.gps_samples.try_reserve(additional) {
            Ok(()) => {
                log.info("GPS Message Memory successfully allocated (30 mins)");
                true
            },
            Err(e) => {
                log.warn(format!("GPS Message Memory allocation failed: {}", e));
                false
            },
        }
    }

    /// 预留惯性样本容量，失败只记录日志
    pub fn reserve_inertial(&self, capacity: usize, log: &EventLog) -> bool {
        let mut state = self.lock();
        let additional = capacity.saturating_sub(state.inertial_samples.len());
        match state.inertial_samples.try_reserve(additional) {
            Ok(()) => {
                log.info("Accelerometer Message Memory successfully allocated (30 mins)");
                true
            },
            Err(e) => {
                log.warn(format!("Accelerometer Message Memory allocation failed: {}", e));
                false
            },
        }
    }

    /// 清空聚合表（不影响样本）
    pub fn clear_table(&self) {
        self.lock().aggregator.clear();
    }

    /// 重置总线侧状态（新会话）
    pub fn reset_gps(&self) {
        let mut state = self.lock();
        state.gps_samples.clear();
        state.aggregator.clear();
        state.net_line.clear();
        state.distance.reset();
    }

    /// 重置惯性侧状态（新会话）
    pub fn reset_inertial(&self) {
        let mut state = self.lock();
        state.inertial_samples.clear();
        state.latest_inertial.clear();
        state.inertial_total = 0;
        state.inertial_valid = 0;
    }

    pub fn clear_shutter(&self) {
        self.lock().shutter_events.clear();
    }

    /// 取出全部记录，存储中的样本列表被清空
    pub fn take_records(&self) -> SessionRecords {
        let mut state = self.lock();
        SessionRecords {
            gps_samples: std::mem::take(&mut state.gps_samples),
            inertial_samples: std::mem::take(&mut state.inertial_samples),
            shutter_events: std::mem::take(&mut state.shutter_events),
            inertial_total: state.inertial_total,
            inertial_valid: state.inertial_valid,
        }
    }
}
