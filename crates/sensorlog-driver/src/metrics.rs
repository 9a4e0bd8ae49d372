//! 采集指标
//!
//! 原子计数器，采集线程写入，显示循环随时读取，不经过共享存储的锁。
//! 计数之间不保证严格一致，仅用于状态显示。

use std::sync::atomic::{AtomicU64, Ordering};

/// 采集实时指标
#[derive(Debug, Default)]
pub struct AcquisitionMetrics {
    /// 总线接收的总帧数
    pub bus_frames: AtomicU64,

    /// 帧到达信号触发的排空次数
    pub bus_drains: AtomicU64,

    /// 排空因硬错误（非法操作等）中止的次数
    pub bus_read_errors: AtomicU64,

    /// 惯性传感器读到的总帧数（含校验失败）
    pub inertial_frames_total: AtomicU64,

    /// 惯性传感器通过校验的帧数
    pub inertial_frames_valid: AtomicU64,

    /// 完成的重新同步次数
    pub inertial_realigns: AtomicU64,

    /// 网络推送成功的行数
    pub net_lines_sent: AtomicU64,

    /// 已接受的网络连接数
    pub net_connections: AtomicU64,
}

impl AcquisitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bus_frames: self.bus_frames.load(Ordering::Relaxed),
            bus_drains: self.bus_drains.load(Ordering::Relaxed),
            bus_read_errors: self.bus_read_errors.load(Ordering::Relaxed),
            inertial_frames_total: self.inertial_frames_total.load(Ordering::Relaxed),
            inertial_frames_valid: self.inertial_frames_valid.load(Ordering::Relaxed),
            inertial_realigns: self.inertial_realigns.load(Ordering::Relaxed),
            net_lines_sent: self.net_lines_sent.load(Ordering::Relaxed),
            net_connections: self.net_connections.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器（新会话开始时）
    pub fn reset(&self) {
        self.bus_frames.store(0, Ordering::Relaxed);
        self.bus_drains.store(0, Ordering::Relaxed);
        self.bus_read_errors.store(0, Ordering::Relaxed);
        self.inertial_frames_total.store(0, Ordering::Relaxed);
        self.inertial_frames_valid.store(0, Ordering::Relaxed);
        self.inertial_realigns.store(0, Ordering::Relaxed);
        self.net_lines_sent.store(0, Ordering::Relaxed);
        self.net_connections.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub bus_frames: u64,
    pub bus_drains: u64,
    pub bus_read_errors: u64,
    pub inertial_frames_total: u64,
    pub inertial_frames_valid: u64,
    pub inertial_realigns: u64,
    pub net_lines_sent: u64,
    pub net_connections: u64,
}

impl MetricsSnapshot {
    /// 惯性帧坏帧比例（0.0 ~ 1.0）
    pub fn inertial_bad_ratio(&self) -> f64 {
        sensorlog_protocol::bad_ratio(self.inertial_frames_total, self.inertial_frames_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = AcquisitionMetrics::new();
        metrics.bus_frames.fetch_add(3, Ordering::Relaxed);
        metrics.inertial_frames_total.fetch_add(4, Ordering::Relaxed);
        metrics.inertial_frames_valid.fetch_add(3, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bus_frames, 3);
        assert_eq!(snapshot.inertial_bad_ratio(), 0.25);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
