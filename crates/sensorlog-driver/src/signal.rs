//! 数据就绪信号（自动复位事件）
//!
//! 容量为 1 的通道：多次 `notify` 在被消费前合并为一次，
//! `wait` 消费信号后自动复位。

use crossbeam_channel::{Receiver, Sender, bounded};
use std::time::Duration;

#[derive(Clone)]
pub struct DataReady {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for DataReady {
    fn default() -> Self {
        Self::new()
    }
}

impl DataReady {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// 置位（已置位时无操作）
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }

    /// 等待置位，超时返回 `false`
    pub fn wait(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// 清除未消费的信号
    pub fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_coalesces() {
        let signal = DataReady::new();
        signal.notify();
        signal.notify();
        assert!(signal.wait(Duration::from_millis(1)));
        assert!(!signal.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_reset() {
        let signal = DataReady::new();
        signal.notify();
        signal.reset();
        assert!(!signal.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_cross_thread_wake() {
        let signal = DataReady::new();
        let notifier = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            notifier.notify();
        });
        assert!(signal.wait(Duration::from_secs(2)));
        handle.join().unwrap();
    }
}
