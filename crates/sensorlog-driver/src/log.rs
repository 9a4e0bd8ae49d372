//! 信息日志输出
//!
//! 采集过程中面向用户的状态行（握手进度、初始化结果、超时提示等）
//! 同时写入 `tracing` 和一个无界通道，显示端从通道逐行取出。

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{info, warn};

/// 日志行接收端
pub type LogReceiver = Receiver<String>;

/// 日志行发送端（可在线程间克隆）
#[derive(Clone)]
pub struct EventLog {
    tx: Sender<String>,
}

impl EventLog {
    pub fn new() -> (Self, LogReceiver) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// 不需要显示端时使用（接收端立即丢弃）
    pub fn detached() -> Self {
        Self::new().0
    }

    /// 普通信息
    pub fn info(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        let _ = self.tx.send(line);
    }

    /// 警告（非致命，执行继续）
    pub fn warn(&self, line: impl Into<String>) {
        let line = line.into();
        warn!("{}", line);
        let _ = self.tx.send(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_reach_receiver() {
        let (log, rx) = EventLog::new();
        log.info("Set Baud Rate 38400");
        log.clone().warn("bitrate differs");
        assert_eq!(rx.try_recv().unwrap(), "Set Baud Rate 38400");
        assert_eq!(rx.try_recv().unwrap(), "bitrate differs");
    }

    #[test]
    fn test_detached_does_not_block() {
        let log = EventLog::detached();
        for _ in 0..1000 {
            log.info("line");
        }
    }
}
