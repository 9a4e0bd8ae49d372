//! 实时网络推送
//!
//! 在固定端口上接受一个 TCP 连接，之后每当总线线程更新待推送行并置位
//! [`DataReady`]，就把该行原样写入套接字。没有握手和分帧，
//! 接收端按换行切分。
//!
//! 接受连接有超时；超时后不重试，由调用方重新启动。

use crate::error::DriverError;
use crate::log::EventLog;
use crate::metrics::AcquisitionMetrics;
use crate::session::{JoinFailure, JoinTimeout};
use crate::signal::DataReady;
use crate::store::SharedRecordStore;
use std::io::{ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// 默认推送端口
pub const DEFAULT_PORT: u16 = 55555;

/// 接受连接时的轮询间隔
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 停止推送线程的等待上限
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// 网络推送配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub bind_addr: SocketAddr,
    /// 等待客户端连接的上限
    pub accept_timeout: Duration,
    /// 每次等待数据就绪信号的超时
    pub wait_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            accept_timeout: Duration::from_secs(5),
            wait_timeout: Duration::from_millis(1),
        }
    }
}

/// 推送线程结束的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    /// 收到停止请求
    Stopped,
    /// 对端关闭或写入失败
    Disconnected,
}

/// 单连接推送器
pub struct NetworkExporter {
    local_addr: SocketAddr,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<NetworkOutcome, DriverError>>>,
}

impl NetworkExporter {
    /// 绑定端口并启动推送线程
    ///
    /// 绑定失败立即返回错误；连接超时在 [`stop`](Self::stop) 的结果中体现。
    pub fn start(
        config: NetworkConfig,
        store: SharedRecordStore,
        ready: DataReady,
        metrics: Arc<AcquisitionMetrics>,
        log: EventLog,
    ) -> Result<Self, DriverError> {
        let listener = TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log.info(format!("Waiting for connection on {}", local_addr));

        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();
        let thread = std::thread::Builder::new()
            .name("sensorlog-net".into())
            .spawn(move || export_loop(listener, &config, &store, &ready, &flag, &metrics, &log))
            .map_err(DriverError::Network)?;

        Ok(Self {
            local_addr,
            is_running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 推送线程是否已自行结束（超时、断开）
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 停止推送线程并返回其结束方式
    pub fn stop(mut self) -> Result<NetworkOutcome, DriverError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<NetworkOutcome, DriverError> {
        self.is_running.store(false, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Ok(NetworkOutcome::Stopped);
        };
        match thread.join_timeout(STOP_TIMEOUT) {
            Ok(result) => result,
            Err(JoinFailure::TimedOut) => Err(DriverError::ForcedTermination {
                thread: "network",
                timeout: STOP_TIMEOUT,
            }),
            Err(JoinFailure::Panicked) => Err(DriverError::ThreadPanicked("network")),
        }
    }
}

impl Drop for NetworkExporter {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.shutdown()
            && !matches!(e, DriverError::ConnectionTimeout)
        {
            error!("Network exporter shut down with error: {}", e);
        }
    }
}

fn export_loop(
    listener: TcpListener,
    config: &NetworkConfig,
    store: &SharedRecordStore,
    ready: &DataReady,
    is_running: &AtomicBool,
    metrics: &AcquisitionMetrics,
    log: &EventLog,
) -> Result<NetworkOutcome, DriverError> {
    let Some(mut stream) = accept_with_timeout(&listener, config.accept_timeout, is_running, log)?
    else {
        return Ok(NetworkOutcome::Stopped);
    };
    metrics.net_connections.fetch_add(1, Ordering::Relaxed);

    while is_running.load(Ordering::Acquire) {
        if !ready.wait(config.wait_timeout) {
            continue;
        }

        let line = store.lock().net_line.clone();
        if line.is_empty() {
            continue;
        }

        match stream.write(line.as_bytes()) {
            Ok(0) => {
                log.warn("Connection closed by peer");
                return Ok(NetworkOutcome::Disconnected);
            },
            Ok(_) => {
                metrics.net_lines_sent.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                log.warn(format!("Send failed: {}", e));
                return Ok(NetworkOutcome::Disconnected);
            },
        }
    }

    debug!("Network exporter stopped");
    Ok(NetworkOutcome::Stopped)
}

/// 非阻塞轮询接受连接；停止请求返回 `None`
fn accept_with_timeout(
    listener: &TcpListener,
    timeout: Duration,
    is_running: &AtomicBool,
    log: &EventLog,
) -> Result<Option<TcpStream>, DriverError> {
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                log.info(format!("Connected: {}", peer));
                return Ok(Some(stream));
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if !is_running.load(Ordering::Acquire) {
                    return Ok(None);
                }
                if Instant::now() >= deadline {
                    log.warn("Connection Time-Out");
                    return Err(DriverError::ConnectionTimeout);
                }
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            },
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    fn local_config(accept_timeout: Duration) -> NetworkConfig {
        NetworkConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            accept_timeout,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.bind_addr.port(), 55555);
        assert_eq!(config.accept_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_accept_timeout() {
        let (log, rx) = EventLog::new();
        let exporter = NetworkExporter::start(
            local_config(Duration::from_millis(30)),
            SharedRecordStore::new(),
            DataReady::new(),
            Arc::new(AcquisitionMetrics::new()),
            log,
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(exporter.is_finished());
        assert!(matches!(exporter.stop(), Err(DriverError::ConnectionTimeout)));
        assert!(rx.try_iter().any(|l| l == "Connection Time-Out"));
    }

    #[test]
    fn test_push_ready_line() {
        let store = SharedRecordStore::new();
        let ready = DataReady::new();
        let metrics = Arc::new(AcquisitionMetrics::new());
        let exporter = NetworkExporter::start(
            local_config(Duration::from_secs(2)),
            store.clone(),
            ready.clone(),
            metrics.clone(),
            EventLog::detached(),
        )
        .unwrap();

        let client = TcpStream::connect(exporter.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reader = BufReader::new(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        while metrics.snapshot().net_connections == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        store.with(|s| s.net_line = "18.520\n".into());
        ready.notify();

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "18.520\n");

        assert_eq!(exporter.stop().unwrap(), NetworkOutcome::Stopped);
        assert_eq!(metrics.snapshot().net_lines_sent, 1);
    }

    #[test]
    fn test_stop_while_waiting_for_client() {
        let exporter = NetworkExporter::start(
            local_config(Duration::from_secs(10)),
            SharedRecordStore::new(),
            DataReady::new(),
            Arc::new(AcquisitionMetrics::new()),
            EventLog::detached(),
        )
        .unwrap();
        assert_eq!(exporter.stop().unwrap(), NetworkOutcome::Stopped);
    }
}
