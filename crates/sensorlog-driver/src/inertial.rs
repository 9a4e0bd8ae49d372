//! 惯性传感器串口线程
//!
//! 设备上电后先完成一段固定的握手：
//!
//! 1. `P` 循环：直到读不到任何回应（设备停止输出）
//! 2. `R` 循环：直到读到 `0x48`
//! 3. `0x09`、`W`：各自读空残留数据
//! 4. 可选零点校准（`0x7A 0x05`，需静止约 5 分钟）与输出速率设置（`0x54 <rate>`）
//! 5. `a`、`G`、`C`：进入连续输出模式
//!
//! 随后在 45 字节窗口中搜索帧边界，对齐后逐帧读取 22 字节并校验。
//! 重新同步标志可在任意时刻由其他线程置位。

use crate::clock::cpu_millis;
use crate::log::EventLog;
use crate::metrics::AcquisitionMetrics;
use crate::store::SharedRecordStore;
use sensorlog_adapter::{DataFormat, FlowControl, SerialDevice, SerialError};
use sensorlog_protocol::{INERTIAL_FRAME_LEN, SYNC_WINDOW_LEN, find_sync_offset, frame_hex, is_valid_frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 握手应答字节
const READY_BYTE: u8 = 0x48;

/// 零点校准命令
const ZERO_COMMAND: [u8; 2] = [0x7A, 0x05];

/// 输出速率命令前缀
const RATE_COMMAND: u8 = 0x54;

/// 惯性传感器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InertialConfig {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// 每条命令写入后的等待
    pub command_delay: Duration,
    /// 是否执行零点校准
    pub zero_calibration: bool,
    /// 零点校准期间的静止等待
    pub calibration_wait: Duration,
    /// 输出速率设置值，0 表示不设置
    pub erate: u8,
}

impl Default for InertialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 38400,
            read_timeout: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(1000),
            command_delay: Duration::from_millis(20),
            zero_calibration: false,
            calibration_wait: Duration::from_secs(5 * 60),
            erate: 0,
        }
    }
}

/// 握手/读取过程中止的原因
#[derive(Debug)]
enum Halt {
    /// 收到停止请求
    Stopped,
    Device(SerialError),
}

impl From<SerialError> for Halt {
    fn from(e: SerialError) -> Self {
        Halt::Device(e)
    }
}

/// 惯性传感器线程主循环
///
/// 设备错误记录日志后退出；退出前关闭设备。
#[allow(clippy::too_many_arguments)]
pub fn inertial_loop(
    mut device: Box<dyn SerialDevice>,
    store: SharedRecordStore,
    config: InertialConfig,
    realign: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<AcquisitionMetrics>,
    log: EventLog,
) {
    let result = {
        let mut link = SensorLink {
            device: &mut *device,
            config: &config,
            is_running: &is_running,
            log: &log,
        };
        link.run(&store, &realign, &metrics)
    };

    match result {
        Ok(()) | Err(Halt::Stopped) => debug!("Inertial loop exited"),
        Err(Halt::Device(e)) => log.warn(format!("Accelerometer device error: {}", e)),
    }

    if let Err(e) = device.close() {
        warn!("Failed to close accelerometer device: {}", e);
    }
}

/// 串口会话：握手、同步、读帧
struct SensorLink<'a> {
    device: &'a mut dyn SerialDevice,
    config: &'a InertialConfig,
    is_running: &'a AtomicBool,
    log: &'a EventLog,
}

impl SensorLink<'_> {
    fn running(&self) -> Result<(), Halt> {
        if self.is_running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Halt::Stopped)
        }
    }

    fn run(
        &mut self,
        store: &SharedRecordStore,
        realign: &AtomicBool,
        metrics: &AcquisitionMetrics,
    ) -> Result<(), Halt> {
        self.configure()?;
        self.handshake()?;
        self.synchronize(3)?;

        let mut frame = [0u8; INERTIAL_FRAME_LEN];
        loop {
            self.read_full(&mut frame)?;

            let valid = is_valid_frame(&frame);
            store.with(|s| s.record_inertial(frame_hex(&frame), valid, cpu_millis()));
            metrics.inertial_frames_total.fetch_add(1, Ordering::Relaxed);
            if valid {
                metrics.inertial_frames_valid.fetch_add(1, Ordering::Relaxed);
            } else {
                trace!("Inertial frame rejected: {}", frame_hex(&frame));
            }

            if realign.load(Ordering::Acquire) {
                self.synchronize(2)?;
                realign.store(false, Ordering::Release);
                metrics.inertial_realigns.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn configure(&mut self) -> Result<(), Halt> {
        let cfg = self.config;
        self.device.set_baud_rate(cfg.baud_rate)?;
        self.log.info(format!("Set Baud Rate {}", cfg.baud_rate));
        self.device.set_data_format(DataFormat::EIGHT_N_ONE)?;
        self.log.info("Bit = 8, Stop Bits = 1, No Parity");
        self.device.set_flow_control(FlowControl::None)?;
        self.log.info("No Flow Control");
        self.device.set_timeouts(cfg.read_timeout, cfg.write_timeout)?;
        self.log.info(format!(
            "Read Timeout = {}, Write Timeout = {}",
            cfg.read_timeout.as_millis(),
            cfg.write_timeout.as_millis()
        ));
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), Halt> {
        let mut buf = [0u8; 256];

        // 设备停止输出前持续发送 P
        loop {
            self.running()?;
            self.send("P", b"P")?;
            let n = self.device.read(&mut buf)?;
            self.report_read(n, buf.len(), &buf[..n]);
            if n == 0 {
                break;
            }
        }

        loop {
            self.running()?;
            self.send("R", b"R")?;
            let n = self.device.read(&mut buf[..1])?;
            self.report_read(n, 1, &buf[..n]);
            if n == 1 && buf[0] == READY_BYTE {
                break;
            }
        }

        self.send("0x09", &[0x09])?;
        self.drain(&mut buf[..INERTIAL_FRAME_LEN])?;
        self.send("W", b"W")?;
        self.drain(&mut buf[..INERTIAL_FRAME_LEN])?;

        if self.config.zero_calibration {
            self.send("Zero Command", &ZERO_COMMAND)?;
            let n = self.device.read(&mut buf[..1])?;
            self.report_read(n, 1, &buf[..n]);
            if n == 1 {
                self.log
                    .info("Zeroing...Please keep the Gyro MOTIONLESS for about 5 minutes...");
                self.pause(self.config.calibration_wait)?;
            }
        }

        if self.config.erate > 0 {
            self.send("Erate Command", &[RATE_COMMAND, self.config.erate])?;
        }

        self.send("a", b"a")?;
        let n = self.device.read(&mut buf[..1])?;
        self.report_read(n, 1, &buf[..n]);

        self.send("G", b"G")?;
        self.device.read(&mut buf[..SYNC_WINDOW_LEN])?;

        self.send("C", b"C")?;
        Ok(())
    }

    /// 丢弃 `discard` 个窗口后搜索帧边界并对齐
    fn synchronize(&mut self, discard: usize) -> Result<(), Halt> {
        let mut window = [0u8; SYNC_WINDOW_LEN];
        for _ in 0..discard {
            self.device.read(&mut window)?;
        }

        let skip = loop {
            self.log.info("Reading...");
            self.read_full(&mut window)?;
            if let Some(skip) = find_sync_offset(&window) {
                break skip;
            }
        };

        if skip > 0 {
            let mut rest = [0u8; INERTIAL_FRAME_LEN];
            self.read_full(&mut rest[..skip])?;
        }
        debug!("Inertial stream aligned, skipped {} bytes", skip);
        Ok(())
    }

    /// 重复读取直到缓冲区读满
    fn read_full(&mut self, buf: &mut [u8]) -> Result<(), Halt> {
        loop {
            self.running()?;
            if self.device.read(buf)? == buf.len() {
                return Ok(());
            }
        }
    }

    /// 读到 0 字节为止
    fn drain(&mut self, buf: &mut [u8]) -> Result<(), Halt> {
        loop {
            self.running()?;
            if self.device.read(buf)? == 0 {
                return Ok(());
            }
        }
    }

    fn send(&mut self, label: &str, bytes: &[u8]) -> Result<(), Halt> {
        let written = self.device.write(bytes)?;
        if written == bytes.len() {
            self.log.info(format!("Write '{}' OK", label));
        } else {
            self.log.info(format!("Write '{}' Failed", label));
        }
        std::thread::sleep(self.config.command_delay);
        Ok(())
    }

    fn report_read(&self, n: usize, expected: usize, data: &[u8]) {
        if n == expected {
            self.log.info(format!(
                "Read OK, Read:{}",
                String::from_utf8_lossy(data)
            ));
        } else {
            self.log.info(format!("Read Failed, Read:{}", n));
        }
    }

    /// 可被停止请求打断的等待
    fn pause(&self, duration: Duration) -> Result<(), Halt> {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.running()?;
            let left = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(left.min(Duration::from_millis(50)));
        }
        Ok(())
    }
}
