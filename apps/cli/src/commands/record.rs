//! 采集命令
//!
//! 初始化 CAN 通道与惯性传感器，运行显示循环，Ctrl+C 或到达时长后
//! 释放会话并写出 GPS.txt / Acc.txt / Shutter.txt

use crate::commands::config::{ModeArg, load_settings};
use anyhow::{Context, Result, bail};
use clap::Args;
use sensorlog_adapter::serial::{UsbSerialDevice, UsbShutterSwitch};
use sensorlog_adapter::{BusAdapter, SerialDevice, ShutterSwitch};
use sensorlog_driver::{
    DisplayRow, DisplayUpdate, MetricsSnapshot, ReadingMode, SessionBuilder, ShutterAction,
    ShutterController,
};
use sensorlog_protocol::{GPS_ID_RANGE, GPS_MESSAGE_KINDS, GpsRecord};
use sensorlog_tools::{SessionSettings, write_session};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// 状态行输出间隔
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// 采集命令参数
#[derive(Args, Debug, Default)]
pub struct RecordCommand {
    /// 配置文件（默认使用用户配置）
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// CAN 通道（覆盖配置）
    #[arg(short, long)]
    pub channel: Option<String>,

    /// CAN 比特率（覆盖配置）
    #[arg(short, long)]
    pub bitrate: Option<u32>,

    /// CAN FD 比特率描述串
    #[arg(long)]
    pub fd_bitrate: Option<String>,

    /// 读取方式
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// 被试编号
    #[arg(long)]
    pub subject: Option<String>,

    /// 试次编号
    #[arg(long)]
    pub trial: Option<String>,

    /// 输出根目录
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// 不使用惯性传感器
    #[arg(long)]
    pub no_inertial: bool,

    /// 启动时执行零点校准（约 5 分钟，需保持静止）
    #[arg(long)]
    pub zero_calibration: bool,

    /// 启用网络推送
    #[arg(long)]
    pub network: bool,

    /// 网络推送端口
    #[arg(long)]
    pub port: Option<u16>,

    /// 打开快门控制器
    #[arg(long)]
    pub shutter: bool,

    /// 变道提示时间（秒）
    #[arg(long)]
    pub shutter_time: Option<f64>,

    /// 提醒时间（秒）
    #[arg(long)]
    pub lane_change_time: Option<f64>,

    /// 提前关闭眼镜的秒数
    #[arg(long)]
    pub offset: Option<f64>,

    /// 时间列显示时间戳而不是到达间隔
    #[arg(long)]
    pub timestamps: bool,

    /// 采集时长（秒），0 表示直到 Ctrl+C
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// 显示刷新间隔（毫秒）
    #[arg(long, default_value_t = 100)]
    pub refresh_ms: u64,

    /// 覆盖已有会话文件
    #[arg(short, long)]
    pub force: bool,
}

impl RecordCommand {
    /// 配置文件与命令行参数合并后的设置
    pub fn settings(&self) -> Result<SessionSettings> {
        let mut settings = load_settings(self.config.as_deref())?;

        if let Some(ref channel) = self.channel {
            settings.channel = channel.clone();
        }
        if let Some(bitrate) = self.bitrate {
            settings.bitrate = bitrate;
        }
        if self.fd_bitrate.is_some() {
            settings.fd_bitrate = self.fd_bitrate.clone();
        }
        if let Some(mode) = self.mode {
            settings.reading_mode = mode.into();
        }
        if let Some(ref subject) = self.subject {
            settings.subject = subject.clone();
        }
        if let Some(ref trial) = self.trial {
            settings.trial = trial.clone();
        }
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = dir.clone();
        }
        if self.no_inertial {
            settings.inertial.enabled = false;
        }
        if self.zero_calibration {
            settings.inertial.zero_calibration = true;
        }
        if self.network {
            settings.network.enabled = true;
        }
        if let Some(port) = self.port {
            settings.network.port = port;
        }
        if self.shutter {
            settings.shutter.enabled = true;
        }
        if let Some(t) = self.shutter_time {
            settings.shutter.shutter_time = t;
        }
        if let Some(t) = self.lane_change_time {
            settings.shutter.lane_change_time = t;
        }
        if let Some(t) = self.offset {
            settings.shutter.offset = t;
        }
        if self.timestamps {
            settings.show_period = false;
        }

        Ok(settings)
    }

    /// 执行采集
    pub fn execute(&self) -> Result<()> {
        let settings = self.settings()?;
        let layout = settings.layout();

        if layout.would_overwrite() && !self.force {
            bail!(
                "WILL Overwrite! {} 已有会话文件，使用 --force 覆盖",
                layout.nested_dir().display()
            );
        }

        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
            println!("\n收到退出信号，正在保存...");
        })
        .context("设置 Ctrl+C 处理失败")?;

        println!("⏳ 初始化 {} @ {} bit/s...", settings.channel, settings.bitrate);

        let bus = open_bus(&settings)?;
        let inertial = open_inertial(&settings);

        let mut session = SessionBuilder::new(settings.bus_config())
            .reading_mode(settings.reading_mode.into())
            .inertial_config(settings.inertial.to_config())
            .start(bus, inertial)
            .context("启动采集会话失败")?;
        session.set_show_period(settings.show_period);

        if settings.network.enabled {
            session
                .start_network(settings.network.to_config())
                .context("启动网络推送失败")?;
        }

        let mut shutter = ShutterController::new(
            open_shutter(&settings),
            session.store().clone(),
            session.log().clone(),
        );
        let timeline = settings.shutter.timeline();
        if timeline.is_pending() {
            shutter.start(timeline);
        }

        println!("✅ 开始采集（Ctrl+C 结束）");

        let logs = session.log_receiver();
        let mut monitor = Monitor::default();
        let refresh = Duration::from_millis(self.refresh_ms.max(1));
        let start = Instant::now();
        let mut last_status = Instant::now();

        while running.load(Ordering::SeqCst) {
            if self.duration > 0 && start.elapsed() >= Duration::from_secs(self.duration) {
                println!("\n⏱️  达到时长限制");
                break;
            }

            // 手动模式由显示循环排空（错误已在排空时记录）
            if session.reading_mode() == ReadingMode::Manual {
                session.read_pending();
            }

            for line in logs.try_iter() {
                println!("📋 {}", line);
            }

            let update = session.refresh_display(monitor.shown_rows);
            for line in monitor.apply(&update) {
                println!("{}", line);
            }

            for action in shutter.tick() {
                println!("{}", describe_action(action));
            }

            if last_status.elapsed() >= STATUS_INTERVAL {
                println!("{}", monitor.status_line(&session.metrics()));
                last_status = Instant::now();
            }

            std::thread::sleep(refresh);
        }

        let outcome = session.release();
        for fault in &outcome.faults {
            warn!("{}", fault);
        }
        if let Err(e) = shutter.reset_switch() {
            warn!("Shutter glass switch failed: {}", e);
        }

        println!(
            "💾 保存 {} 条总线样本、{} 条惯性样本、{} 条快门事件...",
            outcome.records.gps_samples.len(),
            outcome.records.inertial_samples.len(),
            outcome.records.shutter_events.len()
        );
        let summary = write_session(&outcome.records, &layout)?;
        if summary.output.is_flat() {
            println!("⚠️  目录创建失败，已使用平铺文件名");
        }
        println!(
            "✅ 保存完成: GPS {} 行, Acc {} 行, Shutter {} 行",
            summary.gps_rows, summary.acc_rows, summary.shutter_rows
        );

        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn open_bus(settings: &SessionSettings) -> Result<Box<dyn BusAdapter>> {
    Ok(Box::new(sensorlog_adapter::SocketCanBus::new(&settings.channel)))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_settings: &SessionSettings) -> Result<Box<dyn BusAdapter>> {
    bail!("SocketCAN 仅支持 Linux")
}

/// 惯性传感器打不开时不影响总线采集
fn open_inertial(settings: &SessionSettings) -> Option<Box<dyn SerialDevice>> {
    if !settings.inertial.enabled {
        return None;
    }
    match UsbSerialDevice::open(&settings.inertial.serial) {
        Ok(device) => Some(Box::new(device)),
        Err(e) => {
            warn!("Inertial sensor unavailable ({}), recording bus only", e);
            None
        },
    }
}

fn open_shutter(settings: &SessionSettings) -> Option<Box<dyn ShutterSwitch>> {
    if !settings.shutter.enabled {
        return None;
    }
    match UsbShutterSwitch::open(&settings.shutter.serial) {
        Ok(switch) => Some(Box::new(switch)),
        Err(e) => {
            warn!("Shutter controller unavailable ({}), events are still recorded", e);
            None
        },
    }
}

fn describe_action(action: ShutterAction) -> &'static str {
    match action {
        ShutterAction::CloseGlass => "🕶️  Shutter glass OFF",
        ShutterAction::LaneChange => "🚗 Lane change (LC)",
        ShutterAction::Alarm => "🔔 Alarm",
    }
}

fn format_row(row: &DisplayRow) -> String {
    format!(
        "{:>4} {:<10} {:>10} {:>2} {:>8} {:>10} {}",
        row.position,
        row.type_text,
        row.id_text,
        row.length,
        row.count,
        row.time_text,
        row.data_text
    )
}

/// 显示端状态：已显示行数与各 GPS 报文的最新解码
#[derive(Debug, Default)]
struct Monitor {
    shown_rows: usize,
    latest_gps: [Option<GpsRecord>; GPS_MESSAGE_KINDS],
    cumulative_distance: Option<f64>,
    bad_ratio: f64,
}

impl Monitor {
    /// 处理一次刷新，返回新出现报文的行
    fn apply(&mut self, update: &DisplayUpdate) -> Vec<String> {
        let lines = update
            .rows
            .iter()
            .filter(|row| row.position >= self.shown_rows)
            .map(|row| format!("➕ {}", format_row(row)))
            .collect();
        self.shown_rows = update.table_len;

        for record in &update.gps {
            let slot = (record.id() - GPS_ID_RANGE.start()) as usize;
            if let Some(entry) = self.latest_gps.get_mut(slot) {
                *entry = Some(*record);
            }
        }
        if let Some(distance) = update.distance {
            self.cumulative_distance = Some(distance.cumulative);
        }
        self.bad_ratio = update.inertial_bad_ratio;
        lines
    }

    fn status_line(&self, metrics: &MetricsSnapshot) -> String {
        let mut line = format!(
            "📊 frames={} msgs={} inertial={} (bad: {:.3}) sent={}",
            metrics.bus_frames,
            self.shown_rows,
            metrics.inertial_frames_total,
            self.bad_ratio,
            metrics.net_lines_sent
        );
        if let Some(GpsRecord::PositionY(r)) = self.latest_gps[1] {
            line.push_str(&format!(" speed={:.3}km/h", r.speed_kmh()));
        }
        if let Some(distance) = self.cumulative_distance {
            line.push_str(&format!(" dist={:.3}", distance));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_protocol::{DistanceReading, GeoCoordinate, PositionYRecord};
    use sensorlog_tools::ReadingModeSetting;

    fn row(position: usize) -> DisplayRow {
        DisplayRow {
            position,
            type_text: "STD".into(),
            id_text: "301h".into(),
            length: 8,
            count: 1,
            time_text: "0".into(),
            data_text: " 00".into(),
        }
    }

    #[test]
    fn test_cli_overrides_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "channel = \"can1\"\nsubject = \"s09\"\n").unwrap();

        let cmd = RecordCommand {
            config: Some(path),
            channel: Some("vcan0".into()),
            mode: Some(ModeArg::Timer),
            no_inertial: true,
            network: true,
            shutter_time: Some(12.5),
            timestamps: true,
            ..Default::default()
        };
        let settings = cmd.settings().unwrap();

        assert_eq!(settings.channel, "vcan0");
        assert_eq!(settings.subject, "s09");
        assert_eq!(settings.reading_mode, ReadingModeSetting::Timer);
        assert!(!settings.inertial.enabled);
        assert!(settings.network.enabled);
        assert_eq!(settings.shutter.shutter_time, 12.5);
        assert!(!settings.show_period);
    }

    #[test]
    fn test_monitor_reports_new_rows_only() {
        let mut monitor = Monitor::default();
        let first = DisplayUpdate {
            rows: vec![row(0), row(1)],
            table_len: 2,
            ..Default::default()
        };
        assert_eq!(monitor.apply(&first).len(), 2);

        // 已显示行的更新不重复报告
        let second = DisplayUpdate {
            rows: vec![row(1), row(2)],
            table_len: 3,
            ..Default::default()
        };
        assert_eq!(monitor.apply(&second).len(), 1);
        assert_eq!(monitor.shown_rows, 3);
    }

    #[test]
    fn test_status_line_includes_speed_and_distance() {
        let mut monitor = Monitor::default();
        monitor.apply(&DisplayUpdate {
            gps: vec![GpsRecord::PositionY(PositionYRecord {
                longitude: GeoCoordinate::new(0),
                speed_raw: 100,
                heading_raw: 0,
            })],
            distance: Some(DistanceReading {
                cumulative: 5.12,
                delta: 0.0,
            }),
            ..Default::default()
        });

        let line = monitor.status_line(&MetricsSnapshot::default());
        assert!(line.contains("speed=1.852km/h"));
        assert!(line.contains("dist=5.120"));
    }
}
