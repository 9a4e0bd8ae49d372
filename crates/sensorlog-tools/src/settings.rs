//! # 会话设置
//!
//! 一次采集所需的全部参数，保存为 TOML：
//!
//! ```toml
//! channel = "can0"
//! bitrate = 500000
//! reading_mode = "event"
//! subject = "s01"
//! trial = "t01"
//! output_dir = "."
//!
//! [inertial]
//! enabled = true
//! serial = "FTU7GDEE"
//!
//! [shutter]
//! shutter_time = 30.0
//! lane_change_time = 45.0
//! offset = 1.5
//!
//! [network]
//! enabled = true
//! port = 55555
//! ```
//!
//! 缺省字段取默认值。

use crate::layout::{DEFAULT_SUBJECT, DEFAULT_TRIAL, SessionLayout};
use anyhow::{Context, Result};
use sensorlog_adapter::{BusConfig, INERTIAL_DEVICE_SERIAL, SHUTTER_DEVICE_SERIAL};
use sensorlog_driver::{DEFAULT_PORT, InertialConfig, NetworkConfig, ReadingMode, ShutterTimeline};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 会话设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// CAN 通道名
    pub channel: String,

    /// 经典 CAN 比特率（bit/s）
    pub bitrate: u32,

    /// CAN FD 比特率描述串；设置后以 FD 模式初始化
    pub fd_bitrate: Option<String>,

    pub reading_mode: ReadingModeSetting,

    /// 表格是否显示报文周期
    pub show_period: bool,

    pub subject: String,
    pub trial: String,

    /// 输出根目录
    pub output_dir: PathBuf,

    pub inertial: InertialSettings,
    pub shutter: ShutterSettings,
    pub network: NetworkSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            channel: "can0".to_string(),
            bitrate: 500_000,
            fd_bitrate: None,
            reading_mode: ReadingModeSetting::default(),
            show_period: true,
            subject: DEFAULT_SUBJECT.to_string(),
            trial: DEFAULT_TRIAL.to_string(),
            output_dir: PathBuf::from("."),
            inertial: InertialSettings::default(),
            shutter: ShutterSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

impl SessionSettings {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let settings = toml::from_str(&content).context("解析配置文件失败")?;
        Ok(settings)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            channel: self.channel.clone(),
            bitrate: self.bitrate,
            fd_bitrate: self.fd_bitrate.clone(),
        }
    }

    pub fn layout(&self) -> SessionLayout {
        SessionLayout::new(&self.output_dir, &self.subject, &self.trial)
    }
}

/// 读取方式（配置文件中的小写名称）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingModeSetting {
    #[default]
    Event,
    Timer,
    Manual,
}

impl From<ReadingModeSetting> for ReadingMode {
    fn from(mode: ReadingModeSetting) -> Self {
        match mode {
            ReadingModeSetting::Event => ReadingMode::Event,
            ReadingModeSetting::Timer => ReadingMode::Timer,
            ReadingModeSetting::Manual => ReadingMode::Manual,
        }
    }
}

/// 惯性传感器设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertialSettings {
    pub enabled: bool,

    /// USB 序列号
    pub serial: String,

    /// 启动时执行零点校准（约 5 分钟）
    pub zero_calibration: bool,

    /// 输出速率设置值，0 表示不设置
    pub erate: u8,
}

impl Default for InertialSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            serial: INERTIAL_DEVICE_SERIAL.to_string(),
            zero_calibration: false,
            erate: 0,
        }
    }
}

impl InertialSettings {
    pub fn to_config(&self) -> InertialConfig {
        InertialConfig {
            zero_calibration: self.zero_calibration,
            erate: self.erate,
            ..Default::default()
        }
    }
}

/// 快门眼镜与计时设置（秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutterSettings {
    /// 是否打开快门控制器；关闭时仍记录事件
    pub enabled: bool,

    pub serial: String,

    /// 变道提示时间，0 表示不启用
    pub shutter_time: f64,

    /// 提醒时间，0 表示不启用
    pub lane_change_time: f64,

    /// 提前关闭眼镜的秒数
    pub offset: f64,
}

impl Default for ShutterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            serial: SHUTTER_DEVICE_SERIAL.to_string(),
            shutter_time: 0.0,
            lane_change_time: 0.0,
            offset: 0.0,
        }
    }
}

impl ShutterSettings {
    pub fn timeline(&self) -> ShutterTimeline {
        ShutterTimeline::new(self.shutter_time, self.lane_change_time, self.offset)
    }
}

/// 网络推送设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub enabled: bool,
    pub port: u16,
    pub accept_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_PORT,
            accept_timeout_secs: 5,
        }
    }
}

impl NetworkSettings {
    pub fn to_config(&self) -> NetworkConfig {
        NetworkConfig {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port)),
            accept_timeout: Duration::from_secs(self.accept_timeout_secs),
            ..Default::default()
        }
    }
}
