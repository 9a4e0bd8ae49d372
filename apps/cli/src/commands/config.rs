//! 配置管理命令
//!
//! 用于管理默认会话设置（通道、被试编号、设备序列号等）

use anyhow::{Context, Result};
use clap::Subcommand;
use sensorlog_tools::{ReadingModeSetting, SessionSettings};
use std::fs;
use std::path::{Path, PathBuf};

/// 覆盖配置文件路径的环境变量
pub const CONFIG_ENV: &str = "SENSORLOG_CONFIG";

/// 配置文件路径
pub fn config_file() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("sensorlog");
    path.push("config.toml");
    Ok(path)
}

/// 加载设置：显式路径必须存在，默认路径不存在时使用默认值
pub fn load_settings(explicit: Option<&Path>) -> Result<SessionSettings> {
    if let Some(path) = explicit {
        return SessionSettings::load_from_file(path);
    }

    let path = config_file()?;
    if !path.exists() {
        return Ok(SessionSettings::default());
    }
    SessionSettings::load_from_file(&path)
}

fn save_settings(settings: &SessionSettings) -> Result<PathBuf> {
    let path = config_file()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("创建配置目录失败")?;
    }
    settings.save_to_file(&path)?;
    Ok(path)
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// CAN 通道（如 can0）
        #[arg(short, long)]
        channel: Option<String>,

        /// CAN 比特率（bit/s）
        #[arg(short, long)]
        bitrate: Option<u32>,

        /// 读取方式
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// 被试编号
        #[arg(long)]
        subject: Option<String>,

        /// 试次编号
        #[arg(long)]
        trial: Option<String>,

        /// 输出根目录
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// 惯性传感器 USB 序列号
        #[arg(long)]
        inertial_serial: Option<String>,

        /// 快门控制器 USB 序列号
        #[arg(long)]
        shutter_serial: Option<String>,

        /// 网络推送端口
        #[arg(long)]
        port: Option<u16>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,

    /// 恢复默认配置
    Reset,
}

/// 读取方式参数
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Event,
    Timer,
    Manual,
}

impl From<ModeArg> for ReadingModeSetting {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Event => ReadingModeSetting::Event,
            ModeArg::Timer => ReadingModeSetting::Timer,
            ModeArg::Manual => ReadingModeSetting::Manual,
        }
    }
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                channel,
                bitrate,
                mode,
                subject,
                trial,
                output_dir,
                inertial_serial,
                shutter_serial,
                port,
            } => {
                let mut settings = load_settings(None)?;

                if let Some(channel) = channel {
                    println!("✅ 设置默认通道: {}", channel);
                    settings.channel = channel;
                }
                if let Some(bitrate) = bitrate {
                    println!("✅ 设置比特率: {}", bitrate);
                    settings.bitrate = bitrate;
                }
                if let Some(mode) = mode {
                    println!("✅ 设置读取方式: {:?}", mode);
                    settings.reading_mode = mode.into();
                }
                if let Some(subject) = subject {
                    println!("✅ 设置被试编号: {}", subject);
                    settings.subject = subject;
                }
                if let Some(trial) = trial {
                    println!("✅ 设置试次编号: {}", trial);
                    settings.trial = trial;
                }
                if let Some(dir) = output_dir {
                    println!("✅ 设置输出目录: {}", dir.display());
                    settings.output_dir = dir;
                }
                if let Some(serial) = inertial_serial {
                    println!("✅ 设置惯性传感器序列号: {}", serial);
                    settings.inertial.serial = serial;
                }
                if let Some(serial) = shutter_serial {
                    println!("✅ 设置快门控制器序列号: {}", serial);
                    settings.shutter.serial = serial;
                }
                if let Some(port) = port {
                    println!("✅ 设置推送端口: {}", port);
                    settings.network.port = port;
                }

                save_settings(&settings)?;
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let settings = load_settings(None)?;
                match key.as_str() {
                    "channel" => println!("{}", settings.channel),
                    "bitrate" => println!("{}", settings.bitrate),
                    "subject" => println!("{}", settings.subject),
                    "trial" => println!("{}", settings.trial),
                    "output_dir" => println!("{}", settings.output_dir.display()),
                    "inertial_serial" => println!("{}", settings.inertial.serial),
                    "shutter_serial" => println!("{}", settings.shutter.serial),
                    "port" => println!("{}", settings.network.port),
                    _ => {
                        let text = toml::to_string_pretty(&settings).context("序列化配置失败")?;
                        print!("{}", text);
                    },
                }
                Ok(())
            },

            ConfigCommand::Check => {
                let path = config_file()?;
                println!("配置文件: {}", path.display());
                if !path.exists() {
                    println!("  (不存在，使用默认配置)");
                    return Ok(());
                }
                let settings = SessionSettings::load_from_file(&path)?;
                println!("  通道: {} @ {}", settings.channel, settings.bitrate);
                println!("  输出: {}", settings.layout().nested_dir().display());
                Ok(())
            },

            ConfigCommand::Reset => {
                let path = save_settings(&SessionSettings::default())?;
                println!("✅ 已恢复默认配置: {}", path.display());
                Ok(())
            },
        }
    }
}
