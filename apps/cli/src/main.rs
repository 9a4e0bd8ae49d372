//! # Sensorlog CLI
//!
//! CAN 总线 GPS 报文与惯性传感器的同步采集工具。
//!
//! ```bash
//! # 配置默认通道与被试编号
//! sensorlog config set --channel can0 --subject s03
//!
//! # 采集，Ctrl+C 结束后写出 s03/t01/{GPS,Acc,Shutter}.txt
//! sensorlog record --trial t01 --network
//!
//! # 解码单条报文
//! sensorlog decode gps --id 302 --data "FF 43 9E B2 01 F4 23 28"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ConfigCommand, DecodeCommand, PortsCommand, RecordCommand};

/// Sensorlog CLI - 多传感器采集命令行工具
#[derive(Parser, Debug)]
#[command(name = "sensorlog")]
#[command(about = "Synchronized CAN/GPS and inertial sensor logging", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 采集并在结束时写出会话文件
    Record {
        #[command(flatten)]
        args: RecordCommand,
    },

    /// 解码单条报文
    #[command(subcommand)]
    Decode(DecodeCommand),

    /// 列出 USB 串口设备
    Ports {
        #[command(flatten)]
        args: PortsCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（驱动层的信息行由 record 命令直接打印，默认只显示警告）
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sensorlog_cli=info".parse()?)
                .add_directive("sensorlog_tools=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Record { args } => args.execute(),
        Commands::Decode(cmd) => cmd.execute(),
        Commands::Ports { args } => args.execute(),
    }
}
