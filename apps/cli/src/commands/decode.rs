//! 解码命令
//!
//! 解码单条 GPS 报文、惯性帧，或回读导出的会话文件

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use sensorlog_protocol::{
    AccelScale, HexDigest, INERTIAL_FRAME_LEN, decode_gps, decode_inertial_digest, is_valid_frame,
    parse_id,
};
use sensorlog_tools::{ACC_HEADER, GPS_HEADER, parse_acc_row, parse_gps_row, parse_shutter_row};
use std::fs;
use std::path::PathBuf;

/// 解码命令
#[derive(Subcommand, Debug)]
pub enum DecodeCommand {
    /// 解码 GPS 报文（0x301-0x305）
    Gps {
        /// 报文 ID（如 302、0x302、302h）
        #[arg(long)]
        id: String,

        /// 十六进制载荷（空格可选）
        #[arg(long)]
        data: String,

        /// 以 JSON 输出解码结果
        #[arg(long)]
        json: bool,
    },

    /// 解码 22 字节惯性帧
    Inertial {
        /// 十六进制帧（空格可选）
        #[arg(long)]
        data: String,

        /// 使用逐帧实时解码量程（默认为显示与导出量程）
        #[arg(long)]
        live_scale: bool,

        /// 以 JSON 输出解码结果
        #[arg(long)]
        json: bool,
    },

    /// 回读会话文件（GPS.txt / Acc.txt / Shutter.txt）
    File {
        path: PathBuf,

        /// 最多输出的行数
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

/// 解析命令行中的报文 ID
pub fn parse_cli_id(text: &str) -> Option<u32> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    parse_id(text)
}

impl DecodeCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            DecodeCommand::Gps { id, data, json } => {
                let Some(id) = parse_cli_id(&id) else {
                    bail!("无效的报文 ID: {}", id);
                };
                let decoded = decode_gps(id, &data)?;
                if json {
                    let text =
                        serde_json::to_string_pretty(decoded.record()).context("序列化失败")?;
                    println!("{}", text);
                    return Ok(());
                }
                if !decoded.is_complete() {
                    println!("⚠️  数据不足 8 字节或含非法字符，缺失字段按 0 处理");
                }
                println!("{:03X}h  {}", id, decoded.record());
                Ok(())
            },

            DecodeCommand::Inertial { data, live_scale, json } => {
                let digest = HexDigest::parse(&data);
                if !digest.covers(INERTIAL_FRAME_LEN) {
                    bail!("惯性帧需要 {} 字节，实际 {}", INERTIAL_FRAME_LEN, digest.len());
                }
                let valid = is_valid_frame(&digest.bytes()[..INERTIAL_FRAME_LEN]);
                let scale = if live_scale {
                    AccelScale::Live
                } else {
                    AccelScale::Export
                };
                let r = decode_inertial_digest(&digest).into_inner().scaled(scale);
                if json {
                    let text = serde_json::to_string_pretty(&r).context("序列化失败")?;
                    println!("{}", text);
                    return Ok(());
                }

                println!("校验: {}", if valid { "✅ OK" } else { "❌ BAD" });
                println!(
                    "X_Angle: {:.6}  Y_Angle: {:.6}",
                    r.roll_angle, r.pitch_angle
                );
                println!(
                    "X_Rate: {:.6}  Y_Rate: {:.6}  Z_Rate: {:.6}",
                    r.roll_rate, r.pitch_rate, r.yaw_rate
                );
                println!("AccX: {:.6}  AccY: {:.6}  AccZ: {:.6}", r.acc_x, r.acc_y, r.acc_z);
                println!("Temp: {:.2}  Time: {}", r.temperature, r.time);
                Ok(())
            },

            DecodeCommand::File { path, limit } => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("读取文件失败: {}", path.display()))?;
                print_file(&text, limit.unwrap_or(usize::MAX))
            },
        }
    }
}

fn print_file(text: &str, limit: usize) -> Result<()> {
    if text.starts_with(GPS_HEADER) {
        for (n, line) in text.lines().skip(1).take(limit).enumerate() {
            let row = parse_gps_row(line).with_context(|| format!("第 {} 行", n + 2))?;
            let record = row.decode()?;
            let cpu = row.cpu_millis.map_or("-".to_string(), |ms| ms.to_string());
            let mark = if row.warning { "  WARNING" } else { "" };
            println!("{:>14}  {:03X}h  {}{}", cpu, row.id, record, mark);
        }
    } else if text.starts_with(ACC_HEADER) {
        for (n, line) in text.lines().skip(1).take(limit).enumerate() {
            let row = parse_acc_row(line).with_context(|| format!("第 {} 行", n + 2))?;
            let r = row.reading();
            println!(
                "{:>14}  acc=({:.4}, {:.4}, {:.4})  rate=({:.3}, {:.3}, {:.3})  bad={}",
                row.cpu_millis,
                r.acc_x,
                r.acc_y,
                r.acc_z,
                r.roll_rate,
                r.pitch_rate,
                r.yaw_rate,
                row.bad_ratio
            );
        }
    } else {
        for (n, line) in text.lines().take(limit).enumerate() {
            let event = parse_shutter_row(line).with_context(|| format!("第 {} 行", n + 1))?;
            println!("{:>14}  {}", event.millis, event.label);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_id() {
        assert_eq!(parse_cli_id("302"), Some(0x302));
        assert_eq!(parse_cli_id("0x305"), Some(0x305));
        assert_eq!(parse_cli_id("301h"), Some(0x301));
        assert_eq!(parse_cli_id("xyz"), None);
    }

    #[test]
    fn test_print_shutter_file() {
        assert!(print_file("100\tStart\n200\tON\n", usize::MAX).is_ok());
        assert!(print_file("100 Start\n", usize::MAX).is_err());
    }
}
