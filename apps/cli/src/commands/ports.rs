//! 串口设备列表

use anyhow::{Context, Result};
use clap::Args;
use sensorlog_adapter::serial::list_devices;
use sensorlog_adapter::{INERTIAL_DEVICE_SERIAL, SHUTTER_DEVICE_SERIAL};

/// 列出 USB 串口，并标出已知设备
#[derive(Args, Debug)]
pub struct PortsCommand {
    /// 只显示已知设备（惯性传感器、快门控制器）
    #[arg(long)]
    pub known: bool,
}

fn role(serial: Option<&str>) -> Option<&'static str> {
    match serial {
        Some(INERTIAL_DEVICE_SERIAL) => Some("inertial sensor"),
        Some(SHUTTER_DEVICE_SERIAL) => Some("shutter controller"),
        _ => None,
    }
}

impl PortsCommand {
    pub fn execute(&self) -> Result<()> {
        let devices = list_devices().context("枚举串口失败")?;

        let mut shown = 0;
        for (path, serial) in &devices {
            let role = role(serial.as_deref());
            if self.known && role.is_none() {
                continue;
            }
            println!(
                "{:<20} {:<12} {}",
                path,
                serial.as_deref().unwrap_or("-"),
                role.unwrap_or("")
            );
            shown += 1;
        }

        if shown == 0 {
            println!("(未找到 USB 串口设备)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role() {
        assert_eq!(role(Some("FTU7GDEE")), Some("inertial sensor"));
        assert_eq!(role(Some("FTH7PDPZ")), Some("shutter controller"));
        assert_eq!(role(Some("OTHER")), None);
        assert_eq!(role(None), None);
    }
}
