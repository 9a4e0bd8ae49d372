//! # `Shutter.txt` 行格式
//!
//! `<毫秒时间戳>\t<标签>\n`，无表头。

use anyhow::{Context, Result, anyhow};
use sensorlog_driver::{ShutterEvent, ShutterLabel};

pub fn shutter_row(event: &ShutterEvent) -> String {
    format!("{}\t{}\n", event.millis, event.label)
}

pub fn parse_shutter_row(line: &str) -> Result<ShutterEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (millis, label) = line
        .split_once('\t')
        .ok_or_else(|| anyhow!("missing tab in shutter row '{}'", line))?;

    Ok(ShutterEvent {
        millis: millis
            .parse()
            .with_context(|| format!("bad timestamp '{}'", millis))?,
        label: label.parse::<ShutterLabel>().map_err(|e| anyhow!(e))?,
    })
}
