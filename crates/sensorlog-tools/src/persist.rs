//! # 会话落盘
//!
//! 会话释放后一次性写出三份文件，按样本插入顺序逐行输出。
//! 不做增量写入：整个会话的样本都在内存中。

use crate::acc_file::{ACC_HEADER, AccTableWriter};
use crate::gps_file::{GPS_HEADER, GpsTableWriter};
use crate::layout::{ACC_FILE_NAME, GPS_FILE_NAME, OutputDir, SHUTTER_FILE_NAME, SessionLayout};
use crate::shutter_file::shutter_row;
use anyhow::{Context, Result};
use sensorlog_driver::{GpsSample, InertialSample, SessionRecords, ShutterEvent};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// 写出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub output: OutputDir,
    pub gps_rows: usize,
    /// 非 GPS ID 的总线样本
    pub gps_skipped: usize,
    pub acc_rows: usize,
    pub shutter_rows: usize,
}

/// 写出 `GPS.txt` 内容，返回 (行数, 跳过数)
pub fn write_gps_table<W: Write>(mut out: W, samples: &[GpsSample]) -> io::Result<(usize, usize)> {
    out.write_all(GPS_HEADER.as_bytes())?;

    let mut writer = GpsTableWriter::new();
    let (mut rows, mut skipped) = (0, 0);
    for sample in samples {
        match writer.row(sample) {
            Some(line) => {
                out.write_all(line.as_bytes())?;
                rows += 1;
            },
            None => skipped += 1,
        }
    }
    out.flush()?;
    Ok((rows, skipped))
}

/// 写出 `Acc.txt` 内容，返回行数
pub fn write_acc_table<W: Write>(
    mut out: W,
    samples: &[InertialSample],
    bad_ratio: f64,
) -> io::Result<usize> {
    out.write_all(ACC_HEADER.as_bytes())?;

    let writer = AccTableWriter::new(bad_ratio);
    let mut rows = 0;
    for line in samples.iter().filter_map(|s| writer.row(s)) {
        out.write_all(line.as_bytes())?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

/// 写出 `Shutter.txt` 内容，返回行数
pub fn write_shutter_table<W: Write>(mut out: W, events: &[ShutterEvent]) -> io::Result<usize> {
    for event in events {
        out.write_all(shutter_row(event).as_bytes())?;
    }
    out.flush()?;
    Ok(events.len())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("创建文件失败: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// 按布局写出会话的全部文件
pub fn write_session(records: &SessionRecords, layout: &SessionLayout) -> Result<WriteSummary> {
    let output = layout.resolve();
    debug!("Writing session files to {:?}", output);

    info!("Saving GPS Data...");
    let (gps_rows, gps_skipped) = write_gps_table(
        create(&output.file(GPS_FILE_NAME))?,
        &records.gps_samples,
    )
    .context("写入 GPS 数据失败")?;
    info!("GPS Data Saved");

    info!("Saving Accelerometer Data...");
    let acc_rows = write_acc_table(
        create(&output.file(ACC_FILE_NAME))?,
        &records.inertial_samples,
        records.inertial_bad_ratio(),
    )
    .context("写入惯性数据失败")?;

    let shutter_rows = write_shutter_table(
        create(&output.file(SHUTTER_FILE_NAME))?,
        &records.shutter_events,
    )
    .context("写入快门事件失败")?;

    Ok(WriteSummary {
        output,
        gps_rows,
        gps_skipped,
        acc_rows,
        shutter_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tables_have_headers() {
        let mut gps = Vec::new();
        assert_eq!(write_gps_table(&mut gps, &[]).unwrap(), (0, 0));
        assert_eq!(String::from_utf8(gps).unwrap(), GPS_HEADER);

        let mut acc = Vec::new();
        assert_eq!(write_acc_table(&mut acc, &[], 0.0).unwrap(), 0);
        assert_eq!(String::from_utf8(acc).unwrap(), ACC_HEADER);

        let mut shutter = Vec::new();
        assert_eq!(write_shutter_table(&mut shutter, &[]).unwrap(), 0);
        assert!(shutter.is_empty());
    }

    #[test]
    fn test_non_gps_samples_counted_as_skipped() {
        let samples = vec![
            GpsSample {
                id_text: "100h".into(),
                data_text: " 01".into(),
                cpu_millis: Some(1),
            },
            GpsSample {
                id_text: "304h".into(),
                data_text: " 00 00 00 00 00 00 00 00".into(),
                cpu_millis: Some(2),
            },
        ];
        let mut out = Vec::new();
        assert_eq!(write_gps_table(&mut out, &samples).unwrap(), (1, 1));
    }
}
