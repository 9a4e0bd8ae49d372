//! # `Acc.txt` 行格式
//!
//! 每个有效惯性帧一行：10 个原始整数字段、会话坏帧比例、
//! 去空格的帧十六进制、CPU 时间戳，以 tab 分隔。

use anyhow::{Context, Result, bail};
use sensorlog_driver::InertialSample;
use sensorlog_protocol::{
    AccelScale, HexDigest, INERTIAL_FRAME_LEN, InertialRaw, InertialReading,
    decode_inertial_digest, strip_whitespace,
};

/// 表头
pub const ACC_HEADER: &str = "Roll_Angle\tPitch_Angle\tRoll_Rate\tPitch_Rate\tYaw_Rate\tAcc_X\tACC_Y\tACC_Z\tTempature\tTime\tBadRatio\tRaw\tCPUTIME\n";

const COLUMNS: usize = 13;

/// 坏帧比例文本：6 位有效数字，去掉末尾的 0
pub fn format_bad_ratio(ratio: f64) -> String {
    if ratio == 0.0 || !ratio.is_finite() {
        return "0".to_string();
    }
    let magnitude = ratio.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, ratio);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// 逐行生成 `Acc.txt`
///
/// 坏帧比例在导出时按会话总数计算一次，每行相同。
#[derive(Debug, Clone)]
pub struct AccTableWriter {
    bad_ratio: String,
}

impl AccTableWriter {
    pub fn new(bad_ratio: f64) -> Self {
        Self {
            bad_ratio: format_bad_ratio(bad_ratio),
        }
    }

    /// 生成一行（含换行）；不足一帧的样本返回 `None`
    pub fn row(&self, sample: &InertialSample) -> Option<String> {
        let digest = HexDigest::parse(&sample.frame_text);
        if !digest.covers(INERTIAL_FRAME_LEN) {
            return None;
        }
        let r = decode_inertial_digest(&digest).into_inner();

        Some(format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            r.roll_angle,
            r.pitch_angle,
            r.roll_rate,
            r.pitch_rate,
            r.yaw_rate,
            r.acc_x,
            r.acc_y,
            r.acc_z,
            r.temperature,
            r.time,
            self.bad_ratio,
            strip_whitespace(&sample.frame_text),
            sample.cpu_millis
        ))
    }
}

/// 解析后的 `Acc.txt` 行
#[derive(Debug, Clone, PartialEq)]
pub struct AccRow {
    pub raw: InertialRaw,
    pub bad_ratio: f64,
    /// 去空格的帧十六进制
    pub frame_hex: String,
    pub cpu_millis: i64,
}

impl AccRow {
    /// 按导出量程换算
    pub fn reading(&self) -> InertialReading {
        self.raw.scaled(AccelScale::Export)
    }
}

/// 解析一行（可带或不带换行）
pub fn parse_acc_row(line: &str) -> Result<AccRow> {
    let line = line.trim_end_matches(['\r', '\n']);
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != COLUMNS {
        bail!("expected {} columns, got {}", COLUMNS, cols.len());
    }

    let i16_at = |i: usize| -> Result<i16> {
        cols[i]
            .parse()
            .with_context(|| format!("bad value '{}' in column {}", cols[i], i))
    };
    let u16_at = |i: usize| -> Result<u16> {
        cols[i]
            .parse()
            .with_context(|| format!("bad value '{}' in column {}", cols[i], i))
    };

    let raw = InertialRaw {
        roll_angle: i16_at(0)?,
        pitch_angle: i16_at(1)?,
        roll_rate: i16_at(2)?,
        pitch_rate: i16_at(3)?,
        yaw_rate: i16_at(4)?,
        acc_x: i16_at(5)?,
        acc_y: i16_at(6)?,
        acc_z: i16_at(7)?,
        temperature: u16_at(8)?,
        time: u16_at(9)?,
    };

    Ok(AccRow {
        raw,
        bad_ratio: cols[10].parse().context("bad BadRatio column")?,
        frame_hex: cols[11].to_string(),
        cpu_millis: cols[12].parse().context("bad CPUTIME column")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_protocol::{SYNC_BYTE, checksum, frame_hex};

    fn frame() -> [u8; INERTIAL_FRAME_LEN] {
        let mut f = [0u8; INERTIAL_FRAME_LEN];
        f[0] = SYNC_BYTE;
        f[1..3].copy_from_slice(&(-100i16).to_be_bytes());
        f[11..13].copy_from_slice(&0x4000i16.to_be_bytes());
        f[17..19].copy_from_slice(&1200u16.to_be_bytes());
        f[19..21].copy_from_slice(&7u16.to_be_bytes());
        f[21] = checksum(&f);
        f
    }

    #[test]
    fn test_format_bad_ratio() {
        assert_eq!(format_bad_ratio(0.0), "0");
        assert_eq!(format_bad_ratio(1.0), "1");
        assert_eq!(format_bad_ratio(0.5), "0.5");
        assert_eq!(format_bad_ratio(1.0 / 11.0), "0.0909091");
        assert_eq!(format_bad_ratio(0.25), "0.25");
    }

    #[test]
    fn test_row_layout() {
        let sample = InertialSample {
            frame_text: frame_hex(&frame()),
            cpu_millis: 1234,
        };
        let line = AccTableWriter::new(0.25).row(&sample).unwrap();
        let cols: Vec<&str> = line.trim_end().split('\t').collect();

        assert_eq!(cols.len(), 13);
        assert_eq!(cols[0], "-100");
        assert_eq!(cols[5], "16384");
        assert_eq!(cols[8], "1200");
        assert_eq!(cols[9], "7");
        assert_eq!(cols[10], "0.25");
        assert_eq!(cols[11].len(), 44);
        assert_eq!(cols[12], "1234");
    }

    #[test]
    fn test_parse_back() {
        let sample = InertialSample {
            frame_text: frame_hex(&frame()),
            cpu_millis: 99,
        };
        let line = AccTableWriter::new(0.0).row(&sample).unwrap();
        let row = parse_acc_row(&line).unwrap();

        assert_eq!(row.raw.roll_angle, -100);
        assert_eq!(row.cpu_millis, 99);
        assert_eq!(row.frame_hex, sample.frame_text.replace(' ', ""));
        assert!((row.reading().acc_x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_frame_skipped() {
        let sample = InertialSample {
            frame_text: "FF 00 01".into(),
            cpu_millis: 0,
        };
        assert!(AccTableWriter::new(0.0).row(&sample).is_none());
        assert!(parse_acc_row("1\t2").is_err());
    }
}
