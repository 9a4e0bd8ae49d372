//! # `GPS.txt` 行格式
//!
//! 每条 GPS 报文（0x301..=0x305）输出一行。前 15 列是各字段最近一次的
//! 原始整数值，本条报文未携带的字段沿用上一条的值（会话开始时为空）：
//!
//! ```text
//! Time X Y Speed Heading WGS84 VerticalV TrigDist LongAcc LatAcc Status TrigTime TrigV Distance Sats. | RAW ID CPUTIME [WARNING]
//! ```
//!
//! `RAW` 为去空格的大写十六进制载荷，`ID` 为不带后缀的十六进制 ID，
//! `CPUTIME` 缺失时写 [`CPU_TIME_MISSING`]。0x301 的 GPS 时间早于本会话
//! 第一条非零时间时追加 `WARNING` 列。

use anyhow::{Context, Result, bail};
use sensorlog_driver::GpsSample;
use sensorlog_protocol::{
    DecodeError, GpsRecord, HexDigest, decode_gps_digest, is_gps_id, strip_whitespace,
};

/// 表头
pub const GPS_HEADER: &str = "Time\tX\tY\tSpeed\tHeading\tWGS84\tVerticalV\tTrigDist\tLongAcc\tLatAcc\tStatus\tTrigTime\tTrigV\tDistance\tSats.\tRAW\tID\tCPUTIME\n";

/// 样本缺少 CPU 时间戳时的占位
pub const CPU_TIME_MISSING: &str = "CPU_TIME_MISSING";

/// GPS 时间倒退标记
pub const WARNING_MARK: &str = "WARNING";

/// 携带字段列数
const CARRIED_COLUMNS: usize = 15;

// 列序号
const TIME: usize = 0;
const X: usize = 1;
const Y: usize = 2;
const SPEED: usize = 3;
const HEADING: usize = 4;
const WGS84: usize = 5;
const VERTICAL_V: usize = 6;
const TRIG_DIST: usize = 7;
const LONG_ACC: usize = 8;
const LAT_ACC: usize = 9;
const STATUS: usize = 10;
const TRIG_TIME: usize = 11;
const TRIG_V: usize = 12;
const DISTANCE: usize = 13;
const SATS: usize = 14;

/// 逐行生成 `GPS.txt`
///
/// 写入器持有跨行携带的字段，必须按样本的插入顺序调用。
#[derive(Debug, Clone, Default)]
pub struct GpsTableWriter {
    carried: [String; CARRIED_COLUMNS],
    begin_time: Option<u32>,
}

impl GpsTableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成一行（含换行）；非 GPS ID 的样本返回 `None`
    pub fn row(&mut self, sample: &GpsSample) -> Option<String> {
        let id = sample.id().filter(|id| is_gps_id(*id))?;
        let digest = HexDigest::parse(&sample.data_text);
        let record = decode_gps_digest(id, &digest).ok()?.into_inner();

        let mut time_warning = false;
        match record {
            GpsRecord::PositionX(r) => {
                self.carried[SATS] = r.satellites.to_string();
                self.carried[TIME] = r.time.raw.to_string();
                self.carried[X] = r.latitude.raw.to_string();

                if r.time.raw != 0 {
                    match self.begin_time {
                        None => self.begin_time = Some(r.time.raw),
                        Some(begin) => time_warning = begin > r.time.raw,
                    }
                }
            },
            GpsRecord::PositionY(r) => {
                self.carried[Y] = r.longitude.raw.to_string();
                self.carried[SPEED] = r.speed_raw.to_string();
                self.carried[HEADING] = r.heading_raw.to_string();
            },
            GpsRecord::Altitude(r) => {
                self.carried[WGS84] = r.altitude_raw.to_string();
                self.carried[VERTICAL_V] = r.vertical_velocity_raw.to_string();
                self.carried[STATUS] = r.status_bits();
            },
            GpsRecord::Acceleration(r) => {
                self.carried[TRIG_DIST] = r.trigger_distance_raw.to_string();
                self.carried[LONG_ACC] = r.longitudinal_raw.to_string();
                self.carried[LAT_ACC] = r.lateral_raw.to_string();
            },
            GpsRecord::Distance(r) => {
                self.carried[DISTANCE] = r.distance_raw.to_string();
                self.carried[TRIG_TIME] = r.trigger_time_raw.to_string();
                self.carried[TRIG_V] = r.trigger_speed_raw.to_string();
            },
        }

        let mut line = String::with_capacity(128);
        for field in &self.carried {
            line.push_str(field);
            line.push('\t');
        }
        line.push_str(&strip_whitespace(&sample.data_text));
        line.push('\t');
        line.push_str(&format!("{:X}", id));
        line.push('\t');
        match sample.cpu_millis {
            Some(ms) => line.push_str(&ms.to_string()),
            None => line.push_str(CPU_TIME_MISSING),
        }
        if time_warning {
            line.push('\t');
            line.push_str(WARNING_MARK);
        }
        line.push('\n');
        Some(line)
    }
}

/// 解析后的 `GPS.txt` 行
///
/// 携带列为空时对应字段为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GpsRow {
    pub time: Option<u32>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub speed: Option<u16>,
    pub heading: Option<u16>,
    pub wgs84: Option<i32>,
    pub vertical_v: Option<i16>,
    pub trig_dist: Option<u32>,
    pub long_acc: Option<i16>,
    pub lat_acc: Option<i16>,
    /// 状态字节高 4 位（如 `1010`）
    pub status: Option<String>,
    pub trig_time: Option<u16>,
    pub trig_v: Option<u16>,
    pub distance: Option<u32>,
    pub sats: Option<u8>,
    /// 去空格的十六进制载荷
    pub raw: String,
    pub id: u32,
    pub cpu_millis: Option<i64>,
    pub warning: bool,
}

impl GpsRow {
    /// 从 `RAW` 列重新解码本行报文
    pub fn decode(&self) -> Result<GpsRecord, DecodeError> {
        decode_gps_digest(self.id, &HexDigest::parse(&self.raw)).map(|d| d.into_inner())
    }
}

/// 解析一行（可带或不带换行）
pub fn parse_gps_row(line: &str) -> Result<GpsRow> {
    let line = line.trim_end_matches(['\r', '\n']);
    let cols: Vec<&str> = line.split('\t').collect();

    let warning = match cols.len() {
        n if n == CARRIED_COLUMNS + 3 => false,
        n if n == CARRIED_COLUMNS + 4 => {
            if cols[CARRIED_COLUMNS + 3] != WARNING_MARK {
                bail!("unexpected trailing column '{}'", cols[CARRIED_COLUMNS + 3]);
            }
            true
        },
        n => bail!("expected {} or {} columns, got {}", CARRIED_COLUMNS + 3, CARRIED_COLUMNS + 4, n),
    };

    let id_text = cols[CARRIED_COLUMNS + 1];
    let id = u32::from_str_radix(id_text, 16).with_context(|| format!("bad ID '{}'", id_text))?;

    let cpu_text = cols[CARRIED_COLUMNS + 2];
    let cpu_millis = if cpu_text == CPU_TIME_MISSING {
        None
    } else {
        Some(cpu_text.parse().with_context(|| format!("bad CPU time '{}'", cpu_text))?)
    };

    Ok(GpsRow {
        time: field(&cols, TIME)?,
        x: field(&cols, X)?,
        y: field(&cols, Y)?,
        speed: field(&cols, SPEED)?,
        heading: field(&cols, HEADING)?,
        wgs84: field(&cols, WGS84)?,
        vertical_v: field(&cols, VERTICAL_V)?,
        trig_dist: field(&cols, TRIG_DIST)?,
        long_acc: field(&cols, LONG_ACC)?,
        lat_acc: field(&cols, LAT_ACC)?,
        status: Some(cols[STATUS]).filter(|s| !s.is_empty()).map(str::to_string),
        trig_time: field(&cols, TRIG_TIME)?,
        trig_v: field(&cols, TRIG_V)?,
        distance: field(&cols, DISTANCE)?,
        sats: field(&cols, SATS)?,
        raw: cols[CARRIED_COLUMNS].to_string(),
        id,
        cpu_millis,
        warning,
    })
}

fn field<T>(cols: &[&str], index: usize) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text = cols[index];
    if text.is_empty() {
        return Ok(None);
    }
    let value = text
        .parse()
        .with_context(|| format!("bad value '{}' in column {}", text, index))?;
    Ok(Some(value))
}
