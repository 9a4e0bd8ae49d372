//! GPS 报文解析（ID 0x301-0x305）
//!
//! 载荷为固定偏移的大端二进制记录，每个 ID 一种布局：
//!
//! | ID    | 字节    | 字段 |
//! |-------|---------|------|
//! | 0x301 | [0]     | 卫星数 |
//! |       | [1..4]  | UTC 时间（厘秒，u24） |
//! |       | [4..8]  | 纬度 X（i32，base-100000 分割） |
//! | 0x302 | [0..4]  | 经度 Y（i32） |
//! |       | [4..6]  | 速度（0.01 节，u16） |
//! |       | [6..8]  | 航向（0.01 度，u16） |
//! | 0x303 | [0..3]  | WGS84 海拔（0.01 m，i24） |
//! |       | [3..5]  | 垂直速度（0.01 m/s，i16） |
//! |       | [7]     | 状态字节 |
//! | 0x304 | [0..4]  | 触发距离（u32 × 0.000078125） |
//! |       | [4..6]  | 纵向加速度（0.01 g，i16） |
//! |       | [6..8]  | 横向加速度（0.01 g，i16） |
//! | 0x305 | [0..4]  | 里程（u32 × 0.000078125） |
//! |       | [4..6]  | 触发时间（0.01 s，u16） |
//! |       | [6..8]  | 触发速度（0.01 节，u16） |

use crate::ids::*;
use crate::payload::{DecodeError, Decoded, HexDigest};
use std::fmt;

/// 距离字段的最小分辨率
pub const DISTANCE_LSB: f64 = 0.000078125;

/// 节 → km/h
pub const KNOTS_TO_KMH: f64 = 1.852;

/// 本地显示时区（UTC+10）
pub const LOCAL_UTC_OFFSET_HOURS: u32 = 10;

/// 位置字段的定点基数
const POSITION_BASE: i32 = 100_000;

/// 每种报文解码所需的最少字节数
const GPS_PAYLOAD_LEN: usize = 8;

// ============================================================================
// 字段类型
// ============================================================================

/// 经纬度（base-100000 定点：度×60 + 分，小数部分为 1/100000 分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoCoordinate {
    pub raw: i32,
}

impl GeoCoordinate {
    pub fn new(raw: i32) -> Self {
        Self { raw }
    }

    /// 整度数
    pub fn degrees(&self) -> i32 {
        (self.raw / POSITION_BASE) / 60
    }

    /// 整分数
    pub fn minutes(&self) -> i32 {
        (self.raw / POSITION_BASE) % 60
    }

    /// 分的小数部分（1/100000 分）
    pub fn sub_minutes(&self) -> i32 {
        self.raw % POSITION_BASE
    }

    pub fn is_negative(&self) -> bool {
        self.raw < 0
    }

    /// 十进制度数（带符号）
    pub fn decimal_degrees(&self) -> f64 {
        let minutes = self.minutes() as f64 + self.sub_minutes() as f64 / POSITION_BASE as f64;
        self.degrees() as f64 + minutes / 60.0
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "+" };
        write!(
            f,
            "{} {}d {}.{}m ({} {:.8})",
            sign,
            self.degrees().abs(),
            self.minutes().abs(),
            self.sub_minutes().abs(),
            sign,
            self.decimal_degrees().abs()
        )
    }
}

/// GPS 时间（当日厘秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsTime {
    pub raw: u32,
}

impl GpsTime {
    pub fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub fn centiseconds(&self) -> u32 {
        self.raw % 100
    }

    fn total_seconds(&self) -> u32 {
        self.raw / 100
    }

    pub fn utc_hours(&self) -> u32 {
        self.total_seconds() / 3600
    }

    pub fn minutes(&self) -> u32 {
        (self.total_seconds() % 3600) / 60
    }

    pub fn seconds(&self) -> u32 {
        self.total_seconds() % 60
    }

    /// 本地时区（UTC+10）小时
    pub fn local_hours(&self) -> u32 {
        (self.utc_hours() + LOCAL_UTC_OFFSET_HOURS) % 24
    }

    /// `HH:MM:SS.cc`（本地时区）
    pub fn local_string(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}.{:02}",
            self.local_hours(),
            self.minutes(),
            self.seconds(),
            self.centiseconds()
        )
    }
}

/// 0.01 精度定点值的 `整数.余数` 显示（与设备手册一致，余数不补零）
fn hundredths(raw: i64) -> String {
    let sign = if raw < 0 { "- " } else { "+ " };
    format!("{}{}.{}", sign, (raw / 100).abs(), (raw % 100).abs())
}

// ============================================================================
// 报文记录
// ============================================================================

/// 0x301：卫星数 / 时间 / 纬度
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionXRecord {
    pub satellites: u8,
    pub time: GpsTime,
    pub latitude: GeoCoordinate,
}

/// 0x302：经度 / 速度 / 航向
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionYRecord {
    pub longitude: GeoCoordinate,
    pub speed_raw: u16,
    pub heading_raw: u16,
}

impl PositionYRecord {
    pub fn speed_knots(&self) -> f64 {
        self.speed_raw as f64 * 0.01
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_knots() * KNOTS_TO_KMH
    }

    pub fn heading_degrees(&self) -> f64 {
        self.heading_raw as f64 * 0.01
    }

    /// 网络推送行：km/h，三位小数，换行结尾
    pub fn network_line(&self) -> String {
        format!("{:.3}\n", self.speed_kmh())
    }
}

/// 0x303：海拔 / 垂直速度 / 状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AltitudeRecord {
    pub altitude_raw: i32,
    pub vertical_velocity_raw: i16,
    pub status: u8,
}

impl AltitudeRecord {
    pub fn altitude_m(&self) -> f64 {
        self.altitude_raw as f64 * 0.01
    }

    pub fn vertical_velocity(&self) -> f64 {
        self.vertical_velocity_raw as f64 * 0.01
    }

    /// 状态字节高 4 位的二进制文本（如 `1010`）
    pub fn status_bits(&self) -> String {
        format!("{:04b}", self.status >> 4)
    }
}

/// 0x304：触发距离 / 纵向与横向加速度
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccelerationRecord {
    pub trigger_distance_raw: u32,
    pub longitudinal_raw: i16,
    pub lateral_raw: i16,
}

impl AccelerationRecord {
    pub fn trigger_distance(&self) -> f64 {
        self.trigger_distance_raw as f64 * DISTANCE_LSB
    }

    pub fn longitudinal(&self) -> f64 {
        self.longitudinal_raw as f64 * 0.01
    }

    pub fn lateral(&self) -> f64 {
        self.lateral_raw as f64 * 0.01
    }
}

/// 0x305：里程 / 触发时间 / 触发速度
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceRecord {
    pub distance_raw: u32,
    pub trigger_time_raw: u16,
    pub trigger_speed_raw: u16,
}

impl DistanceRecord {
    pub fn distance(&self) -> f64 {
        self.distance_raw as f64 * DISTANCE_LSB
    }

    pub fn trigger_time(&self) -> f64 {
        self.trigger_time_raw as f64 * 0.01
    }

    pub fn trigger_speed_knots(&self) -> f64 {
        self.trigger_speed_raw as f64 * 0.01
    }

    pub fn trigger_speed_kmh(&self) -> f64 {
        self.trigger_speed_knots() * KNOTS_TO_KMH
    }
}

/// 单条 GPS 报文的解码结果
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpsRecord {
    PositionX(PositionXRecord),
    PositionY(PositionYRecord),
    Altitude(AltitudeRecord),
    Acceleration(AccelerationRecord),
    Distance(DistanceRecord),
}

impl GpsRecord {
    /// 报文 ID
    pub fn id(&self) -> u32 {
        match self {
            GpsRecord::PositionX(_) => ID_GPS_POSITION_X,
            GpsRecord::PositionY(_) => ID_GPS_POSITION_Y,
            GpsRecord::Altitude(_) => ID_GPS_ALTITUDE,
            GpsRecord::Acceleration(_) => ID_GPS_ACCELERATION,
            GpsRecord::Distance(_) => ID_GPS_DISTANCE,
        }
    }
}

impl fmt::Display for GpsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsRecord::PositionX(r) => write!(
                f,
                "Sats.: {}  UTC+10: {}  X: {}",
                r.satellites,
                r.time.local_string(),
                r.latitude
            ),
            GpsRecord::PositionY(r) => write!(
                f,
                "Y: {}  Speed Knots: {:.2} ({:.3})  Heading: {:.2}",
                r.longitude,
                r.speed_knots(),
                r.speed_kmh(),
                r.heading_degrees()
            ),
            GpsRecord::Altitude(r) => write!(
                f,
                "WGS.84: {}  Vertical Speed: {}  DGPS: {}",
                hundredths(r.altitude_raw as i64),
                hundredths(r.vertical_velocity_raw as i64),
                r.status_bits()
            ),
            GpsRecord::Acceleration(r) => write!(
                f,
                "Trig_Dist: {:.9}  Long_Acc: {}  Lat_Acc: {}",
                r.trigger_distance(),
                hundredths(r.longitudinal_raw as i64),
                hundredths(r.lateral_raw as i64)
            ),
            GpsRecord::Distance(r) => write!(
                f,
                "Distance: {:.9}  Trig_Time: {:.2}  Trig_Speed: {:.2} ({:.3})",
                r.distance(),
                r.trigger_time(),
                r.trigger_speed_knots(),
                r.trigger_speed_kmh()
            ),
        }
    }
}

/// 解码 GPS 报文
///
/// `data_hex` 为十六进制摘要（如 `" 0A 00 12 34 ..."`）。
/// 数据不足 8 字节或含非法字符时，缺失字段置零，返回 `Decoded::Partial`。
///
/// # 错误
/// - `DecodeError::UnknownId`: ID 不在 0x301..=0x305
pub fn decode_gps(id: u32, data_hex: &str) -> Result<Decoded<GpsRecord>, DecodeError> {
    let digest = HexDigest::parse(data_hex);
    decode_gps_digest(id, &digest)
}

/// 解码已解析的摘要
pub fn decode_gps_digest(id: u32, d: &HexDigest) -> Result<Decoded<GpsRecord>, DecodeError> {
    let record = match id {
        ID_GPS_POSITION_X => GpsRecord::PositionX(PositionXRecord {
            satellites: d.u8_at(0).unwrap_or_default(),
            time: GpsTime::new(d.u24_be(1).unwrap_or_default()),
            latitude: GeoCoordinate::new(d.i32_be(4).unwrap_or_default()),
        }),
        ID_GPS_POSITION_Y => GpsRecord::PositionY(PositionYRecord {
            longitude: GeoCoordinate::new(d.i32_be(0).unwrap_or_default()),
            speed_raw: d.u16_be(4).unwrap_or_default(),
            heading_raw: d.u16_be(6).unwrap_or_default(),
        }),
        ID_GPS_ALTITUDE => GpsRecord::Altitude(AltitudeRecord {
            altitude_raw: d.i24_be(0).unwrap_or_default(),
            vertical_velocity_raw: d.i16_be(3).unwrap_or_default(),
            status: d.u8_at(7).unwrap_or_default(),
        }),
        ID_GPS_ACCELERATION => GpsRecord::Acceleration(AccelerationRecord {
            trigger_distance_raw: d.u32_be(0).unwrap_or_default(),
            longitudinal_raw: d.i16_be(4).unwrap_or_default(),
            lateral_raw: d.i16_be(6).unwrap_or_default(),
        }),
        ID_GPS_DISTANCE => GpsRecord::Distance(DistanceRecord {
            distance_raw: d.u32_be(0).unwrap_or_default(),
            trigger_time_raw: d.u16_be(4).unwrap_or_default(),
            trigger_speed_raw: d.u16_be(6).unwrap_or_default(),
        }),
        other => return Err(DecodeError::UnknownId(other)),
    };

    if d.covers(GPS_PAYLOAD_LEN) {
        Ok(Decoded::Complete(record))
    } else {
        Ok(Decoded::Partial(record))
    }
}

// ============================================================================
// 里程偏移修正
// ============================================================================

/// 里程读数（修正后）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceReading {
    /// 修正后的累计里程
    pub cumulative: f64,
    /// 相对上一条报文的增量
    pub delta: f64,
}

/// 滚动里程计数器的回绕补偿
///
/// 设备里程计数器达到上限或复位后会从接近 0 重新计数。
/// 一旦修正后的读数小于上一次的累计值，就把偏移推进到
/// `上次累计值 + max(新读数, 1 LSB)`，保证累计里程单调不减。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceTracker {
    previous: Option<f64>,
    offset: f64,
}

impl Default for DistanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceTracker {
    pub fn new() -> Self {
        Self {
            previous: None,
            offset: 0.0,
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// 输入原始计数，返回修正后的读数
    pub fn update(&mut self, raw: u32) -> DistanceReading {
        let distance = raw as f64 * DISTANCE_LSB;

        if let Some(previous) = self.previous {
            if distance + self.offset < previous {
                self.offset = previous + distance.max(DISTANCE_LSB);
            }
        }

        let cumulative = distance + self.offset;
        let delta = cumulative - self.previous.unwrap_or(cumulative);
        self.previous = Some(cumulative);

        DistanceReading { cumulative, delta }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hex_of(bytes: &[u8]) -> String {
        crate::payload::spaced_hex(bytes)
    }

    #[test]
    fn test_decode_position_x() {
        // sats=9, time=0x000C35 (3125 cs = 31.25 s), lat=0x00BC614E (12345678)
        let hex = hex_of(&[0x09, 0x00, 0x0C, 0x35, 0x00, 0xBC, 0x61, 0x4E]);
        let decoded = decode_gps(0x301, &hex).unwrap();
        assert!(decoded.is_complete());
        let GpsRecord::PositionX(r) = decoded.into_inner() else {
            panic!("expected PositionX");
        };
        assert_eq!(r.satellites, 9);
        assert_eq!(r.time.raw, 3125);
        assert_eq!(r.time.local_string(), "10:00:31.25");
        // 12345678 → 123 分 45678 → 2 度 3 分
        assert_eq!(r.latitude.degrees(), 2);
        assert_eq!(r.latitude.minutes(), 3);
        assert_eq!(r.latitude.sub_minutes(), 45678);
        assert!((r.latitude.decimal_degrees() - (2.0 + 3.45678 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_gps_time_wraps_day() {
        // 15:30:00.07 UTC → 01:30:00.07 (UTC+10)
        let t = GpsTime::new((15 * 3600 + 30 * 60) * 100 + 7);
        assert_eq!(t.local_string(), "01:30:00.07");
    }

    #[test]
    fn test_negative_coordinate() {
        let c = GeoCoordinate::new(-12345678);
        assert!(c.is_negative());
        assert_eq!(c.degrees(), -2);
        assert!(c.decimal_degrees() < 0.0);
        assert!(c.to_string().starts_with("- 2d 3.45678m"));
    }

    #[test]
    fn test_decode_position_y_speed() {
        // speed 10000 (100 节), heading 9000 (90 度)
        let hex = hex_of(&[0, 0, 0, 0, 0x27, 0x10, 0x23, 0x28]);
        let GpsRecord::PositionY(r) = decode_gps(0x302, &hex).unwrap().into_inner() else {
            panic!("expected PositionY");
        };
        assert!((r.speed_knots() - 100.0).abs() < 1e-9);
        assert!((r.speed_kmh() - 185.2).abs() < 1e-9);
        assert!((r.heading_degrees() - 90.0).abs() < 1e-9);
        assert_eq!(r.network_line(), "185.200\n");
    }

    #[test]
    fn test_decode_altitude_signed() {
        // altitude = -1 (0xFFFFFF), vv = -150, status = 0b1010_0000
        let hex = hex_of(&[0xFF, 0xFF, 0xFF, 0xFF, 0x6A, 0, 0, 0xA0]);
        let GpsRecord::Altitude(r) = decode_gps(0x303, &hex).unwrap().into_inner() else {
            panic!("expected Altitude");
        };
        assert_eq!(r.altitude_raw, -1);
        assert_eq!(r.vertical_velocity_raw, -150);
        assert!((r.vertical_velocity() + 1.5).abs() < 1e-9);
        assert_eq!(r.status_bits(), "1010");
    }

    #[test]
    fn test_decode_acceleration() {
        let hex = hex_of(&[0, 0, 0x80, 0, 0xFF, 0x9C, 0, 0x64]);
        let GpsRecord::Acceleration(r) = decode_gps(0x304, &hex).unwrap().into_inner() else {
            panic!("expected Acceleration");
        };
        assert!((r.trigger_distance() - 0x8000 as f64 * DISTANCE_LSB).abs() < 1e-12);
        assert!((r.longitudinal() + 1.0).abs() < 1e-9);
        assert!((r.lateral() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_payload_defaults() {
        let decoded = decode_gps(0x305, " 00 01").unwrap();
        assert!(!decoded.is_complete());
        assert_eq!(
            decoded.into_inner(),
            GpsRecord::Distance(DistanceRecord::default())
        );
    }

    #[test]
    fn test_malformed_payload_defaults() {
        let decoded = decode_gps(0x302, "zz").unwrap();
        assert!(!decoded.is_complete());
        assert_eq!(
            decoded.into_inner(),
            GpsRecord::PositionY(PositionYRecord::default())
        );
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(
            decode_gps(0x306, "00").unwrap_err(),
            DecodeError::UnknownId(0x306)
        );
    }

    #[test]
    fn test_distance_tracker_first_reading() {
        let mut tracker = DistanceTracker::new();
        let r = tracker.update(1000);
        assert_eq!(r.delta, 0.0);
        assert!((r.cumulative - 1000.0 * DISTANCE_LSB).abs() < 1e-12);

        let r = tracker.update(3000);
        assert!((r.delta - 2000.0 * DISTANCE_LSB).abs() < 1e-12);
    }

    #[test]
    fn test_distance_tracker_wraparound() {
        let mut tracker = DistanceTracker::new();
        let before = tracker.update(u32::MAX - 10).cumulative;
        let after = tracker.update(5).cumulative;
        assert!(after >= before);
        assert!(tracker.offset() > 0.0);
        let later = tracker.update(50).cumulative;
        assert!(later >= after);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serde() {
        let record = decode_gps(ID_GPS_POSITION_Y, "FF 43 9E B2 01 F4 23 28").unwrap().into_inner();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with("{\"PositionY\""));
        let back: GpsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    proptest! {
        #[test]
        fn prop_distance_monotonic_across_wrap(
            start in 0u32..1_000_000,
            steps in proptest::collection::vec(1u32..50_000, 1..50),
            wrap_at in 0usize..50,
        ) {
            let mut tracker = DistanceTracker::new();
            let mut counter = start;
            let mut last = tracker.update(counter).cumulative;
            for (i, step) in steps.iter().enumerate() {
                counter = if i == wrap_at { *step } else { counter.wrapping_add(*step) };
                let reading = tracker.update(counter);
                prop_assert!(reading.cumulative >= last);
                last = reading.cumulative;
            }
        }
    }
}
