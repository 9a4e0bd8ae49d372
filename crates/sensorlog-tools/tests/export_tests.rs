//! 会话导出集成测试
//!
//! 测试内容：
//! 1. GPS.txt 写出后逐行解析，恢复原始十六进制与解码字段
//! 2. Acc.txt / Shutter.txt 行数与内容
//! 3. 目录创建失败时的平铺命名

use proptest::prelude::*;
use sensorlog_driver::{GpsSample, InertialSample, SessionRecords, ShutterEvent, ShutterLabel};
use sensorlog_protocol::{
    GpsRecord, INERTIAL_FRAME_LEN, SYNC_BYTE, checksum, decode_gps, frame_hex, spaced_hex,
};
use sensorlog_tools::{
    GPS_HEADER, GpsRow, SessionLayout, parse_acc_row, parse_gps_row, parse_shutter_row,
    write_gps_table, write_session,
};
use std::fs;
use tempfile::TempDir;

fn gps_sample(id: u32, bytes: [u8; 8], cpu: i64) -> GpsSample {
    GpsSample {
        id_text: format!("{:X}h", id),
        data_text: format!(" {}", spaced_hex(&bytes)),
        cpu_millis: Some(cpu),
    }
}

fn inertial_sample(seq: u16, cpu: i64) -> InertialSample {
    let mut f = [0u8; INERTIAL_FRAME_LEN];
    f[0] = SYNC_BYTE;
    f[13..15].copy_from_slice(&(-8192i16).to_be_bytes());
    f[19..21].copy_from_slice(&seq.to_be_bytes());
    f[21] = checksum(&f);
    InertialSample {
        frame_text: frame_hex(&f),
        cpu_millis: cpu,
    }
}

/// 解码字段应与行中对应的携带列一致
fn assert_row_matches(row: &GpsRow, record: &GpsRecord) {
    match record {
        GpsRecord::PositionX(r) => {
            assert_eq!(row.sats, Some(r.satellites));
            assert_eq!(row.time, Some(r.time.raw));
            assert_eq!(row.x, Some(r.latitude.raw));
        },
        GpsRecord::PositionY(r) => {
            assert_eq!(row.y, Some(r.longitude.raw));
            assert_eq!(row.speed, Some(r.speed_raw));
            assert_eq!(row.heading, Some(r.heading_raw));
        },
        GpsRecord::Altitude(r) => {
            assert_eq!(row.wgs84, Some(r.altitude_raw));
            assert_eq!(row.vertical_v, Some(r.vertical_velocity_raw));
            assert_eq!(row.status.as_deref(), Some(r.status_bits().as_str()));
        },
        GpsRecord::Acceleration(r) => {
            assert_eq!(row.trig_dist, Some(r.trigger_distance_raw));
            assert_eq!(row.long_acc, Some(r.longitudinal_raw));
            assert_eq!(row.lat_acc, Some(r.lateral_raw));
        },
        GpsRecord::Distance(r) => {
            assert_eq!(row.distance, Some(r.distance_raw));
            assert_eq!(row.trig_time, Some(r.trigger_time_raw));
            assert_eq!(row.trig_v, Some(r.trigger_speed_raw));
        },
    }
}

fn sample_records() -> SessionRecords {
    SessionRecords {
        gps_samples: vec![
            gps_sample(0x301, [9, 0x00, 0x0C, 0x35, 0x00, 0xBC, 0x61, 0x4E], 1000),
            gps_sample(0x302, [0xFF, 0x43, 0x9E, 0xB2, 0x01, 0xF4, 0x23, 0x28], 1001),
            gps_sample(0x303, [0x00, 0x10, 0x00, 0xFF, 0x38, 0, 0, 0x50], 1002),
            gps_sample(0x304, [0x00, 0x01, 0x00, 0x00, 0x00, 0x0A, 0xFF, 0xF6], 1003),
            gps_sample(0x305, [0x00, 0x02, 0x00, 0x00, 0x01, 0x2C, 0x00, 0x64], 1004),
            GpsSample {
                id_text: "120h".into(),
                data_text: " 01 02".into(),
                cpu_millis: Some(1005),
            },
            gps_sample(0x301, [9, 0x00, 0x0C, 0x00, 0x00, 0xBC, 0x61, 0x4F], 1006),
        ],
        inertial_samples: vec![inertial_sample(1, 2000), inertial_sample(2, 2010)],
        shutter_events: vec![
            ShutterEvent {
                millis: 3000,
                label: ShutterLabel::Start,
            },
            ShutterEvent {
                millis: 3500,
                label: ShutterLabel::Off,
            },
            ShutterEvent {
                millis: 4000,
                label: ShutterLabel::LaneChange,
            },
        ],
        inertial_total: 3,
        inertial_valid: 2,
    }
}

#[test]
fn test_gps_file_round_trip() {
    let root = TempDir::new().unwrap();
    let records = sample_records();
    let summary = write_session(&records, &SessionLayout::new(root.path(), "s01", "t01")).unwrap();
    assert_eq!(summary.gps_rows, 6);
    assert_eq!(summary.gps_skipped, 1);

    let text = fs::read_to_string(root.path().join("s01/t01/GPS.txt")).unwrap();
    assert!(text.starts_with(GPS_HEADER));

    let rows: Vec<GpsRow> = text.lines().skip(1).map(|l| parse_gps_row(l).unwrap()).collect();
    let gps: Vec<&GpsSample> = records
        .gps_samples
        .iter()
        .filter(|s| s.id() != Some(0x120))
        .collect();
    assert_eq!(rows.len(), gps.len());

    for (row, sample) in rows.iter().zip(&gps) {
        let id = sample.id().unwrap();
        let record = decode_gps(id, &sample.data_text).unwrap().into_inner();

        assert_eq!(row.id, id);
        assert_eq!(row.raw, sample.data_text.replace(' ', ""));
        assert_eq!(row.cpu_millis, sample.cpu_millis);
        assert_eq!(row.decode().unwrap(), record);
        assert_row_matches(row, &record);
    }

    // 最后一行：0x301 时间 0x000C00 早于起点 0x000C35
    assert!(rows[5].warning);
    assert!(rows[..5].iter().all(|r| !r.warning));
    // 携带列保留了前面报文的值
    assert_eq!(rows[5].distance, Some(0x0002_0000));
}

#[test]
fn test_acc_and_shutter_files() {
    let root = TempDir::new().unwrap();
    let records = sample_records();
    let summary = write_session(&records, &SessionLayout::new(root.path(), "s03", "t02")).unwrap();
    assert_eq!(summary.acc_rows, 2);
    assert_eq!(summary.shutter_rows, 3);

    let acc = fs::read_to_string(root.path().join("s03/t02/Acc.txt")).unwrap();
    let rows: Vec<_> = acc.lines().skip(1).map(|l| parse_acc_row(l).unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].raw.acc_y, -8192);
    assert_eq!(rows[1].raw.time, 2);
    assert_eq!(rows[1].cpu_millis, 2010);
    // 会话坏帧比例 1/3
    assert!(acc.lines().nth(1).unwrap().contains("\t0.333333\t"));
    assert!((rows[0].bad_ratio - 0.333333).abs() < 1e-9);
    assert!((rows[0].reading().acc_y + 1.5).abs() < 1e-9);

    let shutter = fs::read_to_string(root.path().join("s03/t02/Shutter.txt")).unwrap();
    assert_eq!(shutter, "3000\tStart\n3500\tOFF\n4000\tLC\n");
    let events: Vec<_> = shutter.lines().map(|l| parse_shutter_row(l).unwrap()).collect();
    assert_eq!(events, records.shutter_events);
}

#[test]
fn test_flat_fallback_files() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("s01")).unwrap();
    fs::write(root.path().join("s01/t01"), b"not a directory").unwrap();

    let summary = write_session(
        &SessionRecords::default(),
        &SessionLayout::new(root.path(), "s01", "t01"),
    )
    .unwrap();
    assert!(summary.output.is_flat());
    for name in ["s01_t01_GPS.txt", "s01_t01_Acc.txt", "s01_t01_Shutter.txt"] {
        assert!(root.path().join(name).is_file(), "{} missing", name);
    }
}

#[test]
fn test_overwrites_existing_session() {
    let root = TempDir::new().unwrap();
    let layout = SessionLayout::new(root.path(), "s01", "t01");
    write_session(&sample_records(), &layout).unwrap();
    assert!(layout.would_overwrite());

    write_session(&SessionRecords::default(), &layout).unwrap();
    let text = fs::read_to_string(root.path().join("s01/t01/GPS.txt")).unwrap();
    assert_eq!(text, GPS_HEADER);
}

proptest! {
    #[test]
    fn prop_gps_rows_reparse(
        frames in prop::collection::vec((0x301u32..=0x305, prop::array::uniform8(any::<u8>())), 1..40)
    ) {
        let samples: Vec<GpsSample> = frames
            .iter()
            .enumerate()
            .map(|(i, (id, bytes))| gps_sample(*id, *bytes, i as i64))
            .collect();

        let mut out = Vec::new();
        let (rows, skipped) = write_gps_table(&mut out, &samples).unwrap();
        prop_assert_eq!(rows, samples.len());
        prop_assert_eq!(skipped, 0);

        let text = String::from_utf8(out).unwrap();
        for (line, sample) in text.lines().skip(1).zip(&samples) {
            let row = parse_gps_row(line).unwrap();
            let record = decode_gps(row.id, &sample.data_text).unwrap().into_inner();
            prop_assert_eq!(row.decode().unwrap(), record);
            assert_row_matches(&row, &record);
        }
    }
}
