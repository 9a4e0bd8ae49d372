//! 采集会话集成测试
//!
//! 使用 mock 总线与 mock 串口验证完整的采集流程：
//! 1. 初始化 → 注入帧 → 聚合表与样本记录
//! 2. 惯性传感器握手、同步与坏帧统计
//! 3. 网络推送
//! 4. 释放与记录取出

use sensorlog_adapter::mock::MockBusAdapter;
use sensorlog_adapter::serial::mock::MockSerialDevice;
use sensorlog_adapter::{BusConfig, BusStatus, SerialDevice};
use sensorlog_driver::{
    AcquisitionSession, InertialConfig, MessageKey, NetworkConfig, NetworkOutcome, ReadingMode,
    SessionBuilder,
};
use sensorlog_protocol::{CanFrame, INERTIAL_FRAME_LEN, MessageType, SYNC_BYTE, checksum};
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::time::{Duration, Instant};

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn fast_inertial() -> InertialConfig {
    InertialConfig {
        read_timeout: Duration::from_millis(5),
        write_timeout: Duration::from_millis(5),
        command_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn inertial_frame(seq: u16, corrupt: bool) -> [u8; INERTIAL_FRAME_LEN] {
    let mut f = [0u8; INERTIAL_FRAME_LEN];
    f[0] = SYNC_BYTE;
    f[11..13].copy_from_slice(&0x2000i16.to_be_bytes());
    f[19..21].copy_from_slice(&seq.to_be_bytes());
    f[21] = checksum(&f);
    if corrupt {
        f[21] = f[21].wrapping_add(1);
    }
    f
}

fn start_event_session() -> (AcquisitionSession, sensorlog_adapter::mock::MockBusHandle) {
    let adapter = MockBusAdapter::new();
    let handle = adapter.handle();
    let session = SessionBuilder::new(BusConfig::new("mock0", 500_000))
        .reading_mode(ReadingMode::Event)
        .start(Box::new(adapter), None)
        .expect("session should start");
    (session, handle)
}

#[test]
fn test_three_frames_one_entry() {
    let (session, handle) = start_event_session();

    for data in [[0x01u8; 8], [0x02; 8], [0x03; 8]] {
        handle.push_frame(CanFrame::new_standard(0x301, &data));
    }
    assert!(wait_for(|| session.metrics().bus_frames == 3));

    {
        let state = session.store().lock();
        assert_eq!(state.aggregator.len(), 1);
        let key = MessageKey {
            id: 0x301,
            msg_type: MessageType::STANDARD,
        };
        let entry = state.aggregator.get(&key).expect("entry for 0x301");
        assert_eq!(entry.count(), 3);
        assert_eq!(entry.data_string(), " 03 03 03 03 03 03 03 03");
    }

    let outcome = session.release();
    assert!(outcome.is_clean());
    let samples = &outcome.records.gps_samples;
    assert_eq!(samples.len(), 3);
    assert!(samples.iter().all(|s| s.id() == Some(0x301)));
    assert_eq!(samples[0].data_text, " 01 01 01 01 01 01 01 01");
    assert_eq!(samples[2].data_text, " 03 03 03 03 03 03 03 03");
    assert!(samples.iter().all(|s| s.cpu_millis.is_some()));
}

#[test]
fn test_timer_mode_drains_periodically() {
    let adapter = MockBusAdapter::new();
    let handle = adapter.handle();
    let session = SessionBuilder::new(BusConfig::new("mock0", 500_000))
        .reading_mode(ReadingMode::Timer)
        .bus_loop_config(sensorlog_driver::BusLoopConfig {
            wait_timeout_ms: 1,
            timer_interval_ms: 5,
        })
        .start(Box::new(adapter), None)
        .unwrap();

    handle.push_frame(CanFrame::new_extended(0x18FF_0001, &[1, 2, 3]));
    assert!(wait_for(|| session.metrics().bus_frames == 1));
    assert_eq!(session.store().lock().aggregator.entries()[0].id_string(), "18FF0001h");
    drop(session);
    assert!(!handle.is_initialized());
}

#[test]
fn test_illegal_operation_keeps_session_alive() {
    let (session, handle) = start_event_session();

    handle.push_frame(CanFrame::new_standard(0x302, &[]));
    handle.push_error(BusStatus::IllegalOperation);
    handle.push_frame(CanFrame::new_standard(0x303, &[]));

    assert!(wait_for(|| session.metrics().bus_frames == 2));
    assert!(session.metrics().bus_read_errors >= 1);
    assert_eq!(session.release().records.gps_samples.len(), 2);
}

#[test]
fn test_inertial_session_counts_bad_frames() {
    let adapter = MockBusAdapter::new();
    let device = MockSerialDevice::new();
    let serial = device.handle();
    serial.respond(b"R", &[0x48]);

    // 3 个丢弃窗口 + 同步窗口共 180 字节，帧从 0 开始对齐，第 9 帧起进入稳态
    let mut stream = Vec::new();
    for seq in 0..20u16 {
        stream.extend_from_slice(&inertial_frame(seq, seq == 12));
    }
    serial.respond(b"C", &stream);

    let device: Box<dyn SerialDevice> = Box::new(device);
    let session = SessionBuilder::new(BusConfig::new("mock0", 500_000))
        .inertial_config(fast_inertial())
        .start(Box::new(adapter), Some(device))
        .unwrap();
    assert!(session.has_inertial());

    assert!(wait_for(|| session.metrics().inertial_frames_total == 11));
    let snapshot = session.metrics();
    assert_eq!(snapshot.inertial_frames_valid, 10);
    assert!((snapshot.inertial_bad_ratio() - 1.0 / 11.0).abs() < 1e-9);

    let reading = session.refresh_display(0).inertial.expect("latest inertial");
    assert!((reading.acc_x - 1.5).abs() < 1e-9);

    let outcome = session.release();
    assert!(outcome.is_clean());
    assert_eq!(outcome.records.inertial_samples.len(), 10);
    assert_eq!(outcome.records.inertial_total, 11);
    assert!(serial.is_closed());
}

#[test]
fn test_realign_request_is_consumed() {
    let adapter = MockBusAdapter::new();
    let device = MockSerialDevice::new();
    let serial = device.handle();
    serial.respond(b"R", &[0x48]);

    let mut stream = Vec::new();
    for seq in 0..12u16 {
        stream.extend_from_slice(&inertial_frame(seq, false));
    }
    serial.respond(b"C", &stream);

    let device: Box<dyn SerialDevice> = Box::new(device);
    let session = SessionBuilder::new(BusConfig::new("mock0", 500_000))
        .inertial_config(fast_inertial())
        .start(Box::new(adapter), Some(device))
        .unwrap();
    assert!(wait_for(|| session.metrics().inertial_frames_total >= 1));

    session.request_realign();
    assert!(session.realign_pending());

    // 补充数据：2 个丢弃窗口、同步窗口与 1 字节偏移
    let mut more = vec![0x00u8];
    for seq in 100..110u16 {
        more.extend_from_slice(&inertial_frame(seq, false));
    }
    serial.feed(&more);

    assert!(wait_for(|| session.metrics().inertial_realigns == 1));
    assert!(!session.realign_pending());
    assert!(session.release().is_clean());
}

#[test]
fn test_network_push_through_session() {
    let (mut session, handle) = start_event_session();
    session
        .start_network(NetworkConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            accept_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
    let addr = session.network_addr().expect("exporter bound");

    let client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut reader = BufReader::new(client);
    assert!(wait_for(|| session.metrics().net_connections == 1));
    assert!(session.network_active());

    // 速度 0x0064 = 1.00 节
    handle.push_frame(CanFrame::new_standard(0x302, &[0, 0, 0, 0, 0x00, 0x64, 0, 0]));

    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "1.852\n");

    assert_eq!(session.stop_network().unwrap(), NetworkOutcome::Stopped);
    assert!(session.release().is_clean());
}

#[test]
fn test_release_clears_table_and_shutter_log() {
    let (session, handle) = start_event_session();
    let store = session.store().clone();
    handle.push_frame(CanFrame::new_standard(0x304, &[9]));
    assert!(wait_for(|| session.metrics().bus_frames == 1));

    let outcome = session.release();
    assert_eq!(outcome.records.gps_samples.len(), 1);
    assert!(outcome.records.shutter_events.is_empty());
    assert!(store.lock().aggregator.is_empty());
    assert!(store.lock().gps_samples.is_empty());
}
