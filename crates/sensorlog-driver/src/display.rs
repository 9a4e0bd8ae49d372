//! 显示刷新
//!
//! 显示定时器每个周期调用一次 [`refresh_display`]：在一次临界区内取出
//! 新插入和 dirty 的表项、解码 GPS 面板与最新惯性帧，然后在锁外渲染。

use crate::aggregator::TrackedMessage;
use crate::store::SharedRecordStore;
use sensorlog_protocol::{
    AccelScale, DistanceReading, GpsRecord, HexDigest, InertialReading, decode_gps_digest,
    decode_inertial, is_gps_id,
};

/// 表格中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    /// 行号（插入顺序）
    pub position: usize,
    pub type_text: String,
    pub id_text: String,
    pub length: usize,
    pub count: u64,
    pub time_text: String,
    pub data_text: String,
}

impl From<&TrackedMessage> for DisplayRow {
    fn from(msg: &TrackedMessage) -> Self {
        Self {
            position: msg.list_position(),
            type_text: msg.type_string(),
            id_text: msg.id_string(),
            length: msg.frame().payload_len(),
            count: msg.count(),
            time_text: msg.time_string(),
            data_text: msg.data_string(),
        }
    }
}

/// 一次刷新的全部内容
#[derive(Debug, Clone, Default)]
pub struct DisplayUpdate {
    /// 需要重绘的行（按行号升序）
    pub rows: Vec<DisplayRow>,
    /// 表格当前行数，作为下次刷新的 `shown_rows`
    pub table_len: usize,
    /// 本次更新的 GPS 报文
    pub gps: Vec<GpsRecord>,
    /// 0x305 里程修正结果
    pub distance: Option<DistanceReading>,
    /// 最新有效惯性帧
    pub inertial: Option<InertialReading>,
    pub inertial_bad_ratio: f64,
}

/// 取出待显示内容
///
/// `shown_rows` 为显示端已有的行数，行号不小于它的表项视为新行。
pub fn refresh_display(store: &SharedRecordStore, shown_rows: usize) -> DisplayUpdate {
    let mut state = store.lock();

    let mut changed: Vec<TrackedMessage> = state
        .aggregator
        .entries()
        .iter()
        .skip(shown_rows)
        .cloned()
        .collect();
    for msg in state.aggregator.take_dirty() {
        match changed.iter_mut().find(|m| m.list_position() == msg.list_position()) {
            Some(slot) => *slot = msg,
            None => changed.push(msg),
        }
    }
    changed.sort_by_key(|m| m.list_position());

    let mut update = DisplayUpdate {
        table_len: state.aggregator.len(),
        inertial_bad_ratio: state.inertial_bad_ratio(),
        ..Default::default()
    };

    for msg in &changed {
        let frame = msg.frame();
        if !is_gps_id(frame.id) {
            continue;
        }
        let digest = HexDigest::from_bytes(frame.data_slice());
        if let Ok(decoded) = decode_gps_digest(frame.id, &digest) {
            let record = decoded.into_inner();
            if let GpsRecord::Distance(d) = record {
                update.distance = Some(state.distance.update(d.distance_raw));
            }
            update.gps.push(record);
        }
    }

    if !state.latest_inertial.is_empty() {
        let raw = decode_inertial(&state.latest_inertial).into_inner();
        update.inertial = Some(raw.scaled(AccelScale::Export));
    }
    drop(state);

    update.rows = changed.iter().map(DisplayRow::from).collect();
    update
}
