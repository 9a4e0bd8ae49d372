//! 报文聚合表
//!
//! 每个 (ID, 报文类型) 对应一条 [`TrackedMessage`]：
//!
//! - 首次出现：插入，`count = 1`，`dirty = false`（插入本身已反映到显示）
//! - 再次出现：时间戳前移（旧 ← 当前，当前 ← 新），`count += 1`，`dirty = true`
//! - 显示端渲染后清除 `dirty`
//! - 只能整体清空，不单独删除条目

use sensorlog_protocol::{CanFrame, MessageType};
use std::collections::HashMap;

/// 聚合键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub id: u32,
    pub msg_type: MessageType,
}

impl MessageKey {
    pub fn of(frame: &CanFrame) -> Self {
        Self {
            id: frame.id,
            msg_type: frame.msg_type,
        }
    }
}

/// 单个报文标识的最新状态
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMessage {
    frame: CanFrame,
    previous_timestamp_us: u64,
    count: u64,
    show_period: bool,
    dirty: bool,
    list_position: usize,
}

impl TrackedMessage {
    fn new(frame: CanFrame, list_position: usize, show_period: bool) -> Self {
        Self {
            previous_timestamp_us: frame.timestamp_us,
            frame,
            count: 1,
            show_period,
            dirty: false,
            list_position,
        }
    }

    fn update(&mut self, frame: CanFrame) {
        self.previous_timestamp_us = self.frame.timestamp_us;
        self.frame = frame;
        self.count += 1;
        self.dirty = true;
    }

    pub fn frame(&self) -> &CanFrame {
        &self.frame
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::of(&self.frame)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn timestamp_us(&self) -> u64 {
        self.frame.timestamp_us
    }

    pub fn previous_timestamp_us(&self) -> u64 {
        self.previous_timestamp_us
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn show_period(&self) -> bool {
        self.show_period
    }

    /// 显示列表中的行号（插入顺序）
    pub fn list_position(&self) -> usize {
        self.list_position
    }

    /// 切换时间显示模式，模式变化时标记为 dirty
    pub fn set_show_period(&mut self, show_period: bool) {
        if self.show_period != show_period {
            self.show_period = show_period;
            self.dirty = true;
        }
    }

    /// 时间文本（毫秒，一位小数）
    ///
    /// 周期模式下为两次到达的间隔，否则为到达时间戳本身。
    pub fn time_string(&self) -> String {
        let mut time = self.frame.timestamp_us as f64 / 1000.0;
        if self.show_period {
            time -= self.previous_timestamp_us as f64 / 1000.0;
        }
        format!("{:.1}", time)
    }

    pub fn type_string(&self) -> String {
        self.frame.type_string()
    }

    pub fn id_string(&self) -> String {
        self.frame.id_string()
    }

    pub fn data_string(&self) -> String {
        self.frame.data_string()
    }
}

/// 观测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// 新条目，附带行号
    Inserted(usize),
    /// 已有条目被更新，附带行号
    Updated(usize),
}

impl Observation {
    pub fn position(self) -> usize {
        match self {
            Observation::Inserted(p) | Observation::Updated(p) => p,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Observation::Inserted(_))
    }
}

/// 聚合表
#[derive(Debug, Clone)]
pub struct MessageAggregator {
    entries: Vec<TrackedMessage>,
    index: HashMap<MessageKey, usize>,
    show_period: bool,
}

impl Default for MessageAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            show_period: true,
        }
    }

    /// 记录一帧
    pub fn observe(&mut self, frame: CanFrame) -> Observation {
        let key = MessageKey::of(&frame);
        if let Some(&position) = self.index.get(&key) {
            self.entries[position].update(frame);
            return Observation::Updated(position);
        }

        let position = self.entries.len();
        self.entries
            .push(TrackedMessage::new(frame, position, self.show_period));
        self.index.insert(key, position);
        Observation::Inserted(position)
    }

    pub fn get(&self, key: &MessageKey) -> Option<&TrackedMessage> {
        self.index.get(key).map(|&p| &self.entries[p])
    }

    pub fn entries(&self) -> &[TrackedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全局时间显示模式
    pub fn show_period(&self) -> bool {
        self.show_period
    }

    /// 切换全局时间显示模式，对所有已有条目生效
    pub fn set_show_period(&mut self, show_period: bool) {
        self.show_period = show_period;
        for entry in &mut self.entries {
            entry.set_show_period(show_period);
        }
    }

    /// 取出所有 dirty 条目的副本并清除其 dirty 标记
    pub fn take_dirty(&mut self) -> Vec<TrackedMessage> {
        self.entries
            .iter_mut()
            .filter(|e| e.dirty)
            .map(|e| {
                e.dirty = false;
                e.clone()
            })
            .collect()
    }

    /// 整体清空
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(id: u16, data: &[u8], ts: u64) -> CanFrame {
        CanFrame::new_standard(id, data).with_timestamp(ts)
    }

    #[test]
    fn test_first_observation() {
        let mut agg = MessageAggregator::new();
        assert_eq!(agg.observe(frame(0x301, &[1], 1000)), Observation::Inserted(0));

        let entry = &agg.entries()[0];
        assert_eq!(entry.count(), 1);
        assert!(!entry.is_dirty());
        assert_eq!(entry.previous_timestamp_us(), 1000);
        assert_eq!(entry.time_string(), "0.0");
    }

    #[test]
    fn test_repeat_observation_same_entry() {
        let mut agg = MessageAggregator::new();
        agg.observe(frame(0x301, &[1], 1000));
        assert_eq!(agg.observe(frame(0x301, &[1], 11_500)), Observation::Updated(0));

        assert_eq!(agg.len(), 1);
        let entry = &agg.entries()[0];
        assert_eq!(entry.count(), 2);
        assert!(entry.is_dirty());
        assert_eq!(entry.previous_timestamp_us(), 1000);
        assert_eq!(entry.time_string(), "10.5");
    }

    #[test]
    fn test_key_includes_type() {
        let mut agg = MessageAggregator::new();
        agg.observe(CanFrame::new_standard(0x301, &[]));
        agg.observe(CanFrame::new_extended(0x301, &[]));
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.entries()[1].list_position(), 1);
    }

    #[test]
    fn test_timestamp_mode_relabels_existing() {
        let mut agg = MessageAggregator::new();
        agg.observe(frame(0x302, &[], 2_000));
        agg.observe(frame(0x302, &[], 5_000));
        agg.take_dirty();

        agg.set_show_period(false);
        let dirty = agg.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].time_string(), "5.0");

        // 模式未变化时不重新标记
        agg.set_show_period(false);
        assert!(agg.take_dirty().is_empty());

        // 新条目继承全局模式
        agg.observe(frame(0x303, &[], 7_000));
        assert!(!agg.entries()[1].show_period());
    }

    #[test]
    fn test_take_dirty_clears_flags() {
        let mut agg = MessageAggregator::new();
        agg.observe(frame(0x301, &[1], 0));
        agg.observe(frame(0x301, &[2], 1));
        agg.observe(frame(0x302, &[3], 2));

        let dirty = agg.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].data_string(), " 02");
        assert!(agg.take_dirty().is_empty());
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_key(ids in proptest::collection::vec(0x300u16..0x308, 1..200)) {
            let mut agg = MessageAggregator::new();
            for (i, id) in ids.iter().enumerate() {
                agg.observe(frame(*id, &[i as u8], i as u64));
            }

            let mut distinct = ids.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(agg.len(), distinct.len());

            let total: u64 = agg.entries().iter().map(|e| e.count()).sum();
            prop_assert_eq!(total, ids.len() as u64);
        }
    }

    #[test]
    fn test_clear() {
        let mut agg = MessageAggregator::new();
        agg.observe(frame(0x301, &[], 0));
        agg.clear();
        assert!(agg.is_empty());
        assert_eq!(agg.observe(frame(0x301, &[], 0)), Observation::Inserted(0));
    }
}
