//! 快门眼镜与计时触发
//!
//! 实验开始后由显示定时器周期调用 [`ShutterController::tick`]：
//!
//! - 到达 `shutter_time - offset`（offset > 0 时）：关闭眼镜，记录 `OFF`
//! - 到达 `shutter_time`：记录变道提示 `LC`，该计时结束
//! - 到达 `lane_change_time`：记录 `Alarm`，该计时结束
//!
//! 手动开关眼镜分别记录 `OFF` / `ON`。开关通过串口 RTS 线实现，
//! `set(true)` 为遮挡。

use crate::clock::cpu_millis;
use crate::log::EventLog;
use crate::store::{SharedRecordStore, ShutterLabel};
use sensorlog_adapter::{SerialError, ShutterSwitch};
use std::time::{Duration, Instant};

/// 计时触发动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterAction {
    /// 提前关闭眼镜
    CloseGlass,
    /// 变道提示
    LaneChange,
    /// 提醒
    Alarm,
}

/// 计时触发状态（秒）
///
/// 各计时值为 0 表示未启用或已触发。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShutterTimeline {
    shutter_time: f64,
    lane_change_time: f64,
    offset: f64,
}

impl ShutterTimeline {
    /// `offset` 为提前关闭眼镜的秒数，负值按 0 处理
    pub fn new(shutter_time: f64, lane_change_time: f64, offset: f64) -> Self {
        Self {
            shutter_time,
            lane_change_time,
            offset: offset.max(0.0),
        }
    }

    /// 是否仍有未触发的计时
    pub fn is_pending(&self) -> bool {
        self.shutter_time > 0.0 || self.lane_change_time > 0.0
    }

    /// 距变道提示的剩余秒数
    pub fn shutter_remaining(&self, elapsed: f64) -> f64 {
        if self.shutter_time > 0.0 {
            self.shutter_time - elapsed
        } else {
            0.0
        }
    }

    /// 距提醒的剩余秒数
    pub fn lane_change_remaining(&self, elapsed: f64) -> f64 {
        if self.lane_change_time > 0.0 {
            self.lane_change_time - elapsed
        } else {
            0.0
        }
    }

    /// 推进到 `elapsed` 秒，返回应执行的动作
    ///
    /// `last_label` 为事件记录中的最后一个标签，已是 `OFF` 时不再重复关闭。
    pub fn advance(&mut self, elapsed: f64, last_label: Option<ShutterLabel>) -> Vec<ShutterAction> {
        let mut actions = Vec::new();

        if self.shutter_time > 0.0 {
            if self.offset > 0.0
                && elapsed + self.offset >= self.shutter_time
                && last_label != Some(ShutterLabel::Off)
            {
                actions.push(ShutterAction::CloseGlass);
            }
            if elapsed >= self.shutter_time {
                actions.push(ShutterAction::LaneChange);
                self.shutter_time = 0.0;
            }
        }

        if self.lane_change_time > 0.0 && elapsed >= self.lane_change_time {
            actions.push(ShutterAction::Alarm);
            self.lane_change_time = 0.0;
        }

        actions
    }
}

/// 快门控制器
pub struct ShutterController {
    switch: Option<Box<dyn ShutterSwitch>>,
    store: SharedRecordStore,
    log: EventLog,
    timeline: ShutterTimeline,
    begin: Option<Instant>,
}

impl ShutterController {
    /// `switch` 为 `None` 时只记录事件
    pub fn new(
        switch: Option<Box<dyn ShutterSwitch>>,
        store: SharedRecordStore,
        log: EventLog,
    ) -> Self {
        Self {
            switch,
            store,
            log,
            timeline: ShutterTimeline::default(),
            begin: None,
        }
    }

    /// 开始计时，记录 `Start`
    pub fn start(&mut self, timeline: ShutterTimeline) {
        self.timeline = timeline;
        self.begin = Some(Instant::now());
        self.record(ShutterLabel::Start);
    }

    /// 计时开始后经过的时间
    pub fn elapsed(&self) -> Option<Duration> {
        self.begin.map(|b| b.elapsed())
    }

    pub fn timeline(&self) -> &ShutterTimeline {
        &self.timeline
    }

    /// 按当前时间推进；未开始时无操作
    pub fn tick(&mut self) -> Vec<ShutterAction> {
        match self.elapsed() {
            Some(elapsed) => self.tick_at(elapsed),
            None => Vec::new(),
        }
    }

    /// 按给定的经过时间推进
    pub fn tick_at(&mut self, elapsed: Duration) -> Vec<ShutterAction> {
        let last = self.store.lock().last_shutter_label();
        let actions = self.timeline.advance(elapsed.as_secs_f64(), last);

        for action in &actions {
            match action {
                ShutterAction::CloseGlass => self.glass_off(),
                ShutterAction::LaneChange => self.record(ShutterLabel::LaneChange),
                ShutterAction::Alarm => self.record(ShutterLabel::Alarm),
            }
        }
        actions
    }

    /// 关闭眼镜（遮挡），记录 `OFF`
    pub fn glass_off(&mut self) {
        self.drive(true);
        self.record(ShutterLabel::Off);
    }

    /// 打开眼镜，记录 `ON`
    pub fn glass_on(&mut self) {
        self.drive(false);
        self.record(ShutterLabel::On);
    }

    /// 恢复为透明，不记录事件（会话结束后使用）
    pub fn reset_switch(&mut self) -> Result<(), SerialError> {
        match self.switch.as_mut() {
            Some(switch) => switch.set(false),
            None => Ok(()),
        }
    }

    // 开关失败不影响事件记录
    fn drive(&mut self, occlude: bool) {
        if let Some(switch) = self.switch.as_mut()
            && let Err(e) = switch.set(occlude)
        {
            self.log.warn(format!("Shutter glass switch failed: {}", e));
        }
    }

    fn record(&self, label: ShutterLabel) {
        self.store.with(|s| s.push_shutter(label, cpu_millis()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_adapter::serial::mock::MockShutterSwitch;

    fn labels(store: &SharedRecordStore) -> Vec<ShutterLabel> {
        store.lock().shutter_events.iter().map(|e| e.label).collect()
    }

    #[test]
    fn test_timeline_without_offset() {
        let mut timeline = ShutterTimeline::new(10.0, 0.0, 0.0);
        assert!(timeline.advance(9.9, None).is_empty());
        assert_eq!(timeline.advance(10.0, None), vec![ShutterAction::LaneChange]);
        assert!(!timeline.is_pending());
        assert!(timeline.advance(20.0, None).is_empty());
    }

    #[test]
    fn test_timeline_offset_closes_once() {
        let mut timeline = ShutterTimeline::new(10.0, 0.0, 1.5);
        assert!(timeline.advance(8.0, Some(ShutterLabel::Start)).is_empty());
        assert_eq!(
            timeline.advance(8.5, Some(ShutterLabel::Start)),
            vec![ShutterAction::CloseGlass]
        );
        assert!(timeline.advance(9.0, Some(ShutterLabel::Off)).is_empty());
        assert_eq!(
            timeline.advance(10.2, Some(ShutterLabel::Off)),
            vec![ShutterAction::LaneChange]
        );
    }

    #[test]
    fn test_timeline_alarm_independent() {
        let mut timeline = ShutterTimeline::new(0.0, 3.0, 0.0);
        assert_eq!(timeline.lane_change_remaining(1.0), 2.0);
        assert_eq!(timeline.advance(3.5, None), vec![ShutterAction::Alarm]);
        assert_eq!(timeline.lane_change_remaining(4.0), 0.0);
    }

    #[test]
    fn test_negative_offset_clamped() {
        let mut timeline = ShutterTimeline::new(5.0, 0.0, -2.0);
        assert!(timeline.advance(4.9, None).is_empty());
    }

    #[test]
    fn test_controller_sequence() {
        let store = SharedRecordStore::new();
        let switch = MockShutterSwitch::new();
        let mut controller = ShutterController::new(
            Some(Box::new(switch.clone())),
            store.clone(),
            EventLog::detached(),
        );

        assert!(controller.tick().is_empty());
        controller.start(ShutterTimeline::new(10.0, 12.0, 1.0));
        controller.tick_at(Duration::from_secs(9));
        controller.tick_at(Duration::from_millis(9500));
        controller.tick_at(Duration::from_secs(10));
        controller.tick_at(Duration::from_secs(12));

        assert_eq!(
            labels(&store),
            vec![
                ShutterLabel::Start,
                ShutterLabel::Off,
                ShutterLabel::LaneChange,
                ShutterLabel::Alarm
            ]
        );
        assert_eq!(switch.history(), vec![true]);
    }

    #[test]
    fn test_manual_switching() {
        let store = SharedRecordStore::new();
        let switch = MockShutterSwitch::new();
        let mut controller =
            ShutterController::new(Some(Box::new(switch.clone())), store.clone(), EventLog::detached());

        controller.glass_off();
        controller.glass_on();
        assert_eq!(labels(&store), vec![ShutterLabel::Off, ShutterLabel::On]);
        assert_eq!(switch.history(), vec![true, false]);

        // 无开关设备时仍记录事件
        let mut recorder = ShutterController::new(None, store.clone(), EventLog::detached());
        recorder.glass_on();
        assert_eq!(labels(&store).len(), 3);
        assert!(recorder.reset_switch().is_ok());

        controller.reset_switch().unwrap();
        assert_eq!(switch.history(), vec![true, false, false]);
        assert_eq!(labels(&store).len(), 3);
    }
}
