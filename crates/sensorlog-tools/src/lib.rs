//! # Sensorlog Tools - 会话导出与设置
//!
//! **依赖原则**: 只使用 `sensorlog-driver` 的记录类型与 `sensorlog-adapter` 的配置类型，
//! 不打开任何设备
//!
//! ## 包含模块
//!
//! - `layout` - 输出目录布局（subject/trial，失败时退化为平铺前缀）
//! - `gps_file` - `GPS.txt` 行格式（写入与解析）
//! - `acc_file` - `Acc.txt` 行格式（写入与解析）
//! - `shutter_file` - `Shutter.txt` 行格式（写入与解析）
//! - `persist` - 会话结束时一次性写出全部文件
//! - `settings` - 会话设置（TOML）
//!
//! ## 使用示例
//!
//! ```no_run
//! use sensorlog_tools::{SessionLayout, write_session};
//! # fn demo(records: sensorlog_driver::SessionRecords) -> anyhow::Result<()> {
//! let layout = SessionLayout::new(".", "s01", "t01");
//! let summary = write_session(&records, &layout)?;
//! println!("{} GPS rows", summary.gps_rows);
//! # Ok(())
//! # }
//! ```

pub mod acc_file;
pub mod gps_file;
pub mod layout;
pub mod persist;
pub mod settings;
pub mod shutter_file;

// 重新导出常用类型
pub use acc_file::{ACC_HEADER, AccRow, AccTableWriter, format_bad_ratio, parse_acc_row};
pub use gps_file::{CPU_TIME_MISSING, GPS_HEADER, GpsRow, GpsTableWriter, parse_gps_row};
pub use layout::{
    ACC_FILE_NAME, DEFAULT_SUBJECT, DEFAULT_TRIAL, GPS_FILE_NAME, OutputDir, SHUTTER_FILE_NAME,
    SessionLayout,
};
pub use persist::{
    WriteSummary, write_acc_table, write_gps_table, write_session, write_shutter_table,
};
pub use settings::{
    InertialSettings, NetworkSettings, ReadingModeSetting, SessionSettings, ShutterSettings,
};
pub use shutter_file::{parse_shutter_row, shutter_row};
