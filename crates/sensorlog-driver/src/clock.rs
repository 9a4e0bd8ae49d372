//! CPU 时间戳
//!
//! 样本的捕获时间记为"自本地时间 2015-08-31 00:00:00 起的毫秒数"，
//! 与导出文件中的 CPUTIME 列、快门事件时间戳一致。

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// CPU 时间戳的零点（本地时间）
pub fn cpu_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 8, 31)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// 指定时刻的 CPU 时间戳（毫秒）
pub fn cpu_millis_at(now: DateTime<Local>) -> i64 {
    (now.naive_local() - cpu_epoch()).num_milliseconds()
}

/// 当前 CPU 时间戳（毫秒）
pub fn cpu_millis() -> i64 {
    cpu_millis_at(Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_is_zero() {
        let epoch = Local
            .from_local_datetime(&cpu_epoch())
            .single()
            .expect("unambiguous local time");
        assert_eq!(cpu_millis_at(epoch), 0);
    }

    #[test]
    fn test_one_day_later() {
        let next_day = NaiveDate::from_ymd_opt(2015, 9, 1)
            .unwrap()
            .and_hms_milli_opt(0, 0, 1, 500)
            .unwrap();
        let local = Local.from_local_datetime(&next_day).single().unwrap();
        assert_eq!(cpu_millis_at(local), 86_400_000 + 1_500);
    }

    #[test]
    fn test_now_is_positive() {
        assert!(cpu_millis() > 0);
    }
}
