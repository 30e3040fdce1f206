//! 时间工具
//!
//! 消息时间戳统一使用 UTC、毫秒精度。时间戳在会话的消息流中用作消息标识，
//! 因此写入存储前必须先做毫秒截断，保证比较语义一致。

use chrono::{DateTime, Duration, Utc};

/// 截断到毫秒精度
pub fn round_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let sub_millis_nanos = ts.timestamp_subsec_nanos() % 1_000_000;
    ts - Duration::nanoseconds(sub_millis_nanos as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_drops_sub_millisecond_part() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + Duration::nanoseconds(1_234_567);
        let rounded = round_to_millis(ts);
        assert_eq!(rounded.timestamp_subsec_nanos(), 1_000_000);
    }

    #[test]
    fn round_is_idempotent() {
        let ts = round_to_millis(Utc::now());
        assert_eq!(ts, round_to_millis(ts));
    }
}
