use chrono::{DateTime, NaiveDateTime, Utc};

/// The heartbeat timestamp format agents write: `YYYY-MM-DD HH:MM:SS`, UTC,
/// no timezone suffix.
pub const HEARTBEAT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a heartbeat timestamp in the fixed agent format, assuming UTC.
pub fn parse_heartbeat(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, HEARTBEAT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a point in time the way an agent would stamp a heartbeat.
pub fn format_heartbeat(t: DateTime<Utc>) -> String {
    t.format(HEARTBEAT_FORMAT).to_string()
}

/// Current time as whole seconds since the epoch, the unit every cache
/// timestamp sibling (`<key>:timestamp`) is stored in.
pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Seconds elapsed between `since` and `now_epoch_secs()`. Negative if
/// `since` is in the future (clock skew); callers compare against a
/// threshold so this is left unclamped.
pub fn age_secs(since: i64) -> i64 {
    now_epoch_secs() - since
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heartbeat_format() {
        let t = parse_heartbeat("2024-01-02 03:04:05").unwrap();
        assert_eq!(t.timestamp(), 1704165845);
    }

    #[test]
    fn rejects_malformed_heartbeat() {
        assert!(parse_heartbeat("not a date").is_none());
        assert!(parse_heartbeat("2024-01-02T03:04:05Z").is_none());
    }

    #[test]
    fn roundtrips_format_and_parse() {
        let t = parse_heartbeat("2024-06-15 12:00:00").unwrap();
        assert_eq!(format_heartbeat(t), "2024-06-15 12:00:00");
    }
}
