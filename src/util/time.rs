//! Millisecond-precision clock helpers.
//!
//! Expiry arithmetic runs on unix milliseconds throughout; second
//! granularity cannot express the sub-second TTLs used for volatile
//! categories and in sweep tests.

use std::time::Duration;

use time::OffsetDateTime;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> i64 {
    unix_millis(OffsetDateTime::now_utc())
}

/// Convert a timestamp to unix milliseconds.
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Duration between two unix-millisecond timestamps, saturating at zero.
pub fn millis_between(earlier: i64, later: i64) -> Duration {
    Duration::from_millis(later.saturating_sub(earlier).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_millis_matches_seconds() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp");
        assert_eq!(unix_millis(at), 1_700_000_000_000);
    }

    #[test]
    fn millis_between_saturates() {
        assert_eq!(millis_between(2_000, 1_000), Duration::ZERO);
        assert_eq!(millis_between(1_000, 3_500), Duration::from_millis(2_500));
    }
}
