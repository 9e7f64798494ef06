//! Backoff schedule for failed health checks.
//!
//! The repository stores the schedule as data (`next_retry_at`); it never
//! retries its own store calls. Probers read `next_retry_at` to decide when
//! a file is due for another check.

use chrono::Duration;

use crate::types::Timestamp;

/// Delay before the first re-check (5 minutes).
pub const BACKOFF_BASE_SECS: i64 = 300;

/// Upper bound on any single delay (24 hours).
pub const BACKOFF_CAP_SECS: i64 = 86_400;

/// Delay in seconds before retry number `retry_count` (1-based).
///
/// `base * 2^(retry_count - 1)`, capped at [`BACKOFF_CAP_SECS`]. A
/// `retry_count` of 0 is treated as 1 so callers cannot produce a zero
/// delay.
pub fn backoff_delay_secs(retry_count: i32) -> i64 {
    // Shift clamped well below 63 so the multiply cannot overflow.
    let exponent = (retry_count.max(1) - 1).min(40) as u32;
    BACKOFF_BASE_SECS
        .saturating_mul(1i64 << exponent)
        .min(BACKOFF_CAP_SECS)
}

/// Absolute timestamp of the next retry, given the attempt just recorded.
pub fn next_retry_at(now: Timestamp, retry_count: i32) -> Timestamp {
    now + Duration::seconds(backoff_delay_secs(retry_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn first_retry_uses_base_delay() {
        assert_eq!(backoff_delay_secs(1), BACKOFF_BASE_SECS);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        assert_eq!(backoff_delay_secs(2), BACKOFF_BASE_SECS * 2);
        assert_eq!(backoff_delay_secs(3), BACKOFF_BASE_SECS * 4);
        assert_eq!(backoff_delay_secs(4), BACKOFF_BASE_SECS * 8);
    }

    #[test]
    fn delay_is_capped() {
        assert_eq!(backoff_delay_secs(9), BACKOFF_CAP_SECS);
        assert_eq!(backoff_delay_secs(1_000), BACKOFF_CAP_SECS);
    }

    #[test]
    fn delay_is_monotonic() {
        let mut prev = 0;
        for n in 1..20 {
            let d = backoff_delay_secs(n);
            assert!(d >= prev, "delay decreased at attempt {n}");
            prev = d;
        }
    }

    #[test]
    fn zero_count_treated_as_first_attempt() {
        assert_eq!(backoff_delay_secs(0), BACKOFF_BASE_SECS);
    }

    #[test]
    fn next_retry_is_in_the_future() {
        let now = Utc::now();
        assert!(next_retry_at(now, 1) > now);
    }
}
