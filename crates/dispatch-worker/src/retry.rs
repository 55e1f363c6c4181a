//! Exponential backoff with jitter for execution retries (spec.md §4.4
//! step 6): `backoff(a) = min(max_backoff, base * 2^(a-1)) + jitter`.

use chrono::Duration;

/// `attempt` is the attempt number that just finished (1-based); the
/// returned duration is the delay before the *next* attempt.
pub fn backoff(attempt: i32, base_s: u64, max_s: u64, jitter: f64) -> Duration {
    let exp = attempt.saturating_sub(1).min(32) as u32;
    let raw = base_s.saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX).max(1));
    let capped = raw.min(max_s) as f64;

    let jitter_span = capped * jitter;
    let offset = (fastrand::f64() * 2.0 - 1.0) * jitter_span;
    let total = (capped + offset).max(0.0);

    Duration::milliseconds((total * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_near_base() {
        let d = backoff(1, 10, 600, 0.0);
        assert_eq!(d, Duration::seconds(10));
    }

    #[test]
    fn doubles_each_attempt() {
        assert_eq!(backoff(2, 10, 600, 0.0), Duration::seconds(20));
        assert_eq!(backoff(3, 10, 600, 0.0), Duration::seconds(40));
    }

    #[test]
    fn caps_at_max_backoff() {
        let d = backoff(20, 10, 600, 0.0);
        assert_eq!(d, Duration::seconds(600));
    }

    #[test]
    fn s2_retry_gaps_stay_within_backoff_bounds() {
        // retry_attempts=2, base=10s: attempt 2 >= 8s (20% jitter floor),
        // attempt 3 >= 16s, matching the scenario's literal bounds.
        for _ in 0..50 {
            let gap2 = backoff(1, 10, 600, 0.2);
            assert!(gap2.num_milliseconds() >= 8_000, "{gap2:?}");
            let gap3 = backoff(2, 10, 600, 0.2);
            assert!(gap3.num_milliseconds() >= 16_000, "{gap3:?}");
        }
    }
}
