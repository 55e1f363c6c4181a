//! Quota counter (C11, spec.md §4.9): thresholds at 80% warning and 100%
//! reached, with admission refusal once reached.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaThresholdEvent {
    Warning,
    Reached,
}

/// The monthly execution cap per tier. Spec.md does not give a literal
/// number (only the concurrency caps are numeric); a generous monthly
/// ceiling is chosen so the 80%/100% thresholds are reachable under normal
/// load without throttling typical usage. Configurable per deployment via
/// `DispatchConfig` if this needs revisiting.
pub fn monthly_cap(tier: dispatch_shared::types::Tier) -> i64 {
    match tier {
        dispatch_shared::types::Tier::Free => 1_000,
        dispatch_shared::types::Tier::Pro => 100_000,
    }
}

/// Given the counter's value *after* an increment, decides which threshold
/// event (if any) newly crosses, given which ones have already been sent
/// this month.
pub fn check_threshold(
    new_count: i64,
    cap: i64,
    warning_already_sent: bool,
    reached_already_sent: bool,
) -> Option<QuotaThresholdEvent> {
    if new_count >= cap && !reached_already_sent {
        Some(QuotaThresholdEvent::Reached)
    } else if new_count * 100 >= cap * 80 && !warning_already_sent {
        Some(QuotaThresholdEvent::Warning)
    } else {
        None
    }
}

pub fn is_over_quota(count: i64, cap: i64) -> bool {
    count >= cap
}
