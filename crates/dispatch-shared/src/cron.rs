//! Five-field cron expression parsing and evaluation (component C1).
//!
//! Supports the standard `minute hour day-of-month month day-of-week` fields
//! with `*`, `N`, `N-M`, `*/S`, and `N,M,...` syntax, evaluated entirely in
//! UTC at second precision (seconds are always zero). When both the
//! day-of-month and day-of-week fields are restricted (not `*`), standard
//! cron union semantics apply: a candidate matches if it satisfies *either*
//! field, not both.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt;

/// One year of minutes, the bound on how far `next()` will scan before
/// concluding an expression never fires (which, for a validated expression
/// with in-range fields, cannot actually happen).
const MAX_MINUTES_SCANNED: i64 = 366 * 24 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid cron expression: {0}")]
pub struct InvalidExpression(pub String);

/// A single cron field, parsed into the set of values it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    /// `true` means "every value in range" (the field was `*`).
    wildcard: bool,
    values: Vec<u32>,
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32) -> Result<Self, InvalidExpression> {
        if raw == "*" {
            return Ok(Field {
                wildcard: true,
                values: (min..=max).collect(),
            });
        }

        if let Some(step_str) = raw.strip_prefix("*/") {
            let step: u32 = step_str
                .parse()
                .map_err(|_| InvalidExpression(raw.to_string()))?;
            if step == 0 {
                return Err(InvalidExpression(raw.to_string()));
            }
            let values: Vec<u32> = (min..=max).filter(|v| (v - min) % step == 0).collect();
            if values.is_empty() {
                return Err(InvalidExpression(raw.to_string()));
            }
            return Ok(Field {
                wildcard: false,
                values,
            });
        }

        let mut values = Vec::new();
        for part in raw.split(',') {
            if part.is_empty() {
                return Err(InvalidExpression(raw.to_string()));
            }
            if let Some((start_s, end_s)) = part.split_once('-') {
                let start: u32 = start_s
                    .parse()
                    .map_err(|_| InvalidExpression(raw.to_string()))?;
                let end: u32 = end_s
                    .parse()
                    .map_err(|_| InvalidExpression(raw.to_string()))?;
                if start > end || start < min || end > max {
                    return Err(InvalidExpression(raw.to_string()));
                }
                values.extend(start..=end);
            } else {
                let v: u32 = part.parse().map_err(|_| InvalidExpression(raw.to_string()))?;
                if v < min || v > max {
                    return Err(InvalidExpression(raw.to_string()));
                }
                values.push(v);
            }
        }
        if values.is_empty() {
            return Err(InvalidExpression(raw.to_string()));
        }
        values.sort_unstable();
        values.dedup();
        Ok(Field {
            wildcard: false,
            values,
        })
    }

    fn matches(&self, value: u32) -> bool {
        self.values.contains(&value)
    }
}

/// A parsed, validated cron expression ready for repeated evaluation.
///
/// Construction validates the expression once; `next()` is then cheap to
/// call repeatedly, which is the access pattern of the scheduler loop
/// (re-evaluated on every tick for every enabled cron task).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    source: String,
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
    /// When both dom and dow are restricted, a match requires either to hit
    /// (standard cron union semantics) instead of both (intersection).
    dom_dow_union: bool,
}

impl CronSchedule {
    /// Parse a 5-field cron expression. Fails with [`InvalidExpression`] on
    /// anything else (wrong field count, out-of-range values, malformed
    /// ranges/steps).
    pub fn parse(expr: &str) -> Result<Self, InvalidExpression> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(InvalidExpression(expr.to_string()));
        }

        let minute = Field::parse(fields[0], 0, 59)?;
        let hour = Field::parse(fields[1], 0, 23)?;
        let dom = Field::parse(fields[2], 1, 31)?;
        let month = Field::parse(fields[3], 1, 12)?;
        let dow = Field::parse(fields[4], 0, 6)?;

        let dom_dow_union = !dom.wildcard && !dow.wildcard;

        Ok(CronSchedule {
            source: expr.to_string(),
            minute,
            hour,
            dom,
            month,
            dow,
            dom_dow_union,
        })
    }

    /// The original expression string.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, dt: &DateTime<Utc>) -> bool {
        let dom_hit = self.dom.matches(dt.day());
        // chrono's weekday starts at Monday; cron's day-of-week field is
        // 0=Sunday..6=Saturday.
        let dow_value = dt.weekday().num_days_from_sunday();
        let dow_hit = self.dow.matches(dow_value);

        if self.dom_dow_union {
            dom_hit || dow_hit
        } else {
            dom_hit && dow_hit
        }
    }

    fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.month.matches(dt.month())
            && self.day_matches(dt)
    }

    /// The smallest instant `t' >= t` at which this expression fires,
    /// truncated to whole seconds (the seconds field is always zero).
    ///
    /// Idempotent and monotone: `next(next(t)) > next(t)` and
    /// `a <= b => next(a) <= next(b)`.
    pub fn next(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = t
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(t);
        if candidate < t {
            candidate += chrono::Duration::minutes(1);
        }

        for _ in 0..MAX_MINUTES_SCANNED {
            if self.matches(&candidate) {
                return candidate;
            }
            candidate += chrono::Duration::minutes(1);
        }

        // Unreachable for any expression that passed `parse()`: every field
        // has at least one valid value, so some minute within a year
        // (accounting for the dom/dow union and leap years) always matches.
        unreachable!("cron schedule {} produced no match within a year", self.source)
    }

    /// A best-effort human description for well-known patterns. Anything
    /// outside this small recognized set returns `"Custom schedule"` rather
    /// than attempting a general-purpose English renderer.
    pub fn describe(&self) -> String {
        describe_expr(&self.source).unwrap_or_else(|| "Custom schedule".to_string())
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn describe_expr(expr: &str) -> Option<String> {
    let normalized = expr.split_whitespace().collect::<Vec<_>>().join(" ");
    let known: &[(&str, &str)] = &[
        ("* * * * *", "Every minute"),
        ("0 * * * *", "Every hour, on the hour"),
        ("*/5 * * * *", "Every 5 minutes"),
        ("*/10 * * * *", "Every 10 minutes"),
        ("*/15 * * * *", "Every 15 minutes"),
        ("*/30 * * * *", "Every 30 minutes"),
        ("0 0 * * *", "Daily at midnight UTC"),
        ("0 12 * * *", "Daily at noon UTC"),
        ("0 0 * * 0", "Weekly on Sunday at midnight UTC"),
        ("0 0 1 * *", "Monthly on the 1st at midnight UTC"),
        ("0 0 1 1 *", "Yearly on January 1st at midnight UTC"),
    ];
    known
        .iter()
        .find(|(pattern, _)| *pattern == normalized)
        .map(|(_, desc)| desc.to_string())
}

/// Convenience free function mirroring [`CronSchedule::parse`] followed by
/// [`CronSchedule::next`], for call sites that don't need to hold onto a
/// parsed schedule.
pub fn next(expr: &str, t: DateTime<Utc>) -> Result<DateTime<Utc>, InvalidExpression> {
    CronSchedule::parse(expr).map(|s| s.next(t))
}

/// Convenience free function mirroring [`CronSchedule::describe`].
pub fn describe(expr: &str) -> String {
    CronSchedule::parse(expr)
        .map(|s| s.describe())
        .unwrap_or_else(|_| "Custom schedule".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("* * * *").is_err());
        assert!(CronSchedule::parse("* * * * * *").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("* 24 * * *").is_err());
        assert!(CronSchedule::parse("* * 0 * *").is_err());
        assert!(CronSchedule::parse("* * * 13 *").is_err());
        assert!(CronSchedule::parse("* * * * 7").is_err());
    }

    #[test]
    fn rejects_malformed_step() {
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("*/x * * * *").is_err());
    }

    #[test]
    fn every_five_minutes_s1() {
        let sched = CronSchedule::parse("*/5 * * * *").unwrap();
        let t = dt(2026, 7, 31, 12, 0);
        assert_eq!(sched.next(t), t);
        assert_eq!(sched.next(t + chrono::Duration::seconds(1)), dt(2026, 7, 31, 12, 5));
    }

    #[test]
    fn range_and_list() {
        let sched = CronSchedule::parse("0 9-17 * * 1,3,5").unwrap();
        // Monday 2026-08-03 09:00 UTC
        assert!(sched.matches(&dt(2026, 8, 3, 9, 0)));
        assert!(!sched.matches(&dt(2026, 8, 3, 18, 0)));
        // Tuesday is not in the dow list
        assert!(!sched.matches(&dt(2026, 8, 4, 9, 0)));
    }

    #[test]
    fn dom_dow_union_semantics() {
        // Fires on the 1st of the month OR on Fridays.
        let sched = CronSchedule::parse("0 0 1 * 5").unwrap();
        assert!(sched.matches(&dt(2026, 8, 1, 0, 0))); // Saturday the 1st
        assert!(sched.matches(&dt(2026, 8, 7, 0, 0))); // a Friday, not the 1st
        assert!(!sched.matches(&dt(2026, 8, 2, 0, 0))); // neither
    }

    #[test]
    fn idempotent_and_monotone() {
        let sched = CronSchedule::parse("17 3 * * *").unwrap();
        let a = dt(2026, 1, 1, 0, 0);
        let b = dt(2026, 6, 15, 10, 30);
        let next_a = sched.next(a);
        let next_b = sched.next(b);
        assert!(a <= b);
        assert!(next_a <= next_b);
        assert!(sched.next(next_a) > next_a);
    }

    #[test]
    fn describe_known_patterns() {
        assert_eq!(describe("*/5 * * * *"), "Every 5 minutes");
        assert_eq!(describe("0 0 * * *"), "Daily at midnight UTC");
        assert_eq!(describe("7 13 * * 2"), "Custom schedule");
    }

    #[test]
    fn describe_invalid_expression_is_custom() {
        assert_eq!(describe("not a cron"), "Custom schedule");
    }

    #[test]
    fn next_at_exact_boundary_advances_past_seconds() {
        let sched = CronSchedule::parse("30 * * * *").unwrap();
        let t = dt(2026, 7, 31, 12, 30) + chrono::Duration::seconds(1);
        let got = sched.next(t);
        assert_eq!(got, dt(2026, 7, 31, 13, 30));
    }
}
