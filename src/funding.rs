// src/funding.rs
const HOUR_MS: f64 = 3_600_000.0;
const HOURS_PER_DAY: f64 = 24.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// Scale a per-interval funding fraction to a yearly percentage.
#[inline]
pub fn annualize(rate: f64, interval_hours: u32) -> f64 {
    rate * (HOURS_PER_DAY / interval_hours as f64) * DAYS_PER_YEAR * 100.0
}

/// Hours between two settlement timestamps, rounded to the nearest hour.
/// `None` when the gap rounds to zero (duplicate or out-of-order points) or
/// the timestamps are too far apart to subtract.
pub fn interval_between(earlier_ms: i64, later_ms: i64) -> Option<u32> {
    let hours = (later_ms.checked_sub(earlier_ms)? as f64 / HOUR_MS).round();
    if hours >= 1.0 && hours <= u32::MAX as f64 {
        Some(hours as u32)
    } else {
        None
    }
}

/// Infer the interval from the two most recent settlements in an unordered
/// history.
pub fn infer_interval_hours(settlements_ms: &[i64]) -> Option<u32> {
    let mut ts = settlements_ms.to_vec();
    ts.sort_unstable();
    ts.dedup();
    match ts.as_slice() {
        [.., a, b] => interval_between(*a, *b),
        _ => None,
    }
}

/// Interval for a quote: explicit hint, then settlement history, then the
/// exchange default.
pub fn resolve_interval(hint: Option<u32>, settlements_ms: &[i64], default_hours: u32) -> u32 {
    hint.filter(|h| *h > 0)
        .or_else(|| infer_interval_hours(settlements_ms))
        .unwrap_or(default_hours)
}
