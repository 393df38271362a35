//! Time-of-day and day-of-week load curve.
//!
//! | Window                       | Factor |
//! |------------------------------|--------|
//! | Business hours, 09:00-18:00  | 0.9    |
//! | Lunch spike, 12:00-14:00     | 1.3    |
//! | Weekend (Sat, Sun)           | 0.6    |
//! | Late night, 23:00-06:00      | 0.65   |
//!
//! Factors multiply, so the reachable range is `[0.39, 1.17]`: a weekend
//! night at the bottom, a weekday lunch hour at the top.

use chrono::{DateTime, Datelike, Local, Timelike, Weekday};

pub const BUSINESS_HOURS_FACTOR: f64 = 0.9;
pub const LUNCH_SPIKE_FACTOR: f64 = 1.3;
pub const WEEKEND_FACTOR: f64 = 0.6;
pub const LATE_NIGHT_FACTOR: f64 = 0.65;

/// Smallest multiplier [`seasonal_multiplier`] can return.
pub const MIN_MULTIPLIER: f64 = WEEKEND_FACTOR * LATE_NIGHT_FACTOR;
/// Largest multiplier [`seasonal_multiplier`] can return.
pub const MAX_MULTIPLIER: f64 = BUSINESS_HOURS_FACTOR * LUNCH_SPIKE_FACTOR;

/// Load multiplier for a local hour (0-23) and weekday.
#[must_use]
pub fn seasonal_multiplier(hour: u32, weekday: Weekday) -> f64 {
    let mut multiplier = 1.0;

    if (9..18).contains(&hour) {
        multiplier *= BUSINESS_HOURS_FACTOR;
    }
    if (12..14).contains(&hour) {
        multiplier *= LUNCH_SPIKE_FACTOR;
    }
    if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        multiplier *= WEEKEND_FACTOR;
    }
    if !(6..23).contains(&hour) {
        multiplier *= LATE_NIGHT_FACTOR;
    }

    multiplier
}

/// Load multiplier at a wall-clock instant, interpreted in the local timezone.
///
/// Falls back to a neutral `1.0` for timestamps chrono cannot represent.
#[must_use]
pub fn seasonal_multiplier_at(now_ms: u64) -> f64 {
    i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or(1.0, |utc| {
            let local = utc.with_timezone(&Local);
            seasonal_multiplier(local.hour(), local.weekday())
        })
}
