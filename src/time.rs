//! Simulated time.
//!
//! Time is measured in seconds since the start of iteration 0, shifted by a configurable
//! start offset. Iteration `i` covers `[offset + i * DAY, offset + (i + 1) * DAY)`. Every
//! component converts between times and days with the functions here so that the day
//! boundary is the same for all callers.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

/// Seconds per simulated day.
pub const DAY: f64 = 86_400.0;

/// Converts a time of day (seconds, capped at one day) on `iteration` into simulated time.
#[must_use]
pub fn corrected_time(start_offset: f64, seconds: f64, iteration: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let day_start = iteration as f64 * DAY;
    start_offset + day_start + seconds.clamp(0.0, DAY)
}

/// The iteration (day) a simulated time falls into.
#[must_use]
pub fn day_of(start_offset: f64, time: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let day = ((time - start_offset) / DAY).floor() as i64;
    day
}

/// The calendar date of `iteration`; iteration 1 is `start_date`.
#[must_use]
pub fn date_of(start_date: NaiveDate, iteration: i64) -> NaiveDate {
    let offset = iteration - 1;
    if offset >= 0 {
        start_date + Days::new(offset.unsigned_abs())
    } else {
        start_date - Days::new(offset.unsigned_abs())
    }
}

/// The iteration whose calendar date is `date`.
#[must_use]
pub fn iteration_of(start_date: NaiveDate, date: NaiveDate) -> i64 {
    (date - start_date).num_days() + 1
}

/// Looks up a date-keyed step function: the value of the latest entry on or before `date`,
/// or `default` if there is none.
pub fn find_valid_entry<T: Clone>(map: &BTreeMap<NaiveDate, T>, default: T, date: NaiveDate) -> T {
    map.range(..=date)
        .next_back()
        .map_or(default, |(_, value)| value.clone())
}
