//! ASE epoch and tick conversions.
//!
//! ASE counts dates from several epochs depending on the type:
//!
//! - `date`, `datetime` and `smalldatetime` count days since 1900-01-01,
//! - `bigdatetime` counts microseconds on a Rata Die scale (days since
//!   0001-01-01) but additionally counts a year 0, adding 365 days,
//! - `bigtime` counts microseconds within a day.
//!
//! Sub-second fields of `time` and `datetime` are ticks of 1/300 second.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::TypeError;

/// Microseconds per day.
pub const MICROS_PER_DAY: u64 = 86_400_000_000;

// ASE's Rata Die scale counts a year 0 that the proleptic Gregorian
// calendar does not have.
const YEAR_ZERO_DAYS: i64 = 365;

fn epoch_1900() -> NaiveDate {
    // Statically valid date.
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

/// Days between 1900-01-01 and the given date.
#[must_use]
pub fn days_since_1900(date: NaiveDate) -> i32 {
    (date - epoch_1900()).num_days() as i32
}

/// Date from a day count relative to 1900-01-01.
///
/// # Errors
///
/// Returns an error if the resulting date is unrepresentable.
pub fn date_from_days_1900(days: i32) -> Result<NaiveDate, TypeError> {
    epoch_1900()
        .checked_add_signed(chrono::Duration::days(i64::from(days)))
        .ok_or(TypeError::DateTimeOutOfRange("date"))
}

/// Time of day in microseconds.
#[must_use]
pub fn micros_of_day(time: NaiveTime) -> u64 {
    u64::from(time.num_seconds_from_midnight()) * 1_000_000
        + u64::from(time.nanosecond() / 1_000)
}

/// Time of day from microseconds since midnight.
///
/// # Errors
///
/// Returns an error for values of a day or more.
pub fn time_from_micros(micros: u64) -> Result<NaiveTime, TypeError> {
    if micros >= MICROS_PER_DAY {
        return Err(TypeError::DateTimeOutOfRange("time"));
    }
    let secs = (micros / 1_000_000) as u32;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or(TypeError::DateTimeOutOfRange("time"))
}

/// Time of day as ticks of 1/300 second.
#[must_use]
pub fn ticks_of_day(time: NaiveTime) -> u32 {
    let micros = micros_of_day(time);
    // Round to the nearest tick.
    ((micros as f64 * 300.0 / 1_000_000.0).round()) as u32
}

/// Time of day from ticks of 1/300 second.
///
/// # Errors
///
/// Returns an error for tick counts of a day or more.
pub fn time_from_ticks(ticks: u32) -> Result<NaiveTime, TypeError> {
    let millis = u64::from(ticks) * 1_000 / 300;
    time_from_micros(millis * 1_000)
}

/// Microseconds on the ASE `bigdatetime` scale (Rata Die plus year 0).
#[must_use]
pub fn bigdatetime_micros(dt: NaiveDateTime) -> u64 {
    let days = i64::from(dt.date().num_days_from_ce()) + YEAR_ZERO_DAYS;
    days as u64 * MICROS_PER_DAY + micros_of_day(dt.time())
}

/// Date and time from ASE `bigdatetime` microseconds.
///
/// # Errors
///
/// Returns an error for values outside the representable range.
pub fn bigdatetime_from_micros(micros: u64) -> Result<NaiveDateTime, TypeError> {
    let days = (micros / MICROS_PER_DAY) as i64 - YEAR_ZERO_DAYS;
    let time_micros = micros % MICROS_PER_DAY;

    let days_i32 =
        i32::try_from(days).map_err(|_| TypeError::DateTimeOutOfRange("bigdatetime"))?;
    let date = NaiveDate::from_num_days_from_ce_opt(days_i32)
        .ok_or(TypeError::DateTimeOutOfRange("bigdatetime"))?;
    Ok(NaiveDateTime::new(date, time_from_micros(time_micros)?))
}
