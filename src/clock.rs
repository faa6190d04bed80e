//! Wall-clock time helpers shared by the resolver, programmer and recovery.
//!
//! The RTC keeps local time with no zone information, so every timestamp
//! in the crate is a [`NaiveDateTime`].

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use core::fmt::Write;

use crate::app::ports::ClockError;

/// Absolute wall-clock time as kept by the RTC.
pub type Timestamp = NaiveDateTime;

/// `"YYYY-MM-DD HH:MM:SS"`.
pub type TimestampText = heapless::String<19>;

pub const SECS_PER_MINUTE: u32 = 60;
pub const SECS_PER_HOUR: u32 = 3_600;

/// ISO weekday of `time`: Monday = 1 … Sunday = 7.
pub fn iso_weekday(time: Timestamp) -> u8 {
    time.weekday().number_from_monday() as u8
}

/// Map a native weekday index (Monday = 1 … Sunday = 7) onto the schedule
/// mask's Sunday-origin bit index (Sunday = 0 … Saturday = 6).
///
/// `7 % 7 == 0` sends Sunday to bit 0; every other day keeps its number.
pub const fn day_bit(native_weekday: u8) -> u8 {
    native_weekday % 7
}

/// Whole seconds from `earlier` to `later`.
///
/// A negative span means the clock handed us timestamps out of order; it is
/// reported as [`ClockError::Skew`] instead of being clamped into a past
/// alarm.
pub fn checked_span(later: Timestamp, earlier: Timestamp) -> Result<u32, ClockError> {
    let secs = later.signed_duration_since(earlier).num_seconds();
    if secs < 0 {
        return Err(ClockError::Skew);
    }
    u32::try_from(secs).map_err(|_| ClockError::OutOfRange)
}

/// `time + secs`, failing instead of panicking at the calendar limit.
pub fn add_secs(time: Timestamp, secs: u32) -> Result<Timestamp, ClockError> {
    time.checked_add_signed(TimeDelta::seconds(i64::from(secs)))
        .ok_or(ClockError::OutOfRange)
}

/// `time` with seconds dropped, matching the resolution of the power-fail
/// stamps.
pub fn truncate_to_minute(time: Timestamp) -> Timestamp {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Convert a UTC epoch (e.g. from NTP) to local RTC time.
pub fn local_from_epoch(utc_epoch_secs: i64, utc_offset_minutes: i16) -> Option<Timestamp> {
    let offset = i64::from(utc_offset_minutes) * i64::from(SECS_PER_MINUTE);
    let local = utc_epoch_secs.checked_add(offset)?;
    chrono::DateTime::from_timestamp(local, 0).map(|dt| dt.naive_utc())
}

/// Render `time` as `"YYYY-MM-DD HH:MM:SS"`.
pub fn format_timestamp(time: Timestamp) -> TimestampText {
    let mut s = TimestampText::new();
    let _ = write!(
        s,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    );
    s
}
