//! Next-alarm resolution.
//!
//! Given the current wall-clock time and a [`ScheduleSet`], find the single
//! earliest future watering window.  Pure: no clock access, no allocation.

use chrono::{Days, NaiveTime};

use crate::clock::{Timestamp, day_bit, iso_weekday};

use super::{ResolvedAlarm, ScheduleEntry, ScheduleSet};

/// Day offsets searched per entry.  Offset 7 lands on today's weekday again,
/// which is needed when today's occurrence has already passed.
const SEARCH_DAYS: u64 = 8;

/// Earliest future window using ISO weekday numbering.
pub fn resolve(now: Timestamp, set: &ScheduleSet) -> Option<ResolvedAlarm> {
    resolve_with(now, set, iso_weekday)
}

/// Earliest future window, asking `weekday` for the native (Monday = 1 …
/// Sunday = 7) index of a date.
///
/// Only entries that pass [`ScheduleEntry::is_active`] are considered.  A
/// candidate must be strictly after `now`, so an alarm at exactly `now` is
/// treated as already consumed.
pub fn resolve_with<F>(now: Timestamp, set: &ScheduleSet, weekday: F) -> Option<ResolvedAlarm>
where
    F: Fn(Timestamp) -> u8,
{
    let mut best: Option<ResolvedAlarm> = None;

    for (slot, entry) in set.iter().enumerate() {
        if !entry.is_active() {
            continue;
        }
        let Some(start) = next_occurrence(now, entry, &weekday) else {
            continue;
        };
        // Strict `<`: on an exact tie the lower slot (declared first) wins.
        if best.is_none_or(|b| start < b.start) {
            best = Some(ResolvedAlarm {
                start,
                duration_secs: entry.duration_secs,
                slot,
            });
        }
    }

    best
}

fn next_occurrence<F>(now: Timestamp, entry: &ScheduleEntry, weekday: &F) -> Option<Timestamp>
where
    F: Fn(Timestamp) -> u8,
{
    let at = NaiveTime::from_hms_opt(u32::from(entry.hour), u32::from(entry.minute), 0)?;
    let today = now.date();

    for offset in 0..SEARCH_DAYS {
        let date = today.checked_add_days(Days::new(offset))?;
        let candidate = date.and_time(at);
        if !entry.runs_on(day_bit(weekday(candidate))) {
            continue;
        }
        if candidate > now {
            return Some(candidate);
        }
    }
    None
}
