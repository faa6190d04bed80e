//! Weekly recurring watering schedules.
//!
//! A [`ScheduleSet`] is a small, fixed-capacity table of [`ScheduleEntry`]
//! slots.  It is written to the RTC's battery-backed SRAM by the
//! [`store`] and turned into the next watering window by the [`resolver`].
//!
//! ```text
//!  command handler ──▶ ScheduleSet ──▶ store (RTC SRAM)
//!                                          │
//!                          now ──▶ resolver ◀┘ ──▶ ResolvedAlarm ──▶ alarm programmer
//! ```

pub mod resolver;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::clock::{Timestamp, add_secs};

/// Maximum number of schedule slots (stack-allocated, persisted as one block).
pub const MAX_SCHEDULES: usize = 10;

// ── Day-of-week mask (bit 0 = Sunday … bit 6 = Saturday) ─────

pub const SUNDAY: u8 = 1 << 0;
pub const MONDAY: u8 = 1 << 1;
pub const TUESDAY: u8 = 1 << 2;
pub const WEDNESDAY: u8 = 1 << 3;
pub const THURSDAY: u8 = 1 << 4;
pub const FRIDAY: u8 = 1 << 5;
pub const SATURDAY: u8 = 1 << 6;
pub const WEEKDAYS: u8 = MONDAY | TUESDAY | WEDNESDAY | THURSDAY | FRIDAY;
pub const WEEKEND: u8 = SATURDAY | SUNDAY;
pub const EVERY_DAY: u8 = 0b0111_1111;

// ═══════════════════════════════════════════════════════════════
//  Schedule entry
// ═══════════════════════════════════════════════════════════════

/// One recurring watering window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Start hour (0-23).
    pub hour: u8,
    /// Start minute (0-59).
    pub minute: u8,
    /// How long the pump runs, in seconds.
    pub duration_secs: u16,
    /// Repeat days, `SUNDAY | MONDAY | …`.
    pub days_of_week: u8,
    /// Whether the entry participates in resolution.
    pub enabled: bool,
}

impl ScheduleEntry {
    pub const fn new(hour: u8, minute: u8, duration_secs: u16, days_of_week: u8) -> Self {
        Self {
            hour,
            minute,
            duration_secs,
            days_of_week,
            enabled: true,
        }
    }

    /// Whether this entry can ever fire.
    ///
    /// An entry with no days, no duration, or an impossible time of day is
    /// inert even when `enabled` is set.  The resolver checks this on every
    /// pass, so a half-written or corrupted slot can never start the pump.
    pub const fn is_active(&self) -> bool {
        self.enabled
            && self.days_of_week & EVERY_DAY != 0
            && self.duration_secs > 0
            && self.hour < 24
            && self.minute < 60
    }

    /// Whether every field fits the stored encoding.  Flags and duration
    /// are unconstrained; an out-of-range entry could be written but never
    /// read back.
    pub const fn is_storable(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.days_of_week & !EVERY_DAY == 0
    }

    /// Whether the entry repeats on the Sunday-origin day index `bit` (0-6).
    pub const fn runs_on(&self, bit: u8) -> bool {
        bit < 7 && self.days_of_week & (1 << bit) != 0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schedule set
// ═══════════════════════════════════════════════════════════════

/// Ordered, fixed-capacity collection of schedule entries.
///
/// Slot order does not affect which window is chosen, except that the
/// lower slot wins an exact tie.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleSet {
    entries: heapless::Vec<ScheduleEntry, MAX_SCHEDULES>,
}

impl ScheduleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a slice.  Returns `None` if it exceeds capacity.
    pub fn from_entries(entries: &[ScheduleEntry]) -> Option<Self> {
        heapless::Vec::from_slice(entries)
            .ok()
            .map(|entries| Self { entries })
    }

    /// Append an entry.  Hands it back if all slots are taken.
    pub fn push(&mut self, entry: ScheduleEntry) -> Result<usize, ScheduleEntry> {
        self.entries.push(entry)?;
        Ok(self.entries.len() - 1)
    }

    pub fn get(&self, slot: usize) -> Option<&ScheduleEntry> {
        self.entries.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that can actually fire.
    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active()).count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Resolved alarm
// ═══════════════════════════════════════════════════════════════

/// The single next watering window.  Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAlarm {
    pub start: Timestamp,
    pub duration_secs: u16,
    /// Slot of the entry that produced this window.
    pub slot: usize,
}

impl ResolvedAlarm {
    /// End of the window (`start + duration`).
    pub fn stop(&self) -> Timestamp {
        // A u16 duration cannot overflow any date the RTC can represent
        // (years 2000-2099); fall back to `start` at the calendar limit.
        add_secs(self.start, u32::from(self.duration_secs)).unwrap_or(self.start)
    }
}
