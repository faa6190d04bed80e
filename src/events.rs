//! Interrupt-driven event flags.
//!
//! Events are produced by:
//! - the MCP7940 MFP pin ISR (an alarm matched)
//! - the main loop's poll interval elapsing
//!
//! and consumed by the main loop, which is the only place the clock bus and
//! the schedule store are touched.  Producers only set a bit.
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌──────────────┐
//! │ MFP ISR     │────▶│               │     │              │
//! │ Poll timer  │────▶│ PendingEvents │────▶│  Main Loop   │
//! └─────────────┘     │  (AtomicU8)   │     │  (consumer)  │
//!                     └───────────────┘     └──────────────┘
//! ```
//!
//! Repeated raises before the main loop runs coalesce into one; the loop
//! re-reads the clock anyway, so no information is lost.

use core::sync::atomic::{AtomicU8, Ordering};

/// Event kinds, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// The RTC pulled MFP low: an alarm fired.
    AlarmAsserted   = 1 << 0,
    /// Periodic poll interval elapsed.
    PollTick        = 1 << 1,
}

impl Event {
    pub const ALL: [Event; 2] = [Event::AlarmAsserted, Event::PollTick];
}

/// Lock-free set of pending [`Event`]s, usable from a `static`.
pub struct PendingEvents {
    bits: AtomicU8,
}

impl PendingEvents {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    /// Mark `event` pending.  Safe to call from ISR context.
    pub fn raise(&self, event: Event) {
        self.bits.fetch_or(event as u8, Ordering::Release);
    }

    /// Atomically take every pending event, leaving the set empty.
    pub fn take(&self) -> EventSet {
        EventSet(self.bits.swap(0, Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.bits.load(Ordering::Acquire) == 0
    }
}

impl Default for PendingEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot returned by [`PendingEvents::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet(u8);

impl EventSet {
    pub const fn contains(self, event: Event) -> bool {
        self.0 & event as u8 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Pending events in priority order (alarm first).
    pub fn iter(self) -> impl Iterator<Item = Event> {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}
