//! Shared test doubles for integration tests.
//!
//! The clock itself is the library's `SimClock`; this module adds a sink
//! that records every event and a delay that records every backoff, so
//! tests can assert on the full history.

use chrono::NaiveDate;
use embedded_hal::delay::DelayNs;
use pumpclock::adapters::sim_clock::SimClock;
use pumpclock::app::events::AppEvent;
use pumpclock::app::ports::EventSink;
use pumpclock::app::service::PumpController;
use pumpclock::clock::Timestamp;
use pumpclock::config::ControllerConfig;
use pumpclock::schedule::{ScheduleEntry, ScheduleSet};

// ── RecordingSink ─────────────────────────────────────────────

pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn last(&self) -> Option<&AppEvent> {
        self.events.last()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn faults(&self) -> usize {
        self.count(|e| matches!(e, AppEvent::Fault(_)))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── CountingDelay ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: u32,
    pub total_ms: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ms += u64::from(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += u64::from(ms);
    }
}

// ── Helpers ───────────────────────────────────────────────────

pub type TestController = PumpController<SimClock, CountingDelay>;

pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

/// A time on Monday 2024-06-03.
pub fn monday(h: u32, mi: u32, s: u32) -> Timestamp {
    ts(2024, 6, 3, h, mi, s)
}

#[allow(dead_code)]
pub fn controller_at(now: Timestamp) -> TestController {
    controller_with(now, ControllerConfig::default())
}

pub fn controller_with(now: Timestamp, config: ControllerConfig) -> TestController {
    PumpController::new(SimClock::new(now), CountingDelay::default(), config)
}

#[allow(dead_code)]
pub fn schedules(entries: &[ScheduleEntry]) -> ScheduleSet {
    ScheduleSet::from_entries(entries).unwrap()
}

/// Simulate a reboot: the clock survives, controller state does not.
#[allow(dead_code)]
pub fn reboot(controller: TestController, config: ControllerConfig) -> TestController {
    let (clock, delay) = controller.into_parts();
    PumpController::new(clock, delay, config)
}
