//! Pump controller — the hexagonal core.
//!
//! [`PumpController`] owns the clock (behind the retry decorator), the
//! schedule store and the configuration.  It exposes a hardware-agnostic
//! API; events flow out through an [`EventSink`] injected at call sites,
//! so the whole controller is testable against a simulated clock.
//!
//! ```text
//!  AppCommand ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │        PumpController         │
//!   ClockPort ◀──▶│ store · resolver · programmer │
//!                 │          · recovery           │
//!                 └──────────────────────────────┘
//! ```
//!
//! Every operation takes `&mut self`, so saving, loading and resolving can
//! never interleave.  Interrupt handlers only raise
//! [`PendingEvents`](crate::events::PendingEvents); the main loop calls in.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::adapters::retry::RetryingClock;
use crate::alarm::AlarmProgrammer;
use crate::clock::{Timestamp, TimestampText, add_secs, format_timestamp, local_from_epoch};
use crate::config::ControllerConfig;
use crate::error::{Error, PersistenceError, Result};
use crate::recovery::{PowerFailureRecovery, RecoveryOutcome, RecoveryPolicy};
use crate::schedule::resolver::resolve_with;
use crate::schedule::store::ScheduleStore;
use crate::schedule::{ResolvedAlarm, ScheduleSet};

use super::commands::{AppCommand, CommandReply};
use super::events::AppEvent;
use super::ports::{AlarmChannel, AlarmMatch, ClockPort, EventSink};

/// What the pump should be doing, as read from the alarm flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WateringState {
    Idle,
    /// Start fired (or a manual run is active) and Stop has not.
    Running,
    /// Stop fired; the window is over.
    Finished,
}

/// Result of [`PumpController::startup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub recovery: RecoveryOutcome,
    /// The window armed after recovery, if recovery asked for resolution
    /// and something is scheduled.
    pub next_due: Option<ResolvedAlarm>,
}

// ───────────────────────────────────────────────────────────────
// PumpController
// ───────────────────────────────────────────────────────────────

pub struct PumpController<C: ClockPort, D: DelayNs> {
    clock: RetryingClock<C, D>,
    config: ControllerConfig,
    store: ScheduleStore,
    next_due: Option<ResolvedAlarm>,
    /// Latched by `Error::Degraded`; cleared by the next clean programming.
    degraded: bool,
    /// `WateringStarted` has been emitted for the current window.
    watering: bool,
    /// A manual run is active (only Stop is armed).
    manual_run: bool,
    /// `startup` has been attempted and has not yet succeeded.
    startup_pending: bool,
    /// The last resolve-and-arm failed; `poll` tries again while idle.
    resolve_pending: bool,
}

impl<C: ClockPort, D: DelayNs> PumpController<C, D> {
    /// Wrap `clock` in the retry decorator and build the controller.
    ///
    /// Does **not** touch the clock; call [`startup`](Self::startup) next.
    pub fn new(clock: C, delay: D, config: ControllerConfig) -> Self {
        let clock = RetryingClock::new(
            clock,
            delay,
            config.bus_retry_attempts,
            config.bus_retry_backoff_ms,
        );
        let store = ScheduleStore::new(config.schedule_ram_offset);
        Self {
            clock,
            config,
            store,
            next_due: None,
            degraded: false,
            watering: false,
            manual_run: false,
            startup_pending: false,
            resolve_pending: false,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The underlying clock, for inspection.
    pub fn clock(&self) -> &C {
        self.clock.inner()
    }

    pub fn clock_mut(&mut self) -> &mut C {
        self.clock.inner_mut()
    }

    /// Tear down, handing back the clock and delay (e.g. across a reboot).
    pub fn into_parts(self) -> (C, D) {
        self.clock.into_parts()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot sequence: recover from any outage, then arm the next window
    /// unless recovery left a makeup or running window in place.
    ///
    /// On failure the sequence stays pending and [`poll`](Self::poll)
    /// re-runs it until it succeeds.
    pub fn startup(&mut self, sink: &mut impl EventSink) -> Result<StartupReport> {
        self.startup_pending = true;
        let recovery = self.check_and_recover(sink)?;
        let next_due = if recovery.needs_resolution() {
            self.resolve_and_arm_next(sink)?
        } else {
            None
        };
        self.startup_pending = false;
        info!("PumpController: started, recovery={:?}", recovery);
        Ok(StartupReport { recovery, next_due })
    }

    /// One cooperative main-loop step.  Reads the alarm flags, reports
    /// watering transitions and arms the next window once one finishes.
    pub fn poll(&mut self, sink: &mut impl EventSink) -> Result<WateringState> {
        if self.startup_pending {
            info!("PumpController: retrying startup");
            self.startup(sink)?;
        }

        let state = self.watering_state();
        let state = self.report(state, sink)?;

        match state {
            WateringState::Running => {
                if !self.watering {
                    self.watering = true;
                    info!("PumpController: watering started");
                    sink.emit(&AppEvent::WateringStarted);
                }
                let checked = self.ensure_stop_reachable();
                self.report(checked, sink)?;
            }
            WateringState::Finished => {
                self.watering = false;
                self.manual_run = false;
                info!("PumpController: watering finished");
                sink.emit(&AppEvent::WateringFinished);
                self.resolve_and_arm_next(sink)?;
            }
            WateringState::Idle => {
                self.watering = false;
                if self.resolve_pending {
                    info!("PumpController: retrying resolve-and-arm");
                    self.resolve_and_arm_next(sink)?;
                }
            }
        }
        Ok(state)
    }

    // ── Schedules ─────────────────────────────────────────────

    /// Persist `set`.  Does not re-arm; see [`AppCommand::SetSchedules`].
    pub fn set_schedules(&mut self, set: &ScheduleSet) -> Result<()> {
        self.store.save(&mut self.clock, set)?;
        info!(
            "PumpController: stored {} schedules ({} active)",
            set.len(),
            set.active_count()
        );
        Ok(())
    }

    pub fn get_schedules(&mut self) -> Result<ScheduleSet> {
        self.store.load(&mut self.clock)
    }

    /// Load the schedules, find the next window and arm it.
    ///
    /// A never-written store counts as empty.  With nothing to arm, both
    /// channels are cleared and `Ok(None)` is returned.
    pub fn resolve_and_arm_next(
        &mut self,
        sink: &mut impl EventSink,
    ) -> Result<Option<ResolvedAlarm>> {
        let result = self.arm_next();
        self.resolve_pending = result.is_err();
        let armed = self.report(result, sink)?;
        match armed {
            Some(alarm) => sink.emit(&AppEvent::AlarmArmed(alarm)),
            None => sink.emit(&AppEvent::NothingScheduled),
        }
        Ok(armed)
    }

    fn arm_next(&mut self) -> Result<Option<ResolvedAlarm>> {
        let set = self.load_or_empty()?;
        let now = self.clock.now()?;
        let resolved = resolve_with(now, &set, |t| self.clock.weekday(t));

        let mut programmer = AlarmProgrammer::new(&mut self.clock);
        match resolved {
            Some(alarm) => {
                programmer.program(&alarm)?;
                info!(
                    "PumpController: next watering slot {} at {} for {}s",
                    alarm.slot,
                    format_timestamp(alarm.start),
                    alarm.duration_secs
                );
            }
            None => {
                programmer.clear_all()?;
                info!("PumpController: nothing scheduled");
            }
        }
        self.next_due = resolved;
        self.manual_run = false;
        self.degraded = false;
        Ok(resolved)
    }

    fn load_or_empty(&mut self) -> Result<ScheduleSet> {
        match self.store.load(&mut self.clock) {
            Err(Error::Persistence(PersistenceError::Uninitialized)) => {
                info!("PumpController: no stored schedules, treating as empty");
                Ok(ScheduleSet::new())
            }
            other => other,
        }
    }

    // ── Manual run ────────────────────────────────────────────

    /// Run the pump from now for `duration_secs`.  Returns the stop time.
    pub fn arm_manual_run(
        &mut self,
        duration_secs: u32,
        sink: &mut impl EventSink,
    ) -> Result<Timestamp> {
        let result = self.manual(duration_secs);
        let stop_at = self.report(result, sink)?;
        sink.emit(&AppEvent::ManualRunArmed { stop_at });
        Ok(stop_at)
    }

    fn manual(&mut self, duration_secs: u32) -> Result<Timestamp> {
        if duration_secs > self.config.max_manual_run_secs {
            return Err(Error::InvalidRequest("manual run exceeds max_manual_run_secs"));
        }
        let now = self.clock.now()?;
        let stop_at = AlarmProgrammer::new(&mut self.clock).manual_override(now, duration_secs)?;
        self.next_due = None;
        self.manual_run = true;
        self.degraded = false;
        Ok(stop_at)
    }

    // ── Recovery ──────────────────────────────────────────────

    pub fn check_and_recover(&mut self, sink: &mut impl EventSink) -> Result<RecoveryOutcome> {
        let policy = RecoveryPolicy::from(&self.config);
        let result = PowerFailureRecovery::new(&mut self.clock, policy).run();
        let outcome = self.report(result, sink)?;
        if let RecoveryOutcome::Resumed(_) | RecoveryOutcome::Replayed(_) = outcome {
            self.next_due = None;
            self.degraded = false;
        }
        sink.emit(&AppEvent::RecoveryCompleted(outcome));
        Ok(outcome)
    }

    // ── Queries ───────────────────────────────────────────────

    /// Whether `channel` has fired.  A bus failure reads as `false`.
    pub fn currently_triggered(&mut self, channel: AlarmChannel) -> bool {
        match self.clock.is_triggered(channel) {
            Ok(t) => t,
            Err(e) => {
                warn!("PumpController: reading {:?} flag failed: {}", channel, e);
                false
            }
        }
    }

    pub fn current_timestamp_text(&mut self) -> Result<TimestampText> {
        Ok(format_timestamp(self.clock.now()?))
    }

    /// The scheduled window last armed, if any.
    pub fn next_due(&self) -> Option<ResolvedAlarm> {
        self.next_due
    }

    /// Start and Stop times currently held by the alarm registers.
    pub fn armed_times(&mut self) -> Result<(Timestamp, Timestamp)> {
        let start = self.clock.read_armed_time(AlarmChannel::Start)?;
        let stop = self.clock.read_armed_time(AlarmChannel::Stop)?;
        Ok((start, stop))
    }

    pub fn watering_state(&mut self) -> Result<WateringState> {
        let start = self.clock.is_triggered(AlarmChannel::Start)?;
        let stop = self.clock.is_triggered(AlarmChannel::Stop)?;
        Ok(match (start, stop) {
            (_, true) => WateringState::Finished,
            (true, false) => WateringState::Running,
            (false, false) if self.manual_run => WateringState::Running,
            (false, false) => WateringState::Idle,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    // ── Time ──────────────────────────────────────────────────

    /// Set the clock from a UTC epoch, shifted to local wall-clock time.
    pub fn sync_time(&mut self, utc_epoch_secs: i64) -> Result<Timestamp> {
        let local = local_from_epoch(utc_epoch_secs, self.config.utc_offset_minutes)
            .ok_or(Error::InvalidRequest("epoch out of range"))?;
        self.clock.adjust(local)?;
        info!("PumpController: clock set to {}", format_timestamp(local));
        Ok(local)
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn handle_command(
        &mut self,
        command: AppCommand,
        sink: &mut impl EventSink,
    ) -> CommandReply {
        let reply = match command {
            AppCommand::SetSchedules(set) => {
                let saved = self.set_schedules(&set);
                self.report(saved, sink)
                    .and_then(|()| self.resolve_and_arm_next(sink))
                    .map(CommandReply::Armed)
            }
            AppCommand::GetSchedules => {
                let loaded = self.get_schedules();
                self.report(loaded, sink).map(CommandReply::Schedules)
            }
            AppCommand::ArmNext => self.resolve_and_arm_next(sink).map(CommandReply::Armed),
            AppCommand::ManualRun { duration_secs } => self
                .arm_manual_run(duration_secs, sink)
                .map(|stop_at| CommandReply::ManualRun { stop_at }),
            AppCommand::Recover => self.check_and_recover(sink).map(CommandReply::Recovered),
            AppCommand::SyncTime { utc_epoch_secs } => self.sync_and_rearm(utc_epoch_secs, sink),
        };
        reply.unwrap_or_else(CommandReply::Failed)
    }

    /// A clock jump can step over an armed alarm, which would then never
    /// match.  Idle re-resolves; a running window keeps its Start but gets
    /// a reachable Stop.
    fn sync_and_rearm(
        &mut self,
        utc_epoch_secs: i64,
        sink: &mut impl EventSink,
    ) -> Result<CommandReply> {
        let synced = self.sync_time(utc_epoch_secs);
        let local = self.report(synced, sink)?;
        sink.emit(&AppEvent::TimeSynced(local));

        let state = self.watering_state();
        match self.report(state, sink)? {
            WateringState::Idle => {
                self.resolve_and_arm_next(sink)?;
            }
            WateringState::Running => {
                let checked = self.ensure_stop_reachable();
                self.report(checked, sink)?;
            }
            WateringState::Finished => {}
        }
        Ok(CommandReply::TimeSet(local))
    }

    /// While running, a Stop at or before now can never match.  Move it to
    /// one grace delay from now so the pump still turns off.
    fn ensure_stop_reachable(&mut self) -> Result<()> {
        let now = self.clock.now()?;
        let stop = self.clock.read_armed_time(AlarmChannel::Stop)?;
        if stop > now {
            return Ok(());
        }
        let new_stop = add_secs(now, self.config.grace_delay_secs)?;
        warn!(
            "PumpController: Stop at {} already passed, re-arming for {}",
            format_timestamp(stop),
            format_timestamp(new_stop)
        );
        self.clock
            .arm_alarm(AlarmChannel::Stop, new_stop, AlarmMatch::FullDateTime)
            .map_err(|cause| Error::AlarmProgramming {
                channel: AlarmChannel::Stop,
                cause,
            })
    }

    // ── Internal helpers ──────────────────────────────────────

    /// Emit `Fault` for an error and latch the degraded flag.
    fn report<T>(&mut self, result: Result<T>, sink: &mut impl EventSink) -> Result<T> {
        if let Err(e) = &result {
            if e.is_degraded() {
                if !self.degraded {
                    error!("PumpController: {}", e);
                }
                self.degraded = true;
            } else {
                warn!("PumpController: {}", e);
            }
            sink.emit(&AppEvent::Fault(*e));
        }
        result
    }
}
