//! Power-failure recovery.
//!
//! The RTC keeps time and fires its alarm comparators on battery, but the
//! pump is dead while main power is off.  On boot the triggered flags and
//! the latched power-down / power-up stamps tell us what the outage cost,
//! and the missed watering is made up with a fresh window.
//!
//! ```text
//!                 Start fired?
//!                  │ no ─────────────────────────────▶ NothingMissed
//!                  │ yes
//!             power failed?
//!                  │ no ── Stop fired? ─ no ─────────▶ InProgress
//!                  │                    └ yes ───────▶ NothingMissed
//!                  │ yes
//!        outage > threshold? ─ yes ─ clear both ─────▶ Abandoned
//!                  │ no
//!             Stop fired?
//!                  │ no ── extend running window ────▶ Resumed
//!                  │ yes ─ replay missed part ───────▶ Replayed
//! ```
//!
//! Every delta is computed with [`checked_span`], so timestamps that come
//! back out of order surface as [`ClockError::Skew`] instead of arming an
//! alarm in the past.

use log::{info, warn};

use crate::alarm::AlarmProgrammer;
use crate::app::ports::{AlarmChannel, ClockError, ClockPort, PowerEvent};
use crate::clock::{Timestamp, add_secs, checked_span, format_timestamp, truncate_to_minute};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};

/// Tunables for recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Added to every re-armed alarm so it lands safely in the future.
    pub grace_delay_secs: u32,
    /// Outages longer than this are not made up.
    pub outage_threshold_secs: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for RecoveryPolicy {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            grace_delay_secs: cfg.grace_delay_secs,
            outage_threshold_secs: cfg.outage_threshold_secs,
        }
    }
}

/// A re-armed makeup window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensation {
    /// Watering time owed because of the outage.
    pub compensation_secs: u32,
    pub start: Timestamp,
    pub stop: Timestamp,
}

/// What recovery decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No window was interrupted.
    NothingMissed,
    /// A window is running and no outage was latched; alarms untouched.
    InProgress,
    /// The outage cut a running window short; it was extended.
    Resumed(Compensation),
    /// The whole (or remaining) window fell inside the outage; it was replayed.
    Replayed(Compensation),
    /// The outage exceeded the threshold; both channels were cleared.
    Abandoned { outage_secs: u32 },
}

impl RecoveryOutcome {
    /// Whether the caller should resolve and arm the next scheduled window.
    pub const fn needs_resolution(&self) -> bool {
        matches!(self, Self::NothingMissed | Self::Abandoned { .. })
    }
}

/// Alarm and power state read back from the clock after an outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutageSnapshot {
    pub armed_start: Timestamp,
    pub armed_stop: Timestamp,
    pub power: PowerEvent,
}

/// Decide how to recover from a latched power failure with Start fired.
///
/// Pure; [`PowerFailureRecovery::run`] applies the result.
pub fn plan(
    snapshot: &OutageSnapshot,
    now: Timestamp,
    stop_fired: bool,
    policy: &RecoveryPolicy,
) -> Result<RecoveryOutcome> {
    let OutageSnapshot {
        armed_start: start,
        armed_stop: stop,
        power: PowerEvent {
            power_down: down,
            power_up: up,
        },
    } = *snapshot;
    let grace = policy.grace_delay_secs;
    // The power stamps carry no seconds; compare the window at the same
    // resolution.
    let start_minute = truncate_to_minute(start);
    let stop_minute = truncate_to_minute(stop);

    let outage_secs = checked_span(up, down)?;
    if outage_secs > policy.outage_threshold_secs {
        return Ok(RecoveryOutcome::Abandoned { outage_secs });
    }

    let new_start = add_secs(now, grace)?;

    if !stop_fired {
        // Pump was due to be running.  If it had not started yet when power
        // went, it owes the time from its start to power-up; if it was
        // already running, it owes the whole outage.
        let compensation_secs = if start_minute > down {
            checked_span(up, start_minute)?
        } else {
            outage_secs
        };
        let new_stop = add_secs(add_secs(stop, compensation_secs)?, grace)?;
        if new_stop <= new_start {
            return Ok(RecoveryOutcome::NothingMissed);
        }
        return Ok(RecoveryOutcome::Resumed(Compensation {
            compensation_secs,
            start: new_start,
            stop: new_stop,
        }));
    }

    let mut compensation_secs = checked_span(stop, start)?;
    if start_minute < down {
        if stop_minute <= down {
            // Window finished before the outage.
            return Ok(RecoveryOutcome::NothingMissed);
        }
        compensation_secs = checked_span(stop, down)?;
    }
    if compensation_secs == 0 {
        return Ok(RecoveryOutcome::NothingMissed);
    }
    Ok(RecoveryOutcome::Replayed(Compensation {
        compensation_secs,
        start: new_start,
        stop: add_secs(new_start, compensation_secs)?,
    }))
}

/// Boot-time recovery against a live clock.
pub struct PowerFailureRecovery<'a, C: ClockPort + ?Sized> {
    clock: &'a mut C,
    policy: RecoveryPolicy,
}

impl<'a, C: ClockPort + ?Sized> PowerFailureRecovery<'a, C> {
    pub fn new(clock: &'a mut C, policy: RecoveryPolicy) -> Self {
        Self { clock, policy }
    }

    /// Inspect the clock, apply the makeup window if one is owed, and
    /// re-arm the power-fail latch.
    ///
    /// The latch is only cleared once handling succeeded, so a failed
    /// attempt is retried on the next call.
    pub fn run(&mut self) -> Result<RecoveryOutcome> {
        let start_fired = self.clock.is_triggered(AlarmChannel::Start)?;
        let stop_fired = self.clock.is_triggered(AlarmChannel::Stop)?;
        let power_failed = self.clock.power_failed()?;

        let outcome = match (start_fired, power_failed) {
            (false, _) => {
                if stop_fired {
                    warn!("Recovery: Stop flag set without Start, ignoring");
                }
                RecoveryOutcome::NothingMissed
            }
            (true, false) if stop_fired => RecoveryOutcome::NothingMissed,
            (true, false) => RecoveryOutcome::InProgress,
            (true, true) => self.recover_outage(stop_fired)?,
        };

        if power_failed {
            self.clock.clear_power_failure()?;
        }
        Ok(outcome)
    }

    fn recover_outage(&mut self, stop_fired: bool) -> Result<RecoveryOutcome> {
        let snapshot = OutageSnapshot {
            armed_start: self.clock.read_armed_time(AlarmChannel::Start)?,
            armed_stop: self.clock.read_armed_time(AlarmChannel::Stop)?,
            power: PowerEvent {
                power_down: self.clock.last_power_down()?,
                power_up: self.clock.last_power_up()?,
            },
        };
        let now = self.clock.now()?;
        info!(
            "Recovery: power lost {} restored {}",
            format_timestamp(snapshot.power.power_down),
            format_timestamp(snapshot.power.power_up)
        );

        let outcome = plan(&snapshot, now, stop_fired, &self.policy).inspect_err(|e| {
            if matches!(e, Error::Clock(ClockError::Skew)) {
                warn!("Recovery: clock timestamps out of order");
            }
        })?;

        let mut programmer = AlarmProgrammer::new(&mut *self.clock);
        match outcome {
            RecoveryOutcome::Resumed(c) | RecoveryOutcome::Replayed(c) => {
                info!(
                    "Recovery: compensating {}s, {} -> {}",
                    c.compensation_secs,
                    format_timestamp(c.start),
                    format_timestamp(c.stop)
                );
                programmer.program_window(c.start, c.stop)?;
            }
            RecoveryOutcome::Abandoned { outage_secs } => {
                warn!(
                    "Recovery: outage of {}s exceeds {}s, skipping makeup run",
                    outage_secs, self.policy.outage_threshold_secs
                );
                programmer.clear_all()?;
            }
            RecoveryOutcome::NothingMissed | RecoveryOutcome::InProgress => {}
        }
        Ok(outcome)
    }
}
