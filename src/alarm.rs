//! Two-channel alarm programming with rollback.
//!
//! The RTC's two alarm comparators are used as a pair: alarm 0 switches the
//! pump on, alarm 1 switches it off.  Arming is never left half-done.
//!
//! ```text
//!   clear both ──▶ arm Start ──▶ arm Stop ──▶ Ok
//!                      │             │
//!                      └──── fail ───┴──▶ disable + clear Start ──▶ AlarmProgramming
//!                                                   │
//!                                                   └─ fail ──▶ Degraded
//! ```

use log::{debug, error, info, warn};

use crate::app::ports::{AlarmChannel, AlarmMatch, ClockError, ClockPort};
use crate::clock::{Timestamp, add_secs, format_timestamp};
use crate::error::{Error, Result};
use crate::schedule::ResolvedAlarm;

/// Writes watering windows into the clock's alarm channels.
pub struct AlarmProgrammer<'a, C: ClockPort + ?Sized> {
    clock: &'a mut C,
}

impl<'a, C: ClockPort + ?Sized> AlarmProgrammer<'a, C> {
    pub fn new(clock: &'a mut C) -> Self {
        Self { clock }
    }

    /// Arm Start at `alarm.start` and Stop at `alarm.stop()`.
    pub fn program(&mut self, alarm: &ResolvedAlarm) -> Result<()> {
        self.program_window(alarm.start, alarm.stop())
    }

    /// Arm the pair for an arbitrary window.
    ///
    /// On success both channels hold the new times with cleared flags.  On
    /// failure neither is left enabled, unless the rollback itself failed,
    /// in which case [`Error::Degraded`] is returned.
    pub fn program_window(&mut self, start: Timestamp, stop: Timestamp) -> Result<()> {
        if stop <= start {
            return Err(Error::InvalidRequest("stop must be after start"));
        }

        self.clear_all()?;

        if let Err(cause) = self
            .clock
            .arm_alarm(AlarmChannel::Start, start, AlarmMatch::FullDateTime)
        {
            return Err(self.roll_back(AlarmChannel::Start, cause));
        }
        if let Err(cause) = self
            .clock
            .arm_alarm(AlarmChannel::Stop, stop, AlarmMatch::FullDateTime)
        {
            return Err(self.roll_back(AlarmChannel::Stop, cause));
        }

        info!(
            "AlarmProgrammer: armed {} -> {}",
            format_timestamp(start),
            format_timestamp(stop)
        );
        Ok(())
    }

    /// Disable both channels and clear their triggered flags.
    ///
    /// Both channels are attempted even if the first fails; the first error
    /// is returned.
    pub fn clear_all(&mut self) -> Result<()> {
        let mut first: Option<ClockError> = None;
        for channel in AlarmChannel::BOTH {
            if let Err(e) = self.disarm(channel) {
                warn!("AlarmProgrammer: clearing {:?} failed: {}", channel, e);
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(Error::Clock(e)),
            None => Ok(()),
        }
    }

    /// Run the pump from now for `duration_secs`, outside the schedule.
    ///
    /// Both channels are cleared so no pending scheduled Start survives;
    /// only Stop is armed.  Returns the Stop time.
    pub fn manual_override(&mut self, now: Timestamp, duration_secs: u32) -> Result<Timestamp> {
        if duration_secs == 0 {
            return Err(Error::InvalidRequest("manual run duration must be > 0"));
        }
        let stop = add_secs(now, duration_secs)?;

        self.clear_all()?;
        self.clock
            .arm_alarm(AlarmChannel::Stop, stop, AlarmMatch::FullDateTime)
            .map_err(|cause| Error::AlarmProgramming {
                channel: AlarmChannel::Stop,
                cause,
            })?;

        info!(
            "AlarmProgrammer: manual run until {}",
            format_timestamp(stop)
        );
        Ok(stop)
    }

    fn disarm(&mut self, channel: AlarmChannel) -> core::result::Result<(), ClockError> {
        self.clock.set_alarm_enabled(channel, false)?;
        self.clock.clear_alarm(channel)
    }

    fn roll_back(&mut self, channel: AlarmChannel, cause: ClockError) -> Error {
        warn!(
            "AlarmProgrammer: arming {:?} failed ({}), rolling back",
            channel, cause
        );
        match self.disarm(AlarmChannel::Start) {
            Ok(()) => {
                debug!("AlarmProgrammer: rollback complete");
                Error::AlarmProgramming { channel, cause }
            }
            Err(rollback) => {
                error!(
                    "AlarmProgrammer: rollback failed ({}), alarm state unknown",
                    rollback
                );
                Error::Degraded {
                    channel,
                    cause,
                    rollback,
                }
            }
        }
    }
}
