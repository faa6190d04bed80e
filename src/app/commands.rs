//! Inbound commands to the controller.
//!
//! These represent actions requested by the outside world (serial console,
//! a network command handler, a local button) that the
//! [`PumpController`](super::service::PumpController) interprets and acts
//! upon.  On the wire they are JSON objects tagged by `"cmd"`:
//!
//! ```json
//! {"cmd":"manual_run","duration_secs":600}
//! {"cmd":"set_schedules","entries":[{"hour":6,"minute":0,"duration_secs":300,"days_of_week":127,"enabled":true}]}
//! ```

use serde::Deserialize;

use crate::clock::Timestamp;
use crate::error::Error;
use crate::recovery::RecoveryOutcome;
use crate::schedule::{ResolvedAlarm, ScheduleSet};

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AppCommand {
    /// Replace the stored schedules and arm the next window.
    SetSchedules(ScheduleSet),

    /// Read back the stored schedules.
    GetSchedules,

    /// Resolve and arm the next scheduled window.
    ArmNext,

    /// Run the pump now for `duration_secs`, outside the schedule.
    ManualRun { duration_secs: u32 },

    /// Run power-failure recovery on demand.
    Recover,

    /// Set the clock from a UTC epoch (e.g. NTP).
    SyncTime { utc_epoch_secs: i64 },
}

impl AppCommand {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|_| Error::InvalidRequest("malformed command"))
    }
}

/// Result of [`handle_command`](super::service::PumpController::handle_command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Schedules(ScheduleSet),
    /// `None` when nothing is scheduled.
    Armed(Option<ResolvedAlarm>),
    ManualRun { stop_at: Timestamp },
    Recovered(RecoveryOutcome),
    TimeSet(Timestamp),
    Failed(Error),
}
