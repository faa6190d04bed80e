//! Outbound application events.
//!
//! The [`PumpController`](super::service::PumpController) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them: log to serial, publish a status
//! topic, drive an indicator.

use crate::clock::Timestamp;
use crate::error::Error;
use crate::recovery::RecoveryOutcome;
use crate::schedule::ResolvedAlarm;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The next scheduled window was written to the alarm pair.
    AlarmArmed(ResolvedAlarm),

    /// No enabled schedule can ever fire; both alarms were cleared.
    NothingScheduled,

    /// A manual run started; the pump stops at `stop_at`.
    ManualRunArmed { stop_at: Timestamp },

    /// Boot-time or on-demand recovery finished.
    RecoveryCompleted(RecoveryOutcome),

    /// The clock was set from an external time source.
    TimeSynced(Timestamp),

    /// The Start alarm fired; the pump should be on.
    WateringStarted,

    /// The Stop alarm fired; the pump should be off.
    WateringFinished,

    /// An operation failed.  [`Error::Degraded`] needs a human.
    Fault(Error),
}
