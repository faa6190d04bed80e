//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production, stderr on the host).
//! A status-topic publisher would implement the same trait.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::clock::format_timestamp;
use crate::recovery::RecoveryOutcome;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::AlarmArmed(a) => {
                info!(
                    "ARMED | slot={} | {} -> {} ({}s)",
                    a.slot,
                    format_timestamp(a.start),
                    format_timestamp(a.stop()),
                    a.duration_secs
                );
            }
            AppEvent::NothingScheduled => {
                info!("ARMED | nothing scheduled, alarms cleared");
            }
            AppEvent::ManualRunArmed { stop_at } => {
                info!("MANUAL | running until {}", format_timestamp(*stop_at));
            }
            AppEvent::RecoveryCompleted(outcome) => match outcome {
                RecoveryOutcome::Resumed(c) | RecoveryOutcome::Replayed(c) => {
                    info!(
                        "RECOVERY | {:?} | +{}s | {} -> {}",
                        outcome,
                        c.compensation_secs,
                        format_timestamp(c.start),
                        format_timestamp(c.stop)
                    );
                }
                RecoveryOutcome::Abandoned { outage_secs } => {
                    warn!("RECOVERY | abandoned, outage={}s", outage_secs);
                }
                RecoveryOutcome::NothingMissed | RecoveryOutcome::InProgress => {
                    info!("RECOVERY | {:?}", outcome);
                }
            },
            AppEvent::TimeSynced(t) => {
                info!("TIME | set to {}", format_timestamp(*t));
            }
            AppEvent::WateringStarted => {
                info!("PUMP | on");
            }
            AppEvent::WateringFinished => {
                info!("PUMP | off");
            }
            AppEvent::Fault(e) if e.is_degraded() => {
                error!("FAULT | {}", e);
            }
            AppEvent::Fault(e) => {
                warn!("FAULT | {}", e);
            }
        }
    }
}
