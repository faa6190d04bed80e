//! Unified error types for the pump scheduler.
//!
//! A single `Error` enum that every component converts into, keeping the
//! main loop's error handling uniform.  All variants are `Copy` so they can
//! be carried in events and command replies without allocation.
//!
//! Nothing here is fatal: the main loop logs the error and tries again on
//! its next poll.

use core::fmt;

use crate::app::ports::{AlarmChannel, ClockError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Talking to the RTC failed after retries, or it returned data that
    /// does not make sense (including out-of-order timestamps).
    Clock(ClockError),
    /// The schedule block could not be written or read back.
    Persistence(PersistenceError),
    /// Arming `channel` failed; the other channel was rolled back, so
    /// neither alarm is armed.
    AlarmProgramming {
        channel: AlarmChannel,
        cause: ClockError,
    },
    /// Arming `channel` failed *and* the rollback of the Start alarm failed.
    /// The alarm state is unknown and needs manual intervention.
    Degraded {
        channel: AlarmChannel,
        cause: ClockError,
        rollback: ClockError,
    },
    /// The caller asked for something that cannot be armed or stored.
    InvalidRequest(&'static str),
}

impl Error {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock(e) => write!(f, "clock: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::AlarmProgramming { channel, cause } => {
                write!(f, "arming {channel:?} failed ({cause}), rolled back")
            }
            Self::Degraded {
                channel,
                cause,
                rollback,
            } => write!(
                f,
                "arming {channel:?} failed ({cause}) and rollback failed ({rollback}): \
                 manual intervention needed"
            ),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// The RAM transfer itself failed.
    Clock(ClockError),
    /// No schedule block has ever been written (magic/version mismatch).
    Uninitialized,
    /// A block is present but fails its check byte or field validation.
    Corrupted(&'static str),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock(e) => write!(f, "RAM transfer failed: {e}"),
            Self::Uninitialized => write!(f, "schedule block not initialised"),
            Self::Corrupted(why) => write!(f, "schedule block corrupted: {why}"),
        }
    }
}

impl From<ClockError> for PersistenceError {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
