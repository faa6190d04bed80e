//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PumpController (domain)
//! ```
//!
//! Driven adapters (the RTC peripheral, event sinks) implement these traits.
//! The [`PumpController`](super::service::PumpController) and the components
//! it drives receive them by injection, so the domain core never touches a
//! bus or a global RTC instance directly.
//!
//! ## Bus contract
//!
//! - Every [`ClockPort`] call except [`ClockPort::weekday`] is a blocking,
//!   synchronous bus transaction and may fail with [`ClockError::Bus`].
//! - Retrying is not the adapter's job; wrap the adapter in
//!   [`RetryingClock`](crate::adapters::retry::RetryingClock).
//! - Implementations must never be called from interrupt context.

use chrono::Datelike;

use crate::clock::Timestamp;

// ───────────────────────────────────────────────────────────────
// Alarm channel identifiers
// ───────────────────────────────────────────────────────────────

/// The two hardware alarm comparators on the RTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmChannel {
    /// Alarm 0, pump on.
    Start,
    /// Alarm 1, pump off.
    Stop,
}

impl AlarmChannel {
    pub const BOTH: [AlarmChannel; 2] = [AlarmChannel::Start, AlarmChannel::Stop];

    /// Hardware alarm index (0 or 1).
    pub const fn index(self) -> usize {
        match self {
            Self::Start => 0,
            Self::Stop => 1,
        }
    }
}

/// Which date/time fields the RTC compares when deciding an alarm matched.
///
/// Mirrors the MCP7940 `ALMxMSK` field.  The scheduler always arms with
/// [`AlarmMatch::FullDateTime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMatch {
    Seconds,
    Minutes,
    Hours,
    Weekday,
    Date,
    /// Seconds, minutes, hours, weekday, date and month all match.
    FullDateTime,
}

impl AlarmMatch {
    /// Encoded `ALMxMSK` value (bits 6:4 of `ALMxWKDAY`, unshifted).
    pub const fn mask_bits(self) -> u8 {
        match self {
            Self::Seconds => 0b000,
            Self::Minutes => 0b001,
            Self::Hours => 0b010,
            Self::Weekday => 0b011,
            Self::Date => 0b100,
            Self::FullDateTime => 0b111,
        }
    }
}

/// Timestamps the RTC latched at the last power loss and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerEvent {
    pub power_down: Timestamp,
    pub power_up: Timestamp,
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain ↔ RTC peripheral)
// ───────────────────────────────────────────────────────────────

/// Bytes of battery-backed SRAM a clock exposes through [`ClockPort`].
pub const CLOCK_RAM_LEN: usize = 64;

/// Capability over the battery-backed real-time clock.
///
/// Provides wall-clock time, two independently armed alarm channels with
/// triggered flags, a small battery-backed SRAM, and the power-fail
/// timestamps the device records on its own.
pub trait ClockPort {
    /// Current wall-clock time.
    fn now(&mut self) -> Result<Timestamp, ClockError>;

    /// Set the wall-clock time.
    fn adjust(&mut self, time: Timestamp) -> Result<(), ClockError>;

    /// Write the alarm time and match mode for `channel`, then enable it.
    fn arm_alarm(
        &mut self,
        channel: AlarmChannel,
        time: Timestamp,
        matching: AlarmMatch,
    ) -> Result<(), ClockError>;

    /// Clear the triggered (interrupt) flag of `channel`.
    fn clear_alarm(&mut self, channel: AlarmChannel) -> Result<(), ClockError>;

    /// Enable or disable `channel` without touching its stored time.
    fn set_alarm_enabled(&mut self, channel: AlarmChannel, enabled: bool)
    -> Result<(), ClockError>;

    /// Whether `channel` has matched since its flag was last cleared.
    fn is_triggered(&mut self, channel: AlarmChannel) -> Result<bool, ClockError>;

    /// The time currently stored in `channel`'s alarm registers.
    fn read_armed_time(&mut self, channel: AlarmChannel) -> Result<Timestamp, ClockError>;

    /// Read `buf.len()` bytes of battery-backed SRAM starting at `offset`.
    fn read_ram(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), ClockError>;

    /// Write `data` into battery-backed SRAM starting at `offset`.
    fn write_ram(&mut self, offset: u8, data: &[u8]) -> Result<(), ClockError>;

    /// Whether a power failure was latched since the last
    /// [`clear_power_failure`](Self::clear_power_failure).
    fn power_failed(&mut self) -> Result<bool, ClockError>;

    /// Acknowledge the latched power failure so the next one is recorded.
    fn clear_power_failure(&mut self) -> Result<(), ClockError>;

    /// Time main power was lost.
    fn last_power_down(&mut self) -> Result<Timestamp, ClockError>;

    /// Time main power was restored.
    fn last_power_up(&mut self) -> Result<Timestamp, ClockError>;

    /// The clock's native weekday index for `time`: Monday = 1 … Sunday = 7.
    ///
    /// Callers map this into the Sunday-origin schedule mask with
    /// [`day_bit`](crate::clock::day_bit).
    fn weekday(&self, time: Timestamp) -> u8 {
        time.weekday().number_from_monday() as u8
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT
/// status topic, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ClockPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The I2C transaction failed (NACK, arbitration loss, timeout).
    /// The only transient variant; `RetryingClock` retries it.
    Bus,
    /// Registers held a value that does not decode to a valid date/time.
    InvalidData,
    /// Offset, length or time value outside what the device can hold.
    OutOfRange,
    /// Two timestamps that must be ordered are not.
    Skew,
}

impl ClockError {
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Bus)
    }
}

impl core::fmt::Display for ClockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "bus transaction failed"),
            Self::InvalidData => write!(f, "invalid register data"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::Skew => write!(f, "timestamps out of order"),
        }
    }
}
