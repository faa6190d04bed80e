//! Controller configuration parameters
//!
//! All tunable parameters for the pump scheduler.  Defaults match the
//! field-deployed controller; a JSON document can override any subset.

use serde::{Deserialize, Serialize};

use crate::clock::SECS_PER_HOUR;

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // --- Recovery ---
    /// Delay added to every re-armed alarm after a power event (seconds)
    pub grace_delay_secs: u32,
    /// Outages longer than this are not made up (seconds)
    pub outage_threshold_secs: u32,

    // --- Persistence ---
    /// Offset of the schedule block inside the clock's SRAM
    pub schedule_ram_offset: u8,

    // --- Bus ---
    /// Total attempts per clock transaction (1 = no retry)
    pub bus_retry_attempts: u8,
    /// Backoff before the first retry; doubles after each failure (ms)
    pub bus_retry_backoff_ms: u32,

    // --- Time ---
    /// Local wall-clock offset from UTC applied by `sync_time` (minutes)
    pub utc_offset_minutes: i16,

    // --- Timing ---
    /// Main-loop poll period (milliseconds)
    pub poll_interval_ms: u32,
    /// Longest manual run accepted (seconds)
    pub max_manual_run_secs: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // Recovery
            grace_delay_secs: 2,
            outage_threshold_secs: 2 * SECS_PER_HOUR,

            // Persistence
            schedule_ram_offset: 0,

            // Bus
            bus_retry_attempts: 3,
            bus_retry_backoff_ms: 5,

            // Time
            utc_offset_minutes: 330, // UTC+05:30

            // Timing
            poll_interval_ms: 1000, // 1 Hz
            max_manual_run_secs: SECS_PER_HOUR,
        }
    }
}

/// Errors from loading or validating a [`ControllerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON for this struct.
    Malformed,
    /// A field is outside its accepted range.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed config document"),
            Self::ValidationFailed(msg) => write!(f, "config validation failed: {msg}"),
        }
    }
}

impl ControllerConfig {
    /// Parse a JSON document (missing fields take their defaults) and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|_| ConfigError::Malformed)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_delay_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "grace_delay_secs must be 0–300",
            ));
        }
        if !(60..=7 * 24 * SECS_PER_HOUR).contains(&self.outage_threshold_secs) {
            return Err(ConfigError::ValidationFailed(
                "outage_threshold_secs must be 60–604800",
            ));
        }
        if self.schedule_ram_offset != 0 {
            return Err(ConfigError::ValidationFailed(
                "schedule_ram_offset must be 0 (block fills the whole SRAM)",
            ));
        }
        if !(1..=10).contains(&self.bus_retry_attempts) {
            return Err(ConfigError::ValidationFailed(
                "bus_retry_attempts must be 1–10",
            ));
        }
        if self.bus_retry_backoff_ms > 1000 {
            return Err(ConfigError::ValidationFailed(
                "bus_retry_backoff_ms must be 0–1000",
            ));
        }
        if !(-720..=840).contains(&self.utc_offset_minutes) {
            return Err(ConfigError::ValidationFailed(
                "utc_offset_minutes must be -720–840",
            ));
        }
        if !(100..=60_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be 100–60000",
            ));
        }
        if !(1..=u32::from(u16::MAX)).contains(&self.max_manual_run_secs) {
            return Err(ConfigError::ValidationFailed(
                "max_manual_run_secs must be 1–65535",
            ));
        }
        Ok(())
    }
}
