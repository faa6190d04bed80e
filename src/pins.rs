//! GPIO / peripheral pin assignments for the pump controller board.
//!
//! Single source of truth: the binary references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// RTC (MCP7940N) on I2C0
// ---------------------------------------------------------------------------

pub const RTC_SDA_GPIO: i32 = 5;
pub const RTC_SCL_GPIO: i32 = 4;
/// I2C clock; the MCP7940N tops out at 400 kHz.
pub const RTC_I2C_HZ: u32 = 100_000;
/// MCP7940N MFP output: open-drain, pulled up, driven LOW on alarm match.
pub const RTC_MFP_GPIO: i32 = 15;

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

/// Digital output: HIGH switches the pump MOSFET on.
pub const PUMP_MOSFET_GPIO: i32 = 12;
