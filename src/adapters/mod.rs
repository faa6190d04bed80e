//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements | Connects to                         |
//! |-------------|------------|-------------------------------------|
//! | `mcp7940`   | ClockPort  | MCP7940N RTC over embedded-hal I2C  |
//! | `retry`     | ClockPort  | Any ClockPort (bounded retry)       |
//! | `sim_clock` | ClockPort  | In-memory simulation (host only)    |
//! | `log_sink`  | EventSink  | Serial log output                   |

pub mod log_sink;
pub mod mcp7940;
pub mod retry;
#[cfg(not(target_os = "espidf"))]
pub mod sim_clock;
