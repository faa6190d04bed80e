//! Pump scheduler firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code lives in the binary; the library
//! builds and tests on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod alarm;
pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod recovery;
pub mod schedule;

pub use error::{Error, Result};
