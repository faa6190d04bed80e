//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the controller that ties schedule storage,
//! next-alarm resolution, alarm programming and power-failure recovery
//! together.  All interaction with hardware happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without a real
//! RTC.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
