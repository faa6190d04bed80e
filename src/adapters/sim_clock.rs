//! In-memory clock backend for host runs and tests.
//!
//! Behaves like the MCP7940 as seen through [`ClockPort`]: alarms latch
//! their triggered flag when simulated time passes them (even while "main
//! power" is off), SRAM is 64 bytes, and a power cycle latches the
//! power-fail flag with its two stamps.
//!
//! Every trait call except `weekday` counts as one bus transaction and can
//! be made to fail, which is how tests exercise retry, rollback and the
//! degraded path.
//!
//! Alarms are compared on the full timestamp whatever [`AlarmMatch`] they
//! were armed with.

use log::debug;

use crate::app::ports::{AlarmChannel, AlarmMatch, CLOCK_RAM_LEN, ClockError, ClockPort};
use crate::clock::{Timestamp, add_secs};

/// Observable state of one alarm channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmSlot {
    pub time: Option<Timestamp>,
    pub matching: Option<AlarmMatch>,
    pub enabled: bool,
    pub triggered: bool,
}

pub struct SimClock {
    now: Timestamp,
    alarms: [AlarmSlot; 2],
    ram: [u8; CLOCK_RAM_LEN],
    power_down: Option<Timestamp>,
    power_up: Option<Timestamp>,
    power_failed: bool,

    // Fault injection
    fail_next: u32,
    arm_faults: [bool; 2],
    /// `Some(n)`: the next `n` disables succeed, every later one fails.
    disarm_faults: [Option<u32>; 2],

    ops: u32,
}

impl SimClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now,
            alarms: [AlarmSlot::default(); 2],
            ram: [0; CLOCK_RAM_LEN],
            power_down: None,
            power_up: None,
            power_failed: false,
            fail_next: 0,
            arm_faults: [false; 2],
            disarm_faults: [None; 2],
            ops: 0,
        }
    }

    // ── Time ──────────────────────────────────────────────────

    /// Current simulated time, without a bus transaction.
    pub fn current_time(&self) -> Timestamp {
        self.now
    }

    /// Move time forward, firing every enabled alarm passed on the way.
    pub fn advance_to(&mut self, time: Timestamp) {
        let from = self.now;
        for slot in &mut self.alarms {
            if slot.enabled && slot.time.is_some_and(|at| at > from && at <= time) {
                slot.triggered = true;
            }
        }
        self.now = time;
    }

    pub fn advance_secs(&mut self, secs: u32) {
        if let Ok(t) = add_secs(self.now, secs) {
            self.advance_to(t);
        }
    }

    /// Jump to `time` without evaluating alarms.
    pub fn set_now(&mut self, time: Timestamp) {
        self.now = time;
    }

    /// Latch a power failure with its stamps, as the device does on restore.
    pub fn record_power_cycle(&mut self, down: Timestamp, up: Timestamp) {
        self.power_down = Some(down);
        self.power_up = Some(up);
        self.power_failed = true;
    }

    // ── Fault injection ───────────────────────────────────────

    /// Fail the next `n` bus transactions of any kind.
    pub fn fail_next_bus_calls(&mut self, n: u32) {
        self.fail_next = n;
    }

    /// Make every `arm_alarm` on `channel` fail.
    pub fn fail_arming(&mut self, channel: AlarmChannel, fail: bool) {
        self.arm_faults[channel.index()] = fail;
    }

    /// Make every disable of `channel` fail.
    pub fn fail_disarming(&mut self, channel: AlarmChannel, fail: bool) {
        self.disarm_faults[channel.index()] = fail.then_some(0);
    }

    /// Let `n` more disables of `channel` succeed, then fail the rest.
    pub fn fail_disarming_after(&mut self, channel: AlarmChannel, n: u32) {
        self.disarm_faults[channel.index()] = Some(n);
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn alarm(&self, channel: AlarmChannel) -> AlarmSlot {
        self.alarms[channel.index()]
    }

    /// Set a triggered flag directly (stale flags, impossible states).
    pub fn force_triggered(&mut self, channel: AlarmChannel, triggered: bool) {
        self.alarms[channel.index()].triggered = triggered;
    }

    pub fn ram(&self) -> &[u8; CLOCK_RAM_LEN] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8; CLOCK_RAM_LEN] {
        &mut self.ram
    }

    pub fn power_fail_latched(&self) -> bool {
        self.power_failed
    }

    /// Bus transactions attempted so far, failed ones included.
    pub fn op_count(&self) -> u32 {
        self.ops
    }

    fn bus(&mut self) -> Result<(), ClockError> {
        self.ops += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            debug!("SimClock: injected bus fault ({} left)", self.fail_next);
            return Err(ClockError::Bus);
        }
        Ok(())
    }

    fn ram_range(offset: u8, len: usize) -> Result<core::ops::Range<usize>, ClockError> {
        let start = usize::from(offset);
        let end = start + len;
        if end > CLOCK_RAM_LEN {
            return Err(ClockError::OutOfRange);
        }
        Ok(start..end)
    }
}

impl ClockPort for SimClock {
    fn now(&mut self) -> Result<Timestamp, ClockError> {
        self.bus()?;
        Ok(self.now)
    }

    fn adjust(&mut self, time: Timestamp) -> Result<(), ClockError> {
        self.bus()?;
        self.now = time;
        Ok(())
    }

    fn arm_alarm(
        &mut self,
        channel: AlarmChannel,
        time: Timestamp,
        matching: AlarmMatch,
    ) -> Result<(), ClockError> {
        self.bus()?;
        if self.arm_faults[channel.index()] {
            return Err(ClockError::Bus);
        }
        self.alarms[channel.index()] = AlarmSlot {
            time: Some(time),
            matching: Some(matching),
            enabled: true,
            triggered: false,
        };
        Ok(())
    }

    fn clear_alarm(&mut self, channel: AlarmChannel) -> Result<(), ClockError> {
        self.bus()?;
        self.alarms[channel.index()].triggered = false;
        Ok(())
    }

    fn set_alarm_enabled(
        &mut self,
        channel: AlarmChannel,
        enabled: bool,
    ) -> Result<(), ClockError> {
        self.bus()?;
        if !enabled {
            match &mut self.disarm_faults[channel.index()] {
                Some(0) => return Err(ClockError::Bus),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.alarms[channel.index()].enabled = enabled;
        Ok(())
    }

    fn is_triggered(&mut self, channel: AlarmChannel) -> Result<bool, ClockError> {
        self.bus()?;
        Ok(self.alarms[channel.index()].triggered)
    }

    fn read_armed_time(&mut self, channel: AlarmChannel) -> Result<Timestamp, ClockError> {
        self.bus()?;
        self.alarms[channel.index()]
            .time
            .ok_or(ClockError::InvalidData)
    }

    fn read_ram(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), ClockError> {
        self.bus()?;
        let range = Self::ram_range(offset, buf.len())?;
        buf.copy_from_slice(&self.ram[range]);
        Ok(())
    }

    fn write_ram(&mut self, offset: u8, data: &[u8]) -> Result<(), ClockError> {
        self.bus()?;
        let range = Self::ram_range(offset, data.len())?;
        self.ram[range].copy_from_slice(data);
        Ok(())
    }

    fn power_failed(&mut self) -> Result<bool, ClockError> {
        self.bus()?;
        Ok(self.power_failed)
    }

    fn clear_power_failure(&mut self) -> Result<(), ClockError> {
        self.bus()?;
        self.power_failed = false;
        Ok(())
    }

    fn last_power_down(&mut self) -> Result<Timestamp, ClockError> {
        self.bus()?;
        self.power_down.ok_or(ClockError::InvalidData)
    }

    fn last_power_up(&mut self) -> Result<Timestamp, ClockError> {
        self.bus()?;
        self.power_up.ok_or(ClockError::InvalidData)
    }
}
