//! Bounded-retry decorator for any [`ClockPort`].
//!
//! I2C transactions to the RTC occasionally NACK when the bus is shared or
//! noisy.  `RetryingClock` repeats a call that failed with
//! [`ClockError::Bus`], backing off exponentially between attempts.  Every
//! other error is returned at once: re-reading a register that holds
//! garbage will not fix it.
//!
//! ```text
//!  attempt 1 ─ Bus ─▶ wait base ─▶ attempt 2 ─ Bus ─▶ wait 2·base ─▶ attempt 3 ─ Bus ─▶ Err(Bus)
//! ```

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::app::ports::{AlarmChannel, AlarmMatch, ClockError, ClockPort};
use crate::clock::Timestamp;

/// Backoff never grows past this, whatever the attempt count.
const MAX_BACKOFF_MS: u32 = 1_000;

pub struct RetryingClock<C, D> {
    inner: C,
    delay: D,
    attempts: u8,
    base_backoff_ms: u32,
}

impl<C: ClockPort, D: DelayNs> RetryingClock<C, D> {
    /// `attempts` is the total number of tries per call, clamped to at least 1.
    pub fn new(inner: C, delay: D, attempts: u8, base_backoff_ms: u32) -> Self {
        Self {
            inner,
            delay,
            attempts: attempts.max(1),
            base_backoff_ms,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_parts(self) -> (C, D) {
        (self.inner, self.delay)
    }

    fn retry<T>(
        &mut self,
        op: &'static str,
        mut f: impl FnMut(&mut C) -> Result<T, ClockError>,
    ) -> Result<T, ClockError> {
        let mut backoff = self.base_backoff_ms;
        let mut attempt = 1;
        loop {
            match f(&mut self.inner) {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        "RetryingClock: {} failed ({}), attempt {}/{}, retrying in {}ms",
                        op, e, attempt, self.attempts, backoff
                    );
                    self.delay.delay_ms(backoff);
                    backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<C: ClockPort, D: DelayNs> ClockPort for RetryingClock<C, D> {
    fn now(&mut self) -> Result<Timestamp, ClockError> {
        self.retry("now", |c| c.now())
    }

    fn adjust(&mut self, time: Timestamp) -> Result<(), ClockError> {
        self.retry("adjust", |c| c.adjust(time))
    }

    fn arm_alarm(
        &mut self,
        channel: AlarmChannel,
        time: Timestamp,
        matching: AlarmMatch,
    ) -> Result<(), ClockError> {
        self.retry("arm_alarm", |c| c.arm_alarm(channel, time, matching))
    }

    fn clear_alarm(&mut self, channel: AlarmChannel) -> Result<(), ClockError> {
        self.retry("clear_alarm", |c| c.clear_alarm(channel))
    }

    fn set_alarm_enabled(
        &mut self,
        channel: AlarmChannel,
        enabled: bool,
    ) -> Result<(), ClockError> {
        self.retry("set_alarm_enabled", |c| c.set_alarm_enabled(channel, enabled))
    }

    fn is_triggered(&mut self, channel: AlarmChannel) -> Result<bool, ClockError> {
        self.retry("is_triggered", |c| c.is_triggered(channel))
    }

    fn read_armed_time(&mut self, channel: AlarmChannel) -> Result<Timestamp, ClockError> {
        self.retry("read_armed_time", |c| c.read_armed_time(channel))
    }

    fn read_ram(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), ClockError> {
        self.retry("read_ram", |c| c.read_ram(offset, buf))
    }

    fn write_ram(&mut self, offset: u8, data: &[u8]) -> Result<(), ClockError> {
        self.retry("write_ram", |c| c.write_ram(offset, data))
    }

    fn power_failed(&mut self) -> Result<bool, ClockError> {
        self.retry("power_failed", |c| c.power_failed())
    }

    fn clear_power_failure(&mut self) -> Result<(), ClockError> {
        self.retry("clear_power_failure", |c| c.clear_power_failure())
    }

    fn last_power_down(&mut self) -> Result<Timestamp, ClockError> {
        self.retry("last_power_down", |c| c.last_power_down())
    }

    fn last_power_up(&mut self) -> Result<Timestamp, ClockError> {
        self.retry("last_power_up", |c| c.last_power_up())
    }

    fn weekday(&self, time: Timestamp) -> u8 {
        self.inner.weekday(time)
    }
}
