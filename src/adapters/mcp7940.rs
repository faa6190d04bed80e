//! MCP7940N battery-backed RTC over I2C.
//!
//! Implements [`ClockPort`] for any `embedded_hal` 1.0 I2C bus.  The device
//! keeps BCD time, two alarm comparators that raise the MFP pin, a
//! power-fail latch with minute-resolution stamps, and 64 bytes of SRAM.
//!
//! # Register map (subset)
//!
//! | Addr        | Register      | Notes                                |
//! |-------------|---------------|--------------------------------------|
//! | 0x00–0x06   | RTCC time     | ST = bit 7 of 0x00                   |
//! | 0x03        | RTCWKDAY      | OSCRUN · PWRFAIL · VBATEN · weekday  |
//! | 0x07        | CONTROL       | ALM0EN (bit 4), ALM1EN (bit 5)       |
//! | 0x0A–0x0F   | ALM0          | sec min hour wkday date month        |
//! | 0x11–0x16   | ALM1          | same layout as ALM0                  |
//! | 0x18–0x1B   | PWRDN stamp   | min hour date wkday/month            |
//! | 0x1C–0x1F   | PWRUP stamp   | min hour date wkday/month            |
//! | 0x20–0x5F   | SRAM          | battery-backed, 64 bytes             |
//!
//! Alarm and power stamps carry no year.  Alarms take the year that puts
//! them nearest to now; power stamps take the most recent year not after
//! now.

use chrono::{Datelike, NaiveDate, Timelike};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::app::ports::{AlarmChannel, AlarmMatch, CLOCK_RAM_LEN, ClockError, ClockPort};
use crate::clock::{Timestamp, iso_weekday};

pub const MCP7940_ADDR: u8 = 0x6F;

mod reg {
    pub const RTCSEC: u8 = 0x00;
    pub const RTCWKDAY: u8 = 0x03;
    pub const CONTROL: u8 = 0x07;
    pub const ALM0SEC: u8 = 0x0A;
    pub const ALM1SEC: u8 = 0x11;
    pub const PWRDN: u8 = 0x18;
    pub const PWRUP: u8 = 0x1C;
    pub const SRAM: u8 = 0x20;

    /// Offset of ALMxWKDAY inside an alarm block.
    pub const ALM_WKDAY: u8 = 3;
}

mod bit {
    pub const ST: u8 = 1 << 7;
    pub const OSCRUN: u8 = 1 << 5;
    pub const PWRFAIL: u8 = 1 << 4;
    pub const VBATEN: u8 = 1 << 3;
    pub const HOUR_12H: u8 = 1 << 6;
    pub const HOUR_PM: u8 = 1 << 5;
    pub const ALM_IF: u8 = 1 << 3;
    pub const ALM0EN: u8 = 1 << 4;
    pub const ALM1EN: u8 = 1 << 5;
}

/// OSCRUN polls before giving up on the crystal.
const OSC_START_POLLS: u32 = 50;
const OSC_POLL_INTERVAL_MS: u32 = 2;
/// OSCRUN polls after clearing ST, before writing new time.
const OSC_STOP_POLLS: u32 = 10;

pub struct Mcp7940<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Mcp7940<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Start the crystal and enable battery backup, then wait for OSCRUN.
    ///
    /// Safe to call on every boot; a running oscillator is left untouched
    /// apart from setting VBATEN.
    pub fn start_oscillator(&mut self, delay: &mut impl DelayNs) -> Result<(), ClockError> {
        self.update(reg::RTCSEC, |v| v | bit::ST)?;
        self.update(reg::RTCWKDAY, |v| v | bit::VBATEN)?;

        for _ in 0..OSC_START_POLLS {
            if self.read_reg(reg::RTCWKDAY)? & bit::OSCRUN != 0 {
                info!("MCP7940: oscillator running");
                return Ok(());
            }
            delay.delay_ms(OSC_POLL_INTERVAL_MS);
        }
        warn!("MCP7940: oscillator did not start");
        Err(ClockError::Bus)
    }

    // ── Raw register access ───────────────────────────────────

    fn read_regs(&mut self, start: u8, buf: &mut [u8]) -> Result<(), ClockError> {
        self.i2c
            .write_read(MCP7940_ADDR, &[start], buf)
            .map_err(|_| ClockError::Bus)
    }

    fn read_reg(&mut self, addr: u8) -> Result<u8, ClockError> {
        let mut b = [0u8; 1];
        self.read_regs(addr, &mut b)?;
        Ok(b[0])
    }

    fn write_regs(&mut self, start: u8, data: &[u8]) -> Result<(), ClockError> {
        let mut frame = [0u8; 1 + CLOCK_RAM_LEN];
        let len = data.len();
        if len > CLOCK_RAM_LEN {
            return Err(ClockError::OutOfRange);
        }
        frame[0] = start;
        frame[1..=len].copy_from_slice(data);
        self.i2c
            .write(MCP7940_ADDR, &frame[..=len])
            .map_err(|_| ClockError::Bus)
    }

    fn update(&mut self, addr: u8, f: impl FnOnce(u8) -> u8) -> Result<(), ClockError> {
        let old = self.read_reg(addr)?;
        let new = f(old);
        if new != old {
            self.write_regs(addr, &[new])?;
        }
        Ok(())
    }

    fn alarm_base(channel: AlarmChannel) -> u8 {
        match channel {
            AlarmChannel::Start => reg::ALM0SEC,
            AlarmChannel::Stop => reg::ALM1SEC,
        }
    }

    fn enable_bit(channel: AlarmChannel) -> u8 {
        match channel {
            AlarmChannel::Start => bit::ALM0EN,
            AlarmChannel::Stop => bit::ALM1EN,
        }
    }

    fn read_stamp(&mut self, base: u8) -> Result<Timestamp, ClockError> {
        let mut raw = [0u8; 4];
        self.read_regs(base, &mut raw)?;
        let minute = bcd_to_bin(raw[0] & 0x7F)?;
        let hour = decode_hour(raw[1])?;
        let day = bcd_to_bin(raw[2] & 0x3F)?;
        let month = bcd_to_bin(raw[3] & 0x1F)?;
        let now = self.now()?;
        most_recent(now, month, day, hour, minute, 0)
    }
}

impl<I2C: I2c> ClockPort for Mcp7940<I2C> {
    fn now(&mut self) -> Result<Timestamp, ClockError> {
        let mut raw = [0u8; 7];
        self.read_regs(reg::RTCSEC, &mut raw)?;
        let second = bcd_to_bin(raw[0] & 0x7F)?;
        let minute = bcd_to_bin(raw[1] & 0x7F)?;
        let hour = decode_hour(raw[2])?;
        let day = bcd_to_bin(raw[4] & 0x3F)?;
        let month = bcd_to_bin(raw[5] & 0x1F)?;
        let year = 2000 + i32::from(bcd_to_bin(raw[6])?);
        to_timestamp(year, month, day, hour, minute, second)
    }

    fn adjust(&mut self, time: Timestamp) -> Result<(), ClockError> {
        let year = u8::try_from(time.year() - 2000)
            .ok()
            .filter(|y| *y <= 99)
            .ok_or(ClockError::OutOfRange)?;

        // Stop the oscillator so the counters do not ripple mid-write.
        self.update(reg::RTCSEC, |v| v & !bit::ST)?;
        for _ in 0..OSC_STOP_POLLS {
            if self.read_reg(reg::RTCWKDAY)? & bit::OSCRUN == 0 {
                break;
            }
        }
        // PWRFAIL can only be cleared, never set, so writing it back is a no-op.
        let wkday_flags = self.read_reg(reg::RTCWKDAY)? & bit::PWRFAIL;

        self.write_regs(
            reg::RTCSEC,
            &[
                bin_to_bcd(time.second() as u8) | bit::ST,
                bin_to_bcd(time.minute() as u8),
                bin_to_bcd(time.hour() as u8),
                iso_weekday(time) | bit::VBATEN | wkday_flags,
                bin_to_bcd(time.day() as u8),
                bin_to_bcd(time.month() as u8),
                bin_to_bcd(year),
            ],
        )?;
        debug!("MCP7940: time adjusted");
        Ok(())
    }

    fn arm_alarm(
        &mut self,
        channel: AlarmChannel,
        time: Timestamp,
        matching: AlarmMatch,
    ) -> Result<(), ClockError> {
        // ALMPOL = 0 (MFP active low), IF = 0.
        let wkday = (matching.mask_bits() << 4) | iso_weekday(time);
        self.write_regs(
            Self::alarm_base(channel),
            &[
                bin_to_bcd(time.second() as u8),
                bin_to_bcd(time.minute() as u8),
                bin_to_bcd(time.hour() as u8),
                wkday,
                bin_to_bcd(time.day() as u8),
                bin_to_bcd(time.month() as u8),
            ],
        )?;
        self.set_alarm_enabled(channel, true)
    }

    fn clear_alarm(&mut self, channel: AlarmChannel) -> Result<(), ClockError> {
        self.update(Self::alarm_base(channel) + reg::ALM_WKDAY, |v| {
            v & !bit::ALM_IF
        })
    }

    fn set_alarm_enabled(
        &mut self,
        channel: AlarmChannel,
        enabled: bool,
    ) -> Result<(), ClockError> {
        let mask = Self::enable_bit(channel);
        self.update(reg::CONTROL, |v| if enabled { v | mask } else { v & !mask })
    }

    fn is_triggered(&mut self, channel: AlarmChannel) -> Result<bool, ClockError> {
        let v = self.read_reg(Self::alarm_base(channel) + reg::ALM_WKDAY)?;
        Ok(v & bit::ALM_IF != 0)
    }

    fn read_armed_time(&mut self, channel: AlarmChannel) -> Result<Timestamp, ClockError> {
        let mut raw = [0u8; 6];
        self.read_regs(Self::alarm_base(channel), &mut raw)?;
        let second = bcd_to_bin(raw[0] & 0x7F)?;
        let minute = bcd_to_bin(raw[1] & 0x7F)?;
        let hour = decode_hour(raw[2])?;
        let day = bcd_to_bin(raw[4] & 0x3F)?;
        let month = bcd_to_bin(raw[5] & 0x1F)?;
        let now = self.now()?;
        nearest(now, month, day, hour, minute, second)
    }

    fn read_ram(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), ClockError> {
        check_ram_range(offset, buf.len())?;
        self.read_regs(reg::SRAM + offset, buf)
    }

    fn write_ram(&mut self, offset: u8, data: &[u8]) -> Result<(), ClockError> {
        check_ram_range(offset, data.len())?;
        self.write_regs(reg::SRAM + offset, data)
    }

    fn power_failed(&mut self) -> Result<bool, ClockError> {
        Ok(self.read_reg(reg::RTCWKDAY)? & bit::PWRFAIL != 0)
    }

    fn clear_power_failure(&mut self) -> Result<(), ClockError> {
        // Also resets both stamps.
        self.update(reg::RTCWKDAY, |v| v & !bit::PWRFAIL)
    }

    fn last_power_down(&mut self) -> Result<Timestamp, ClockError> {
        self.read_stamp(reg::PWRDN)
    }

    fn last_power_up(&mut self) -> Result<Timestamp, ClockError> {
        self.read_stamp(reg::PWRUP)
    }
}

// ── BCD / calendar helpers ────────────────────────────────────

fn bcd_to_bin(b: u8) -> Result<u8, ClockError> {
    let hi = b >> 4;
    let lo = b & 0x0F;
    if hi <= 9 && lo <= 9 {
        Ok(hi * 10 + lo)
    } else {
        Err(ClockError::InvalidData)
    }
}

/// `v` must be 0-99; every caller passes a calendar field.
fn bin_to_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// Hour register in either 24 h or 12 h mode.
fn decode_hour(raw: u8) -> Result<u8, ClockError> {
    if raw & bit::HOUR_12H == 0 {
        return bcd_to_bin(raw & 0x3F);
    }
    let h12 = bcd_to_bin(raw & 0x1F)?;
    if !(1..=12).contains(&h12) {
        return Err(ClockError::InvalidData);
    }
    let pm = raw & bit::HOUR_PM != 0;
    Ok(match (h12, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

fn to_timestamp(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<Timestamp, ClockError> {
    NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
        .ok_or(ClockError::InvalidData)
}

/// The occurrence of month/day/time in the year before, of, or after `now`
/// that lies closest to it.
fn nearest(
    now: Timestamp,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<Timestamp, ClockError> {
    (now.year() - 1..=now.year() + 1)
        .filter_map(|y| to_timestamp(y, month, day, hour, minute, second).ok())
        .min_by_key(|t| (*t - now).num_seconds().unsigned_abs())
        .ok_or(ClockError::InvalidData)
}

/// The latest occurrence of month/day/time not after `now`.  Looks back up
/// to four years so a 29 February stamp still resolves.
fn most_recent(
    now: Timestamp,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<Timestamp, ClockError> {
    (0..=4)
        .filter_map(|back| to_timestamp(now.year() - back, month, day, hour, minute, second).ok())
        .find(|t| *t <= now)
        .ok_or(ClockError::InvalidData)
}

fn check_ram_range(offset: u8, len: usize) -> Result<(), ClockError> {
    if usize::from(offset) + len > CLOCK_RAM_LEN {
        return Err(ClockError::OutOfRange);
    }
    Ok(())
}
