//! Schedule persistence in the clock's battery-backed SRAM.
//!
//! The whole [`ScheduleSet`] is written as one fixed 64-byte block so it
//! survives main-power loss for as long as the RTC battery lasts.
//!
//! ## Block layout
//!
//! ```text
//!  0      1        2      3       4 ……………………………………………………… 63
//! ┌──────┬────────┬──────┬───────┬──────────────────────────────┐
//! │ 0xA7 │ ver=1  │ count│ check │ 10 × entry (6 bytes each)    │
//! └──────┴────────┴──────┴───────┴──────────────────────────────┘
//!
//!  entry: hour │ minute │ duration lo │ duration hi │ days │ enabled
//! ```
//!
//! `check` is the first byte of SHA-256 over every other byte of the block.
//! Slots at or beyond `count` are zero.

use log::{debug, warn};

use crate::app::ports::{CLOCK_RAM_LEN, ClockPort};
use crate::error::{Error, PersistenceError, Result};

use super::{MAX_SCHEDULES, ScheduleEntry, ScheduleSet};

/// Size of the persisted block.
pub const BLOCK_LEN: usize = 64;

const MAGIC: u8 = 0xA7;
const LAYOUT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4;
const ENTRY_LEN: usize = 6;
const CHECK_INDEX: usize = 3;

const _: () = assert!(HEADER_LEN + MAX_SCHEDULES * ENTRY_LEN == BLOCK_LEN);

/// Reads and writes the schedule block at a fixed SRAM offset.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleStore {
    offset: u8,
}

impl ScheduleStore {
    pub const fn new(offset: u8) -> Self {
        Self { offset }
    }

    pub const fn offset(&self) -> u8 {
        self.offset
    }

    /// Persist `set`, replacing whatever block was stored.
    ///
    /// Entries `load` would reject are refused before the bus is touched,
    /// so the stored block is left as it was.
    pub fn save<C: ClockPort + ?Sized>(&self, clock: &mut C, set: &ScheduleSet) -> Result<()> {
        self.check_fits()?;
        if let Some(slot) = set.iter().position(|e| !e.is_storable()) {
            warn!("ScheduleStore: slot {} is out of range, not saving", slot);
            return Err(Error::InvalidRequest("schedule entry out of range"));
        }
        let block = encode_block(set);
        clock
            .write_ram(self.offset, &block)
            .map_err(|e| Error::Persistence(e.into()))?;
        debug!(
            "ScheduleStore: saved {} entries at offset {}",
            set.len(),
            self.offset
        );
        Ok(())
    }

    /// Read back the stored set.
    ///
    /// Fails with [`PersistenceError::Uninitialized`] when nothing was ever
    /// saved and [`PersistenceError::Corrupted`] when the block is damaged.
    pub fn load<C: ClockPort + ?Sized>(&self, clock: &mut C) -> Result<ScheduleSet> {
        self.check_fits()?;
        let mut block = [0u8; BLOCK_LEN];
        clock
            .read_ram(self.offset, &mut block)
            .map_err(|e| Error::Persistence(e.into()))?;
        decode_block(&block).map_err(|e| {
            if let PersistenceError::Corrupted(why) = e {
                warn!("ScheduleStore: block at offset {} corrupted: {}", self.offset, why);
            }
            Error::Persistence(e)
        })
    }

    fn check_fits(&self) -> Result<()> {
        if usize::from(self.offset) + BLOCK_LEN > CLOCK_RAM_LEN {
            return Err(Error::InvalidRequest("schedule block does not fit in clock RAM"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Codec
// ═══════════════════════════════════════════════════════════════

/// Serialise `set` into a fixed block.
pub fn encode_block(set: &ScheduleSet) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[0] = MAGIC;
    block[1] = LAYOUT_VERSION;
    // `ScheduleSet` capacity is MAX_SCHEDULES, so this always fits a byte.
    block[2] = set.len() as u8;

    for (slot, entry) in set.iter().enumerate() {
        let at = HEADER_LEN + slot * ENTRY_LEN;
        let [lo, hi] = entry.duration_secs.to_le_bytes();
        block[at..at + ENTRY_LEN].copy_from_slice(&[
            entry.hour,
            entry.minute,
            lo,
            hi,
            entry.days_of_week,
            u8::from(entry.enabled),
        ]);
    }

    block[CHECK_INDEX] = check_byte(&block);
    block
}

/// Parse and validate a stored block.
pub fn decode_block(block: &[u8; BLOCK_LEN]) -> core::result::Result<ScheduleSet, PersistenceError> {
    if block[0] != MAGIC || block[1] != LAYOUT_VERSION {
        return Err(PersistenceError::Uninitialized);
    }

    let count = usize::from(block[2]);
    if count > MAX_SCHEDULES {
        return Err(PersistenceError::Corrupted("entry count exceeds capacity"));
    }
    if block[CHECK_INDEX] != check_byte(block) {
        return Err(PersistenceError::Corrupted("check byte mismatch"));
    }

    let mut set = ScheduleSet::new();
    for chunk in block[HEADER_LEN..].chunks_exact(ENTRY_LEN).take(count) {
        let entry = decode_entry(chunk)?;
        set.push(entry)
            .map_err(|_| PersistenceError::Corrupted("entry count exceeds capacity"))?;
    }
    Ok(set)
}

fn decode_entry(raw: &[u8]) -> core::result::Result<ScheduleEntry, PersistenceError> {
    let &[hour, minute, lo, hi, days_of_week, enabled] = raw else {
        return Err(PersistenceError::Corrupted("short entry"));
    };
    if hour > 23 {
        return Err(PersistenceError::Corrupted("hour out of range"));
    }
    if minute > 59 {
        return Err(PersistenceError::Corrupted("minute out of range"));
    }
    if days_of_week & 0x80 != 0 {
        return Err(PersistenceError::Corrupted("day mask bit 7 set"));
    }
    let enabled = match enabled {
        0 => false,
        1 => true,
        _ => return Err(PersistenceError::Corrupted("enabled flag not 0/1")),
    };
    Ok(ScheduleEntry {
        hour,
        minute,
        duration_secs: u16::from_le_bytes([lo, hi]),
        days_of_week,
        enabled,
    })
}

fn check_byte(block: &[u8; BLOCK_LEN]) -> u8 {
    let mut h = hmac_sha256::Hash::new();
    h.update(&block[..CHECK_INDEX]);
    h.update(&block[CHECK_INDEX + 1..]);
    h.finalize()[0]
}
