//! Fuzz target: persisted schedule block
//!
//! Feeds arbitrary SRAM contents through the decoder and, when a block is
//! accepted, through the resolver.  Verifies:
//! - No panics under arbitrary byte inputs
//! - An accepted block re-encodes to a block that decodes to the same set
//! - Any resolved window lies strictly after `now`
//!
//! cargo fuzz run fuzz_schedule_block

#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use pumpclock::schedule::resolver::resolve;
use pumpclock::schedule::store::{BLOCK_LEN, decode_block, encode_block};

fuzz_target!(|data: &[u8]| {
    let Some((head, rest)) = data.split_first_chunk::<4>() else {
        return;
    };
    let mut block = [0u8; BLOCK_LEN];
    let n = rest.len().min(BLOCK_LEN);
    block[..n].copy_from_slice(&rest[..n]);

    let Ok(set) = decode_block(&block) else {
        return;
    };
    assert_eq!(decode_block(&encode_block(&set)), Ok(set.clone()));

    // First four bytes pick "now" within a few years of 2024.
    let minutes = u32::from_le_bytes(*head) % (4 * 366 * 24 * 60);
    let Some(now) = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| t.checked_add_signed(chrono::TimeDelta::minutes(i64::from(minutes))))
    else {
        return;
    };
    if let Some(alarm) = resolve(now, &set) {
        assert!(alarm.start > now);
        assert!(set.get(alarm.slot).is_some_and(|e| e.is_active()));
    }
});
