//! Fuzz target: JSON command parser
//!
//! Arbitrary bytes into `AppCommand::from_json`.  Verifies:
//! - No panics on malformed UTF-8 or JSON
//! - Any accepted `set_schedules` payload fits the fixed slot table
//!
//! cargo fuzz run fuzz_command_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use pumpclock::app::commands::AppCommand;
use pumpclock::schedule::MAX_SCHEDULES;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(AppCommand::SetSchedules(set)) = AppCommand::from_json(text) {
        assert!(set.len() <= MAX_SCHEDULES);
    }
});
