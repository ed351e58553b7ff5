#![no_main]
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let _ = groundlink_core::parse_push_message(data, "pico", now);
});
