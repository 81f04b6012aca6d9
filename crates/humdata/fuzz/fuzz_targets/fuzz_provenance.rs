//! Fuzz target for provenance header parsing.
//!
//! Any first line, tagged or not, must parse or be rejected without panicking.

#![no_main]

use humdata::input::parse_header;
use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10_000 {
        return;
    }

    if let Ok(line) = std::str::from_utf8(data) {
        let mut organizations = IndexMap::new();
        organizations.insert("FTS".to_string(), "Financial Tracking Service".to_string());
        let _ = parse_header(line, &organizations);
    }
});
