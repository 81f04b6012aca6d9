//! Fuzz target for the extract parser.
//!
//! This fuzzer tests that parsing an extract:
//! 1. Never panics on malformed input
//! 2. Handles any delimiter and provenance header combination
//! 3. Reports failures as load errors

#![no_main]

use humdata::input::{Parser, SourceDescriptor};
use humdata::{FieldSpec, FieldType, SourceSchema};
use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Only process reasonable-sized inputs to avoid OOM
    if data.len() > 100_000 {
        return;
    }

    let descriptor = SourceDescriptor::new(
        "fuzz",
        "fuzz.csv",
        "Country",
        SourceSchema::with_fields(vec![
            FieldSpec::new("Value", FieldType::Float),
            FieldSpec::new("Label", FieldType::Text),
        ]),
    )
    .with_provenance();
    let organizations = IndexMap::new();

    let _ = Parser::new(&descriptor, &organizations).parse_bytes(data);
});
