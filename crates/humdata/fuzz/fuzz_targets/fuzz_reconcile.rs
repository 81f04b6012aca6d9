//! Fuzz target for country reconciliation.
//!
//! Matching must never panic and must stay deterministic with confidence
//! within 0..=100.

#![no_main]

use humdata::reconcile::{CanonicalCountry, CountryMatcher, CountryRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1_000 {
        return;
    }

    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(registry) = CountryRegistry::new(vec![
        CanonicalCountry::new("TCD", "Chad").with_aliases(&["Tchad"]),
        CanonicalCountry::new("COD", "Democratic Republic of the Congo").with_aliases(&["DR Congo"]),
        CanonicalCountry::new("CIV", "Côte d'Ivoire").with_aliases(&["Ivory Coast"]),
    ]) else {
        return;
    };

    let matcher = CountryMatcher::new(0);
    let first = matcher.reconcile(raw, &registry).ok().map(|m| (m.country.code.clone(), m.confidence));
    let second = matcher.reconcile(raw, &registry).ok().map(|m| (m.country.code.clone(), m.confidence));
    assert_eq!(first, second);
    if let Some((_, confidence)) = first {
        assert!(confidence <= 100);
    }
});
