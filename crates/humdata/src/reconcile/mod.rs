//! Country reconciliation: canonical reference list and fuzzy matching.

mod country;
mod matcher;

pub use country::{CanonicalCountry, CountryRegistry};
pub use matcher::{
    best_match, normalize, similarity, CountryMatch, CountryMatcher, DEFAULT_MIN_CONFIDENCE,
};
