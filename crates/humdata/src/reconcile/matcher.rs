//! Approximate string matching of country names and codes.

use strsim::{normalized_levenshtein, sorensen_dice};

use super::country::{CanonicalCountry, CountryRegistry};
use crate::error::{HumdataError, Result};

/// Default minimum confidence for accepting a match.
pub const DEFAULT_MIN_CONFIDENCE: u8 = 80;

/// Weight applied to substring matches, which are weaker evidence than a
/// whole-string match.
const PARTIAL_WEIGHT: f64 = 0.9;

/// Ceiling for the bigram and substring ratios when one name only extends
/// the other ("Niger" and "Nigeria", "Sudan" and "South Sudan"). Such pairs
/// usually name different countries, so they stay below the default
/// threshold and need an explicit alias instead.
const EXTENSION_CEILING: f64 = 0.7;

/// Words ignored when deciding whether one name extends another.
const FILLER_WORDS: [&str; 3] = ["the", "of", "and"];

/// Lowercase, replace punctuation with spaces and collapse whitespace.
pub fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two strings on a 0–100 scale.
///
/// The score is the best of a plain edit-distance ratio, the same ratio
/// after sorting tokens, a bigram overlap ratio (tolerant of truncated
/// words such as "rep" for "republic"), and, when one string is much
/// longer, a weighted best-window substring ratio. The last two are capped
/// when one name merely extends the other. Only identical normalised
/// strings score 100.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    if a == b {
        return 100;
    }

    let plain = normalized_levenshtein(&a, &b);
    let sorted = normalized_levenshtein(&sort_tokens(&a), &sort_tokens(&b));
    let mut bigrams = sorensen_dice(&a, &b);
    let mut partial = partial_ratio(&a, &b) * PARTIAL_WEIGHT;
    if extends(&a, &b) || extends(&b, &a) {
        bigrams = bigrams.min(EXTENSION_CEILING);
        partial = partial.min(EXTENSION_CEILING);
    }

    let best = plain.max(sorted).max(bigrams).max(partial);
    // Only identical inputs may claim full confidence.
    ((best * 100.0).round() as u8).min(99)
}

fn sort_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split(' ').collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Whether `long` is `short` with more added: extra words around the same
/// words, or a single word lengthened at its end.
fn extends(short: &str, long: &str) -> bool {
    let short: Vec<&str> = content_words(short);
    let long: Vec<&str> = content_words(long);
    match (short.as_slice(), long.as_slice()) {
        ([], _) | (_, []) => false,
        ([word], [longer]) => longer.len() > word.len() && longer.starts_with(word),
        _ => short.len() < long.len() && short.iter().all(|word| long.contains(word)),
    }
}

fn content_words(value: &str) -> Vec<&str> {
    value.split(' ').filter(|word| !FILLER_WORDS.contains(word)).collect()
}

/// Best ratio of the shorter string against every equally long window of
/// the longer one. Zero unless the longer string is at least 1.5 times as
/// long and the shorter one has three or more characters.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.len() < 3 || (long.len() as f64) < short.len() as f64 * 1.5 {
        return 0.0;
    }

    let needle: String = short.iter().collect();
    long.windows(short.len())
        .map(|window| normalized_levenshtein(&needle, &window.iter().collect::<String>()))
        .fold(0.0, f64::max)
}

/// Score every candidate and return the index and confidence of the best.
///
/// Ties resolve to the earliest candidate. Always returns the best candidate
/// when there is at least one, however low its score.
pub fn best_match<S: AsRef<str>>(raw: &str, candidates: &[S]) -> Option<(usize, u8)> {
    best_by(candidates.len(), |index| similarity(raw, candidates[index].as_ref()))
}

fn best_by(count: usize, score: impl Fn(usize) -> u8) -> Option<(usize, u8)> {
    let mut best: Option<(usize, u8)> = None;
    for index in 0..count {
        let value = score(index);
        match best {
            Some((_, best_score)) if value <= best_score => {}
            _ => best = Some((index, value)),
        }
        if value == 100 {
            break;
        }
    }
    best
}

/// A canonical country chosen for a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryMatch<'a> {
    pub country: &'a CanonicalCountry,
    pub confidence: u8,
}

/// Reconciles raw values with a configurable confidence threshold.
///
/// Pure: holds only the threshold, so the same inputs always produce the same
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryMatcher {
    min_confidence: u8,
}

impl CountryMatcher {
    /// Create a matcher; results below `min_confidence` are `NoMatch`.
    pub fn new(min_confidence: u8) -> Self {
        Self {
            min_confidence: min_confidence.min(100),
        }
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Match `raw` against a plain candidate list.
    pub fn match_value<S: AsRef<str>>(&self, raw: &str, candidates: &[S]) -> Result<(usize, u8)> {
        let best = best_match(raw, candidates);
        self.accept(raw, best, |index| candidates[index].as_ref().to_string())
    }

    /// Match `raw` against the registry. Each country scores the best of its
    /// code, name and aliases.
    pub fn reconcile<'r>(&self, raw: &str, registry: &'r CountryRegistry) -> Result<CountryMatch<'r>> {
        let countries: Vec<&CanonicalCountry> = registry.iter().collect();
        let best = best_by(countries.len(), |index| {
            countries[index]
                .spellings()
                .map(|spelling| similarity(raw, spelling))
                .max()
                .unwrap_or(0)
        });

        let (index, confidence) = self.accept(raw, best, |index| countries[index].name.clone())?;
        Ok(CountryMatch {
            country: countries[index],
            confidence,
        })
    }

    fn accept(
        &self,
        raw: &str,
        best: Option<(usize, u8)>,
        describe: impl Fn(usize) -> String,
    ) -> Result<(usize, u8)> {
        match best {
            Some((index, confidence)) if confidence >= self.min_confidence => Ok((index, confidence)),
            Some((index, confidence)) => Err(HumdataError::NoMatch {
                input: raw.to_string(),
                best: Some(describe(index)),
                confidence,
                threshold: self.min_confidence,
            }),
            None => Err(HumdataError::NoMatch {
                input: raw.to_string(),
                best: None,
                confidence: 0,
                threshold: self.min_confidence,
            }),
        }
    }
}

impl Default for CountryMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}
