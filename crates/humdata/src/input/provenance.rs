//! Provenance header protocol for tagged extracts.
//!
//! A tagged extract reserves its first physical line for a JSON object
//! prefixed with `#`:
//!
//! ```text
//! #{"source_key": "FTS", "extract_date": "2017-04-28", "update_frequency": "Every week"}
//! Country,appealFunded,revisedRequirements
//! ...
//! ```
//!
//! A first line without the `#{` tag simply means "no provenance".

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Update cadences used by the upstream data portals.
pub const KNOWN_UPDATE_FREQUENCIES: &[&str] = &[
    "Every day",
    "Every week",
    "Every two weeks",
    "Every month",
    "Every three months",
    "Every six months",
    "Every year",
    "Never",
    "Unknown / Irregular",
];

/// Descriptive record of where a field's values come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceMetadata {
    /// Short key of the upstream source (e.g. "FTS", "HCR").
    pub source_key: String,
    /// Organisation that owns the source.
    pub source_org: String,
    /// Date the extract was taken.
    pub extract_date: NaiveDate,
    /// How often the upstream publishes new data.
    pub update_frequency: String,
    /// How a derived value was computed, when it is derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    /// Any other keys carried by the header (contact, notes, ...).
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ProvenanceMetadata {
    pub fn new(
        source_key: impl Into<String>,
        source_org: impl Into<String>,
        extract_date: NaiveDate,
        update_frequency: impl Into<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            source_org: source_org.into(),
            extract_date,
            update_frequency: update_frequency.into(),
            calculation: None,
            extra: IndexMap::new(),
        }
    }

    /// Attach a calculation description.
    pub fn with_calculation(mut self, calculation: impl Into<String>) -> Self {
        self.calculation = Some(calculation.into());
        self
    }

    /// Compose provenance for a value computed from several inputs.
    ///
    /// Keys and organisations are joined in input order without repeats, the
    /// extract date is the oldest input date, and the update frequency is the
    /// first input's when all inputs agree, otherwise "Unknown / Irregular".
    /// Returns `None` when there are no inputs.
    pub fn derived(inputs: &[&ProvenanceMetadata], calculation: impl Into<String>) -> Option<Self> {
        let first = inputs.first()?;

        let mut keys: Vec<&str> = Vec::new();
        let mut orgs: Vec<&str> = Vec::new();
        for input in inputs {
            if !keys.contains(&input.source_key.as_str()) {
                keys.push(&input.source_key);
            }
            if !orgs.contains(&input.source_org.as_str()) {
                orgs.push(&input.source_org);
            }
        }

        let extract_date = inputs
            .iter()
            .map(|p| p.extract_date)
            .min()
            .unwrap_or(first.extract_date);
        let update_frequency = if inputs
            .iter()
            .all(|p| p.update_frequency == first.update_frequency)
        {
            first.update_frequency.clone()
        } else {
            "Unknown / Irregular".to_string()
        };

        Some(
            Self::new(keys.join("+"), orgs.join("; "), extract_date, update_frequency)
                .with_calculation(calculation),
        )
    }

    /// Whether the update frequency is one of the known cadence keywords.
    pub fn has_known_frequency(&self) -> bool {
        KNOWN_UPDATE_FREQUENCIES.contains(&self.update_frequency.as_str())
    }
}

/// Returns the JSON payload if `line` carries the `#{...}` tag.
pub fn tagged_payload(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with("#{") && trimmed.ends_with('}') {
        Some(&trimmed[1..])
    } else {
        None
    }
}

/// Parse a provenance header line.
///
/// Returns `Ok(None)` when the line is not tagged. `source_org` is taken from
/// the header when present, otherwise looked up by `source_key` in
/// `organizations`. Errors describe why a tagged line is unusable.
pub fn parse_header(
    line: &str,
    organizations: &IndexMap<String, String>,
) -> Result<Option<ProvenanceMetadata>, String> {
    let Some(payload) = tagged_payload(line) else {
        return Ok(None);
    };

    let mut object: IndexMap<String, Value> = serde_json::from_str(payload)
        .map_err(|e| format!("provenance header is not a JSON object: {}", e))?;

    let source_key = take_string(&mut object, "source_key")?;
    let update_frequency = take_string(&mut object, "update_frequency")?;
    let date_text = take_string(&mut object, "extract_date")?;
    let extract_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
        .map_err(|e| format!("provenance extract_date '{}' is not YYYY-MM-DD: {}", date_text, e))?;

    let source_org = match object.shift_remove("source_org") {
        Some(Value::String(org)) => org,
        Some(other) => return Err(format!("provenance source_org must be a string, found {}", other)),
        None => organizations
            .get(&source_key)
            .cloned()
            .ok_or_else(|| format!("unknown provenance source_key '{}'", source_key))?,
    };

    let calculation = match object.shift_remove("calculation") {
        Some(Value::String(text)) => Some(text),
        _ => None,
    };

    let metadata = ProvenanceMetadata {
        source_key,
        source_org,
        extract_date,
        update_frequency,
        calculation,
        extra: object,
    };
    if !metadata.has_known_frequency() {
        log::warn!(
            "provenance for '{}' has unrecognised update frequency '{}'",
            metadata.source_key,
            metadata.update_frequency
        );
    }

    Ok(Some(metadata))
}

fn take_string(object: &mut IndexMap<String, Value>, key: &str) -> Result<String, String> {
    match object.shift_remove(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Some(Value::String(_)) => Err(format!("provenance key '{}' is empty", key)),
        Some(other) => Err(format!("provenance key '{}' must be a string, found {}", key, other)),
        None => Err(format!("provenance header is missing '{}'", key)),
    }
}
