//! Source descriptors and loaded tables.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reconcile::CountryMatcher;
use crate::schema::{FieldValue, SourceSchema};

/// Where a source extract lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Location {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An http(s) URL.
    Url(String),
}

impl Location {
    /// Resolve a relative path against `base`. URLs and absolute paths are
    /// returned unchanged.
    pub fn resolved_against(&self, base: &Path) -> Location {
        match self {
            Location::Path(path) if path.is_relative() => Location::Path(base.join(path)),
            other => other.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Location::Url(value)
        } else {
            Location::Path(PathBuf::from(value))
        }
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Location::from(value.to_string())
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(path) => write!(f, "{}", path.display()),
            Location::Url(url) => f.write_str(url),
        }
    }
}

/// How a source identifies countries in its key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Canonical country codes; matched exactly (case-insensitive).
    Code,
    /// Free-text names or codes; matched through the reconciler.
    #[default]
    Name,
}

/// Which row survives when a source has several rows for one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    First,
    Last,
}

/// Keep only rows whose `column` equals `value` (after trimming).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

/// Everything needed to load one source extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name, used in logs, conflicts and the run summary.
    pub name: String,
    /// Human-readable description used in error messages.
    #[serde(default)]
    pub description: String,
    /// Path or URL of the extract.
    pub location: Location,
    /// Column holding the country name or code.
    pub key_column: String,
    #[serde(default)]
    pub key_kind: KeyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RowFilter>,
    /// Whether the first line carries a `#{...}` provenance header.
    #[serde(default)]
    pub provenance: bool,
    /// Source-specific spellings of "missing" (e.g. `-00`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub null_markers: Vec<String>,
    /// Field delimiter (auto-detected when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    /// Allow-listed fields.
    #[serde(default)]
    pub fields: SourceSchema,
}

impl SourceDescriptor {
    /// Create a descriptor with defaults for everything but the essentials.
    pub fn new(
        name: impl Into<String>,
        location: impl Into<Location>,
        key_column: impl Into<String>,
        fields: SourceSchema,
    ) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            location: location.into(),
            key_column: key_column.into(),
            key_kind: KeyKind::default(),
            filter: None,
            provenance: false,
            null_markers: Vec::new(),
            delimiter: None,
            duplicates: DuplicatePolicy::default(),
            fields,
        }
    }

    pub fn with_provenance(mut self) -> Self {
        self.provenance = true;
        self
    }

    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(RowFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_key_kind(mut self, kind: KeyKind) -> Self {
        self.key_kind = kind;
        self
    }

    pub fn with_null_markers(mut self, markers: &[&str]) -> Self {
        self.null_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Description for messages, falling back to the name.
    pub fn label(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }

    /// Check if a raw cell represents a missing value for this source.
    pub fn is_null_value(&self, value: &str) -> bool {
        is_null_value(value)
            || self
                .null_markers
                .iter()
                .any(|marker| marker.trim() == value.trim())
    }
}

/// Check if a value is one of the common spellings of "missing".
pub fn is_null_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed == "-"
}

/// One row of one source after type conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Raw join key as found in the extract (trimmed, pre-reconciliation).
    pub key: String,
    /// Declared fields by output name, in declaration order. Every declared
    /// field is present; missing values are explicit nulls.
    pub values: IndexMap<String, FieldValue>,
}

impl SourceRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }
}

/// A loaded, validated source extract.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    /// Source name.
    pub source: String,
    /// Output field names in declaration order.
    pub fields: Vec<String>,
    /// Rows in file order.
    pub rows: Vec<SourceRecord>,
}

impl SourceTable {
    /// An empty table with the declared shape, used in place of a source
    /// that failed to load.
    pub fn empty(descriptor: &SourceDescriptor) -> Self {
        Self {
            source: descriptor.name.clone(),
            fields: descriptor
                .fields
                .output_names()
                .into_iter()
                .map(String::from)
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep the rows whose key is the closest fuzzy match for `value`.
    ///
    /// Candidates are the distinct raw keys in first-appearance order, so ties
    /// resolve to the earliest row. Fails with `NoMatch` below the matcher's
    /// threshold.
    pub fn fuzzy_filter_by_key(&self, value: &str, matcher: &CountryMatcher) -> Result<SourceTable> {
        let mut candidates: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !candidates.contains(&row.key.as_str()) {
                candidates.push(&row.key);
            }
        }

        let (index, _) = matcher.match_value(value, &candidates)?;
        let chosen = candidates[index];

        Ok(SourceTable {
            source: self.source.clone(),
            fields: self.fields.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| row.key == chosen)
                .cloned()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HumdataError;
    use crate::schema::{FieldSpec, FieldType};

    #[test]
    fn test_is_null_value() {
        assert!(is_null_value(""));
        assert!(is_null_value("  "));
        assert!(is_null_value("NaN"));
        assert!(is_null_value("NA"));
        assert!(is_null_value("n/a"));
        assert!(is_null_value("null"));
        assert!(is_null_value("-"));
        assert!(!is_null_value("0"));
        assert!(!is_null_value("Nauru"));
    }

    #[test]
    fn test_source_null_markers() {
        let descriptor = SourceDescriptor::new("hcr", "hcr.csv", "Country", SourceSchema::default())
            .with_null_markers(&["-00"]);
        assert!(descriptor.is_null_value("  -00 "));
        assert!(descriptor.is_null_value(""));
        assert!(!descriptor.is_null_value("00"));
    }

    #[test]
    fn test_location_from_string() {
        assert!(Location::from("https://example.org/data.csv").is_remote());
        let local = Location::from("data/fsi.csv");
        assert!(!local.is_remote());
        assert_eq!(
            local.resolved_against(Path::new("/srv/config")),
            Location::Path(PathBuf::from("/srv/config/data/fsi.csv"))
        );
    }

    #[test]
    fn test_empty_table_keeps_declared_shape() {
        let schema = SourceSchema::with_fields(vec![
            FieldSpec::new("PopTotal", FieldType::Float).renamed("Population"),
            FieldSpec::new("Year", FieldType::Integer),
        ]);
        let descriptor = SourceDescriptor::new("esa", "wpp.csv", "Country", schema);
        let table = SourceTable::empty(&descriptor);
        assert_eq!(table.fields, vec!["Population", "Year"]);
        assert!(table.is_empty());
    }

    fn record(key: &str, year: i64) -> SourceRecord {
        SourceRecord {
            key: key.to_string(),
            values: IndexMap::from([("Year".to_string(), FieldValue::Integer(year))]),
        }
    }

    #[test]
    fn test_fuzzy_filter_by_key() {
        let table = SourceTable {
            source: "wpp".into(),
            fields: vec!["Year".into()],
            rows: vec![
                record("Niger", 2023),
                record("Nigeria", 2023),
                record("Niger", 2024),
                record("South Sudan", 2024),
            ],
        };
        let matcher = CountryMatcher::default();

        let niger = table.fuzzy_filter_by_key("niger", &matcher).unwrap();
        assert_eq!(niger.row_count(), 2);
        assert!(niger.rows.iter().all(|r| r.key == "Niger"));
        assert_eq!(niger.fields, table.fields);

        let typo = table.fuzzy_filter_by_key("Sooth Sudan", &matcher).unwrap();
        assert_eq!(typo.rows[0].key, "South Sudan");

        assert!(matches!(
            table.fuzzy_filter_by_key("Sudan", &matcher),
            Err(HumdataError::NoMatch { .. })
        ));
    }
}
