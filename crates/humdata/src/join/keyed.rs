//! Attaching canonical country codes to loaded rows.

use indexmap::IndexMap;
use serde::Serialize;

use crate::input::{DuplicatePolicy, KeyKind, LoadOutcome, SourceDescriptor, SourceTable};
use crate::reconcile::{CountryMatcher, CountryRegistry};
use crate::schema::FieldValue;

/// A field a table contributes to the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableField {
    pub name: String,
    /// Other sources may contribute the same name with the same meaning.
    pub shared: bool,
}

/// One row keyed by canonical country code.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRow {
    pub code: String,
    pub values: IndexMap<String, FieldValue>,
}

/// A source table whose rows carry canonical codes.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable {
    pub source: String,
    /// Declared fields, present even when the source failed to load.
    pub fields: Vec<TableField>,
    /// At most one row per canonical code.
    pub rows: Vec<KeyedRow>,
}

/// What happened while keying one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyingReport {
    /// Raw keys that did not reconcile to any canonical country.
    pub unmatched: Vec<String>,
    /// Rows discarded because another row had the same canonical code.
    pub duplicates: usize,
    /// Raw keys matched approximately rather than exactly, with confidence.
    pub fuzzy_matches: Vec<(String, String, u8)>,
}

impl KeyedTable {
    /// An empty table contributing only its declared field names.
    pub fn unavailable(descriptor: &SourceDescriptor) -> Self {
        Self {
            source: descriptor.name.clone(),
            fields: declared_fields(descriptor),
            rows: Vec::new(),
        }
    }

    /// Key the table of a load outcome, substituting an empty table when the
    /// source failed.
    pub fn from_outcome(
        outcome: &LoadOutcome,
        registry: &CountryRegistry,
        matcher: &CountryMatcher,
    ) -> (Self, KeyingReport) {
        match &outcome.result {
            Ok(table) => Self::from_table(table, &outcome.descriptor, registry, matcher),
            Err(_) => (Self::unavailable(&outcome.descriptor), KeyingReport::default()),
        }
    }

    /// Resolve every row's raw key to a canonical code.
    ///
    /// Rows whose key does not reconcile are dropped and reported. When two
    /// rows resolve to the same code, the descriptor's duplicate policy picks
    /// the survivor.
    pub fn from_table(
        table: &SourceTable,
        descriptor: &SourceDescriptor,
        registry: &CountryRegistry,
        matcher: &CountryMatcher,
    ) -> (Self, KeyingReport) {
        let mut report = KeyingReport::default();
        let mut rows: IndexMap<String, KeyedRow> = IndexMap::new();

        for record in &table.rows {
            let code = match descriptor.key_kind {
                KeyKind::Code => registry.by_code(&record.key).map(|c| c.code.clone()),
                KeyKind::Name => match matcher.reconcile(&record.key, registry) {
                    Ok(found) => {
                        if found.confidence < 100 {
                            report.fuzzy_matches.push((
                                record.key.clone(),
                                found.country.code.clone(),
                                found.confidence,
                            ));
                        }
                        Some(found.country.code.clone())
                    }
                    Err(e) => {
                        log::debug!("source '{}': {}", descriptor.name, e);
                        None
                    }
                },
            };

            let Some(code) = code else {
                if !report.unmatched.contains(&record.key) {
                    report.unmatched.push(record.key.clone());
                }
                continue;
            };

            let row = KeyedRow {
                code: code.clone(),
                values: record.values.clone(),
            };
            if rows.contains_key(&code) {
                report.duplicates += 1;
                if descriptor.duplicates == DuplicatePolicy::Last {
                    rows.insert(code, row);
                }
            } else {
                rows.insert(code, row);
            }
        }

        if !report.unmatched.is_empty() {
            log::warn!(
                "source '{}': {} key(s) did not match a country: {}",
                descriptor.name,
                report.unmatched.len(),
                report.unmatched.join(", ")
            );
        }
        if report.duplicates > 0 {
            log::warn!(
                "source '{}': {} duplicate row(s) discarded (keeping {:?})",
                descriptor.name,
                report.duplicates,
                descriptor.duplicates
            );
        }

        let keyed = Self {
            source: descriptor.name.clone(),
            fields: declared_fields(descriptor),
            rows: rows.into_values().collect(),
        };
        (keyed, report)
    }
}

fn declared_fields(descriptor: &SourceDescriptor) -> Vec<TableField> {
    descriptor
        .fields
        .fields
        .iter()
        .map(|spec| TableField {
            name: spec.output_name().to_string(),
            shared: spec.shared,
        })
        .collect()
}
