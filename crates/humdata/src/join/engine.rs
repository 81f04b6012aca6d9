//! Outer union of keyed source tables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::keyed::KeyedTable;
use crate::error::{HumdataError, Result};
use crate::schema::FieldValue;

/// Order of records in a joined table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOrder {
    /// Table order, then row order within each table.
    #[default]
    FirstAppearance,
    /// Stable sort by canonical code.
    ByCode,
}

/// One country after joining every source.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedCountryRecord {
    pub code: String,
    /// Every joined field, in declaration order, with explicit nulls.
    pub fields: IndexMap<String, FieldValue>,
    /// Sources that contributed a row for this country.
    pub sources: Vec<String>,
}

static NULL: FieldValue = FieldValue::Null;

impl JoinedCountryRecord {
    /// Value of `field`, null when the field is unknown.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&NULL)
    }
}

/// Result of a join: the field list and one record per country.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedTable {
    /// Field names in declaration order across all sources.
    pub fields: Vec<String>,
    /// Which source declared each field (the first, for shared fields).
    pub field_sources: IndexMap<String, Vec<String>>,
    pub records: IndexMap<String, JoinedCountryRecord>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&JoinedCountryRecord> {
        self.records.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinedCountryRecord> {
        self.records.values()
    }
}

/// Joins keyed tables into one record per canonical country.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinEngine {
    order: JoinOrder,
}

impl JoinEngine {
    pub fn new(order: JoinOrder) -> Self {
        Self { order }
    }

    /// Outer-join `tables` on canonical code.
    ///
    /// Fails with `SchemaConflict` when a field name is declared by more than
    /// one table and not every declaration is marked shared.
    pub fn join(&self, tables: &[KeyedTable]) -> Result<JoinedTable> {
        let field_sources = Self::field_sources(tables)?;
        let fields: Vec<String> = field_sources.keys().cloned().collect();

        let mut records: IndexMap<String, JoinedCountryRecord> = IndexMap::new();
        for table in tables {
            for row in &table.rows {
                let record = records
                    .entry(row.code.clone())
                    .or_insert_with(|| JoinedCountryRecord {
                        code: row.code.clone(),
                        fields: fields.iter().map(|f| (f.clone(), FieldValue::Null)).collect(),
                        sources: Vec::new(),
                    });

                for (name, value) in &row.values {
                    // First non-null wins for shared fields.
                    if let Some(slot) = record.fields.get_mut(name) {
                        if slot.is_null() {
                            *slot = value.clone();
                        }
                    }
                }
                if !record.sources.contains(&table.source) {
                    record.sources.push(table.source.clone());
                }
            }
        }

        if self.order == JoinOrder::ByCode {
            records.sort_keys();
        }

        log::debug!(
            "joined {} table(s) into {} record(s) with {} field(s)",
            tables.len(),
            records.len(),
            fields.len()
        );

        Ok(JoinedTable {
            fields,
            field_sources,
            records,
        })
    }

    fn field_sources(tables: &[KeyedTable]) -> Result<IndexMap<String, Vec<String>>> {
        let mut owners: IndexMap<String, Vec<(String, bool)>> = IndexMap::new();
        for table in tables {
            for field in &table.fields {
                owners
                    .entry(field.name.clone())
                    .or_default()
                    .push((table.source.clone(), field.shared));
            }
        }

        let mut field_sources = IndexMap::with_capacity(owners.len());
        for (field, declared) in owners {
            let sources: Vec<String> = declared.iter().map(|(s, _)| s.clone()).collect();
            if declared.len() > 1 && !declared.iter().all(|(_, shared)| *shared) {
                return Err(HumdataError::SchemaConflict { field, sources });
            }
            field_sources.insert(field, sources);
        }
        Ok(field_sources)
    }
}
