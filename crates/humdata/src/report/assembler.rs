//! Assembly of the final report document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::aggregate::{AggregateOutcome, Aggregation};
use super::layout::ReportLayout;
use super::provenance::FieldProvenance;
use crate::error::{HumdataError, Result};
use crate::input::ProvenanceMetadata;
use crate::join::{JoinedCountryRecord, JoinedTable};
use crate::schema::{FieldType, FieldValue};

/// Key of the synthetic aggregate entry.
pub const WORLD_KEY: &str = "WORLD";

/// A value in a country entry: a plain field or a strand of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Field(FieldValue),
    Strand(IndexMap<String, FieldValue>),
}

impl ReportValue {
    pub fn as_field(&self) -> Option<&FieldValue> {
        match self {
            ReportValue::Field(value) => Some(value),
            ReportValue::Strand(_) => None,
        }
    }

    pub fn as_strand(&self) -> Option<&IndexMap<String, FieldValue>> {
        match self {
            ReportValue::Strand(fields) => Some(fields),
            ReportValue::Field(_) => None,
        }
    }
}

/// Provenance entry mirroring a [`ReportValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Field(Option<ProvenanceMetadata>),
    Strand(IndexMap<String, Option<ProvenanceMetadata>>),
}

/// One country (or WORLD) entry.
pub type ReportEntry = IndexMap<String, ReportValue>;

/// The published report: data per country plus WORLD, and field metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub data: IndexMap<String, ReportEntry>,
    pub metadata: IndexMap<String, MetadataValue>,
}

impl ReportDocument {
    pub fn entry(&self, key: &str) -> Option<&ReportEntry> {
        self.data.get(key)
    }

    pub fn world(&self) -> Option<&ReportEntry> {
        self.data.get(WORLD_KEY)
    }

    /// Number of country entries, excluding WORLD.
    pub fn country_count(&self) -> usize {
        self.data.keys().filter(|k| *k != WORLD_KEY).count()
    }
}

/// An assembled document together with the WORLD aggregation accounting.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub document: ReportDocument,
    pub world: IndexMap<String, AggregateOutcome>,
}

/// Builds report documents from joined and derived records.
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    layout: ReportLayout,
    world: IndexMap<String, Aggregation>,
}

impl ReportAssembler {
    pub fn new(layout: ReportLayout, world: IndexMap<String, Aggregation>) -> Self {
        Self { layout, world }
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    /// Check the layout and aggregations against the available fields.
    pub fn validate(&self, available: &[String]) -> Result<()> {
        self.layout.validate(available)?;
        for (field, aggregation) in &self.world {
            let mut referenced = vec![field.as_str()];
            if let Aggregation::WeightedMean { weight } = aggregation {
                referenced.push(weight.as_str());
            }
            for name in referenced {
                if !available.iter().any(|f| f == name) {
                    return Err(HumdataError::UnknownField {
                        field: name.to_string(),
                        referenced_by: format!("WORLD aggregation of '{}'", field),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check every aggregation, and its weight, against the declared field
    /// types. Only `count` accepts non-numeric fields.
    pub fn check_types(&self, types: &IndexMap<String, FieldType>) -> Result<()> {
        for (field, aggregation) in &self.world {
            let mut referenced = vec![field.as_str()];
            if let Aggregation::WeightedMean { weight } = aggregation {
                referenced.push(weight.as_str());
            }
            for name in referenced {
                match types.get(name) {
                    Some(ty) if !aggregation.accepts(*ty) => {
                        return Err(HumdataError::IncompatibleField {
                            field: name.to_string(),
                            found: *ty,
                            expected: "numeric",
                            referenced_by: format!("WORLD {} of '{}'", aggregation.name(), field),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Assemble the document: one entry per record in table order, then
    /// WORLD, then the metadata mirror.
    pub fn assemble(&self, table: &JoinedTable, provenance: &FieldProvenance) -> Result<Assembly> {
        self.validate(&table.fields)?;

        let mut data: IndexMap<String, ReportEntry> = IndexMap::with_capacity(table.len() + 1);
        for record in table.iter() {
            data.insert(record.code.clone(), self.country_entry(record));
        }

        let world = self.aggregate(table)?;
        data.insert(WORLD_KEY.to_string(), self.world_entry(&world));

        log::debug!(
            "assembled report with {} country entr(ies) and {} strand(s)",
            table.len(),
            self.layout.strands.len()
        );

        Ok(Assembly {
            document: ReportDocument {
                data,
                metadata: self.metadata(provenance),
            },
            world,
        })
    }

    fn country_entry(&self, record: &JoinedCountryRecord) -> ReportEntry {
        let mut entry = ReportEntry::new();
        for field in &self.layout.plain {
            entry.insert(field.clone(), ReportValue::Field(record.get(field).clone()));
        }
        for (key, strand) in self.layout.keyed_strands() {
            if let Some(condition) = &strand.condition {
                if !condition.holds(record.get(&condition.field)) {
                    continue;
                }
            }
            let fields = strand
                .fields
                .iter()
                .map(|f| (f.clone(), record.get(f).clone()))
                .collect();
            entry.insert(key, ReportValue::Strand(fields));
        }
        entry
    }

    fn aggregate(&self, table: &JoinedTable) -> Result<IndexMap<String, AggregateOutcome>> {
        let mut outcomes = IndexMap::with_capacity(self.world.len());
        for (field, aggregation) in &self.world {
            let values: Vec<&FieldValue> = table.iter().map(|r| r.get(field)).collect();
            let weights: Vec<&FieldValue> = match aggregation {
                Aggregation::WeightedMean { weight } => table.iter().map(|r| r.get(weight)).collect(),
                _ => Vec::new(),
            };
            let outcome = aggregation.apply(field, &values, &weights)?;
            if outcome.excluded_nulls > 0 {
                log::debug!(
                    "WORLD {} of '{}' left out {} null value(s)",
                    aggregation.name(),
                    field,
                    outcome.excluded_nulls
                );
            }
            outcomes.insert(field.clone(), outcome);
        }
        Ok(outcomes)
    }

    fn world_entry(&self, world: &IndexMap<String, AggregateOutcome>) -> ReportEntry {
        let value = |field: &str| {
            world
                .get(field)
                .map(|o| o.value.clone())
                .unwrap_or(FieldValue::Null)
        };

        let mut entry = ReportEntry::new();
        for field in &self.layout.plain {
            entry.insert(field.clone(), ReportValue::Field(value(field)));
        }
        for (key, strand) in self.layout.keyed_strands() {
            let fields = strand.fields.iter().map(|f| (f.clone(), value(f))).collect();
            entry.insert(key, ReportValue::Strand(fields));
        }
        entry
    }

    fn metadata(&self, provenance: &FieldProvenance) -> IndexMap<String, MetadataValue> {
        let mut metadata = IndexMap::new();
        for field in &self.layout.plain {
            metadata.insert(field.clone(), MetadataValue::Field(provenance.get(field).cloned()));
        }
        for (key, strand) in self.layout.keyed_strands() {
            let fields = strand
                .fields
                .iter()
                .map(|f| (f.clone(), provenance.get(f).cloned()))
                .collect();
            metadata.insert(key, MetadataValue::Strand(fields));
        }
        metadata
    }
}
