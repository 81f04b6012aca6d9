//! Per-field provenance for the report metadata.

use indexmap::IndexMap;

use crate::derive::MetricRegistry;
use crate::error::Result;
use crate::input::{LoadOutcome, ProvenanceMetadata};
use crate::join::JoinedTable;

/// Provenance of every joined and derived field.
///
/// A field whose source failed or carried no header maps to `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldProvenance {
    fields: IndexMap<String, Option<ProvenanceMetadata>>,
}

impl FieldProvenance {
    /// Attribute each joined field to the first of its declaring sources
    /// that loaded with a provenance header.
    pub fn from_sources(table: &JoinedTable, outcomes: &[LoadOutcome]) -> Self {
        let by_source: IndexMap<&str, &ProvenanceMetadata> = outcomes
            .iter()
            .filter(|o| o.is_success())
            .filter_map(|o| o.provenance.as_ref().map(|p| (o.source(), p)))
            .collect();

        let fields = table
            .field_sources
            .iter()
            .map(|(field, sources)| {
                let provenance = sources
                    .iter()
                    .find_map(|s| by_source.get(s.as_str()).map(|p| (*p).clone()));
                (field.clone(), provenance)
            })
            .collect();
        Self { fields }
    }

    /// Add composed provenance for every derived metric.
    ///
    /// Metrics are visited in evaluation order so a metric built on another
    /// metric inherits that metric's composed provenance.
    pub fn with_metrics(mut self, registry: &MetricRegistry) -> Result<Self> {
        let base: Vec<String> = self.fields.keys().cloned().collect();
        let metrics: Vec<_> = registry.iter().collect();

        for index in registry.evaluation_order(&base)? {
            let metric = metrics[index];
            let inputs: Vec<&ProvenanceMetadata> = metric
                .inputs()
                .into_iter()
                .filter_map(|input| self.get(input))
                .collect();
            let composed = ProvenanceMetadata::derived(&inputs, metric.calculation());
            self.fields.insert(metric.name.clone(), composed);
        }
        Ok(self)
    }

    pub fn get(&self, field: &str) -> Option<&ProvenanceMetadata> {
        self.fields.get(field).and_then(Option::as_ref)
    }

    pub fn insert(&mut self, field: impl Into<String>, provenance: Option<ProvenanceMetadata>) {
        self.fields.insert(field.into(), provenance);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::{DerivedMetric, MetricRule};
    use chrono::NaiveDate;

    fn provenance(key: &str, org: &str, day: u32) -> ProvenanceMetadata {
        ProvenanceMetadata::new(key, org, NaiveDate::from_ymd_opt(2024, 3, day).unwrap(), "Annually")
    }

    #[test]
    fn test_derived_provenance_composes_inputs() {
        let mut index = FieldProvenance::default();
        index.insert("Idps", Some(provenance("idmc", "IDMC", 10)));
        index.insert("Pop", Some(provenance("wpp", "UN DESA", 2)));
        index.insert("Risk", None);

        let registry = MetricRegistry::with_metrics(vec![
            DerivedMetric::new(
                "Share",
                MetricRule::Ratio {
                    numerator: "Idps".into(),
                    denominator: "Pop".into(),
                },
            ),
            DerivedMetric::new(
                "RiskPresent",
                MetricRule::Present {
                    field: "Risk".into(),
                },
            ),
        ]);
        let index = index.with_metrics(&registry).unwrap();

        let share = index.get("Share").unwrap();
        assert_eq!(share.source_key, "idmc+wpp");
        assert_eq!(share.source_org, "IDMC; UN DESA");
        assert_eq!(share.extract_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(share.calculation.as_deref(), Some("Idps / Pop"));

        assert!(index.get("RiskPresent").is_none());
        assert_eq!(index.len(), 5);
    }
}
