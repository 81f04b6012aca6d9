//! Source-level schema definition.

use serde::{Deserialize, Serialize};

use super::field::FieldSpec;

/// The declared allow-list of fields for one source.
///
/// Only declared columns are read from an extract; anything else an upstream
/// provider adds is ignored, and a missing required column fails the load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSchema {
    /// Declared fields in output order.
    pub fields: Vec<FieldSpec>,
}

impl SourceSchema {
    /// Create a schema with the given fields.
    pub fn with_fields(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Get a field by its output name.
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.output_name() == name)
    }

    /// Output names of all declared fields, in declaration order.
    pub fn output_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.output_name()).collect()
    }

    /// Fields that must be present in the extract header.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Returns the first output name declared twice, if any.
    pub fn duplicate_output_name(&self) -> Option<&str> {
        let names = self.output_names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Some(*name);
            }
        }
        None
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
    use crate::schema::FieldType;

    #[test]
    fn test_duplicate_output_name() {
        let schema = SourceSchema::with_fields(vec![
            FieldSpec::new("Total", FieldType::Float).renamed("Score"),
            FieldSpec::new("Rank", FieldType::Integer),
            FieldSpec::new("Score", FieldType::Float),
        ]);
        assert_eq!(schema.duplicate_output_name(), Some("Score"));
        assert_eq!(schema.output_names(), vec!["Score", "Rank", "Score"]);
    }

    #[test]
    fn test_required_fields() {
        let schema = SourceSchema::with_fields(vec![
            FieldSpec::new("Country", FieldType::Text).required(),
            FieldSpec::new("Rank", FieldType::Integer),
        ]);
        let required: Vec<_> = schema.required_fields().map(|f| f.column.as_str()).collect();
        assert_eq!(required, vec!["Country"]);
        assert!(schema.get_field("Rank").is_some());
    }
}
