//! Declared field definitions for one source.

use serde::{Deserialize, Serialize};

use super::types::FieldType;

/// One allow-listed column of a source extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column header as it appears in the extract.
    pub column: String,
    /// Output field name after loading (defaults to `column`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared type of the values.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the column must be present in the header.
    #[serde(default)]
    pub required: bool,
    /// Whether other sources may contribute the same output name with the
    /// same meaning (first non-null value wins).
    #[serde(default)]
    pub shared: bool,
}

impl FieldSpec {
    /// Create an optional, unshared field kept under its column name.
    pub fn new(column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            column: column.into(),
            name: None,
            field_type,
            required: false,
            shared: false,
        }
    }

    /// Rename the field in the joined output.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    /// Name of the field in the joined output.
    pub fn output_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_defaults_to_column() {
        let field = FieldSpec::new("PopTotal", FieldType::Float);
        assert_eq!(field.output_name(), "PopTotal");

        let field = field.renamed("Population");
        assert_eq!(field.output_name(), "Population");
    }

    #[test]
    fn test_deserialize_from_toml() {
        let field: FieldSpec = toml::from_str(
            r#"
            column = "Total"
            name = "Fragile State Index Score"
            type = "float"
            required = true
            "#,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Float);
        assert!(field.required);
        assert!(!field.shared);
        assert_eq!(field.output_name(), "Fragile State Index Score");
    }
}
