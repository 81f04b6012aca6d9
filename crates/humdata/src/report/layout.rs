//! Report layout: plain fields and numbered strands.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HumdataError, Result};
use crate::schema::FieldValue;

static LABEL_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Build the key of the `index`-th strand (0-based): `Strand_01_Label`.
pub fn strand_key(index: usize, label: &str) -> String {
    let label = LABEL_SEPARATOR.replace_all(label.trim(), "_");
    format!("Strand_{:02}_{}", index + 1, label)
}

/// Includes a strand only for countries where `field` equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandCondition {
    pub field: String,
    pub equals: FieldValue,
}

impl StrandCondition {
    pub fn new(field: impl Into<String>, equals: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }

    /// A null value never satisfies the condition.
    pub fn holds(&self, value: &FieldValue) -> bool {
        if value.is_null() {
            return false;
        }
        match (value.as_f64(), self.equals.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => value == &self.equals,
        }
    }
}

/// A labelled group of fields in each country entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandSpec {
    pub label: String,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StrandCondition>,
}

impl StrandSpec {
    pub fn new(label: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            label: label.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            condition: None,
        }
    }

    pub fn when(mut self, condition: StrandCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Shape of every country entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportLayout {
    /// Fields placed directly on the entry, before any strand.
    #[serde(default)]
    pub plain: Vec<String>,
    #[serde(default)]
    pub strands: Vec<StrandSpec>,
}

impl ReportLayout {
    pub fn new(plain: &[&str], strands: Vec<StrandSpec>) -> Self {
        Self {
            plain: plain.iter().map(|f| f.to_string()).collect(),
            strands,
        }
    }

    /// Strand keys paired with their specs, in declaration order.
    pub fn keyed_strands(&self) -> impl Iterator<Item = (String, &StrandSpec)> {
        self.strands
            .iter()
            .enumerate()
            .map(|(index, strand)| (strand_key(index, &strand.label), strand))
    }

    /// Every field the layout reads, including condition fields.
    pub fn referenced_fields(&self) -> Vec<(&str, String)> {
        let mut fields: Vec<(&str, String)> = self
            .plain
            .iter()
            .map(|f| (f.as_str(), "report plain fields".to_string()))
            .collect();
        for (key, strand) in self.keyed_strands() {
            for field in &strand.fields {
                fields.push((field.as_str(), key.clone()));
            }
            if let Some(condition) = &strand.condition {
                fields.push((condition.field.as_str(), format!("condition of {}", key)));
            }
        }
        fields
    }

    /// Check that every referenced field exists and that no name is used
    /// twice at the same level.
    pub fn validate(&self, available: &[String]) -> Result<()> {
        for (field, referenced_by) in self.referenced_fields() {
            if !available.iter().any(|f| f == field) {
                return Err(HumdataError::UnknownField {
                    field: field.to_string(),
                    referenced_by,
                });
            }
        }

        let mut top_level: Vec<String> = self.plain.clone();
        for (key, strand) in self.keyed_strands() {
            if top_level.contains(&key) {
                return Err(HumdataError::Config(format!("duplicate report key '{}'", key)));
            }
            top_level.push(key.clone());
            for (i, field) in strand.fields.iter().enumerate() {
                if strand.fields[..i].contains(field) {
                    return Err(HumdataError::Config(format!(
                        "field '{}' listed twice in {}",
                        field, key
                    )));
                }
            }
        }
        for (i, field) in self.plain.iter().enumerate() {
            if self.plain[..i].contains(field) {
                return Err(HumdataError::Config(format!(
                    "plain field '{}' listed twice",
                    field
                )));
            }
        }
        Ok(())
    }
}
