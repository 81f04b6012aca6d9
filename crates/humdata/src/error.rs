//! Error types for the humdata library.

use std::path::PathBuf;
use thiserror::Error;

use crate::schema::FieldType;

/// Main error type for humdata operations.
///
/// Per-source load failures are not represented here: they are carried as a
/// [`LoadError`](crate::input::LoadError) inside each load outcome so that one
/// bad extract never aborts a run. The variants below either abort the whole
/// pipeline (configuration-class errors) or are returned to a caller that
/// decides its own fallback (`NoMatch`).
#[derive(Debug, Error)]
pub enum HumdataError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pipeline configuration could not be parsed.
    #[error("TOML error in '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration is structurally valid but semantically wrong.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two sources contribute the same field name without declaring it shared.
    #[error("Schema conflict on field '{field}': declared by {}", sources.join(", "))]
    SchemaConflict { field: String, sources: Vec<String> },

    /// Derived metrics depend on each other in a loop.
    #[error("Cyclic dependency between derived metrics: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A metric, strand or aggregation references a field nobody produces.
    #[error("Unknown field '{field}' referenced by {referenced_by}")]
    UnknownField { field: String, referenced_by: String },

    /// A metric or aggregation reads a field whose declared type it cannot use.
    #[error("{referenced_by} needs {expected} input, but '{field}' is declared {found}")]
    IncompatibleField {
        field: String,
        found: FieldType,
        expected: &'static str,
        referenced_by: String,
    },

    /// A numeric rule was applied to a non-numeric value.
    #[error("Metric '{metric}' expected a number in '{field}' for {country}, found {found}")]
    TypeMismatch {
        metric: String,
        field: String,
        country: String,
        found: String,
    },

    /// The reconciler could not match a value above the confidence threshold.
    #[error("No country match for '{input}' (best: {best:?}, confidence {confidence} < {threshold})")]
    NoMatch {
        input: String,
        best: Option<String>,
        confidence: u8,
        threshold: u8,
    },

    /// A ratio metric configured to fail on a zero denominator hit one.
    #[error("Division by zero in metric '{metric}' for {country}")]
    DivisionByZero { metric: String, country: String },

    /// Every configured source failed to load.
    #[error("No source loaded successfully ({failed} failed)")]
    NoSourcesAvailable { failed: usize },

    /// The run was cancelled before the report was published.
    #[error("Run cancelled before publication")]
    Cancelled,
}

impl HumdataError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors that indicate a configuration bug rather than
    /// bad input data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Toml { .. }
                | Self::SchemaConflict { .. }
                | Self::CyclicDependency { .. }
                | Self::UnknownField { .. }
                | Self::IncompatibleField { .. }
                | Self::TypeMismatch { .. }
        )
    }
}

/// Result type alias for humdata operations.
pub type Result<T> = std::result::Result<T, HumdataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = HumdataError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic dependency between derived metrics: a -> b -> a"
        );
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_data_errors_are_not_configuration() {
        let err = HumdataError::DivisionByZero {
            metric: "ratio".into(),
            country: "NER".into(),
        };
        assert!(!err.is_configuration_error());
    }
}
