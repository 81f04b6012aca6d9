//! Per-source load results.

use std::time::Duration;

use thiserror::Error;

use super::provenance::ProvenanceMetadata;
use super::source::{SourceDescriptor, SourceTable};

/// Why one source could not be loaded. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The file or URL does not exist.
    #[error("resource not found at {location}: {reason}")]
    ResourceNotFound { location: String, reason: String },

    /// The extract has a header but no data rows.
    #[error("empty file")]
    EmptyResource,

    /// A filter was given and no row matched it.
    #[error("no row matches the filter [{column}: {value}]")]
    FilterNoMatch { column: String, value: String },

    /// The extract is malformed or violates its declared schema.
    #[error("corrupt resource: {reason}")]
    ResourceCorrupt { reason: String },

    /// A remote resource could not be reached; worth retrying.
    #[error("resource temporarily unavailable: {reason}")]
    Unavailable { reason: String },

    /// Every attempt exceeded the per-attempt timeout.
    #[error("timed out after {attempts} attempt(s) of {timeout:?}")]
    TimedOut { attempts: u32, timeout: Duration },
}

impl LoadError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        LoadError::ResourceCorrupt {
            reason: reason.into(),
        }
    }

    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::Unavailable { .. } | LoadError::TimedOut { .. })
    }

    /// Short machine-friendly name for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::ResourceNotFound { .. } => "resource_not_found",
            LoadError::EmptyResource => "empty_resource",
            LoadError::FilterNoMatch { .. } => "filter_no_match",
            LoadError::ResourceCorrupt { .. } => "resource_corrupt",
            LoadError::Unavailable { .. } => "unavailable",
            LoadError::TimedOut { .. } => "timed_out",
        }
    }
}

/// The result of loading one source, successful or not.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The descriptor that was loaded.
    pub descriptor: SourceDescriptor,
    /// The table, or why there is none.
    pub result: Result<SourceTable, LoadError>,
    /// Provenance from the header, if the source carries one.
    pub provenance: Option<ProvenanceMetadata>,
    /// SHA-256 of the bytes read, when any were read.
    pub fingerprint: Option<String>,
    /// Number of attempts made.
    pub attempts: u32,
}

impl LoadOutcome {
    /// An outcome for a source that failed before anything was read.
    pub fn failed(descriptor: SourceDescriptor, error: LoadError, attempts: u32) -> Self {
        Self {
            descriptor,
            result: Err(error),
            provenance: None,
            fingerprint: None,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn source(&self) -> &str {
        &self.descriptor.name
    }

    pub fn error(&self) -> Option<&LoadError> {
        self.result.as_ref().err()
    }

    /// Human-readable error message in the form the serving layer returns.
    pub fn error_message(&self) -> Option<String> {
        self.error()
            .map(|e| format!("Error: No {} data was found ({})", self.descriptor.label(), e))
    }

    /// The loaded table, or an empty table of the declared shape when the
    /// source is unavailable.
    pub fn table_or_empty(&self) -> SourceTable {
        match &self.result {
            Ok(table) => table.clone(),
            Err(_) => SourceTable::empty(&self.descriptor),
        }
    }

    /// The `(success, table-or-error, metadata)` triple expected by callers
    /// that turn a load into a response.
    pub fn into_response(self) -> (bool, Result<SourceTable, String>, Option<ProvenanceMetadata>) {
        let message = self.error_message();
        match self.result {
            Ok(table) => (true, Ok(table), self.provenance),
            Err(_) => (
                false,
                Err(message.unwrap_or_default()),
                self.provenance,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SourceSchema;

    #[test]
    fn test_error_message_uses_description() {
        let descriptor = SourceDescriptor::new("gni", "gni.csv", "Country Name", SourceSchema::default())
            .with_description("GNI PPP indicator");
        let outcome = LoadOutcome::failed(descriptor, LoadError::EmptyResource, 1);

        assert_eq!(
            outcome.error_message().unwrap(),
            "Error: No GNI PPP indicator data was found (empty file)"
        );

        let (success, result, metadata) = outcome.into_response();
        assert!(!success);
        assert!(result.unwrap_err().contains("GNI PPP indicator"));
        assert!(metadata.is_none());
    }

    #[test]
    fn test_transient_errors() {
        assert!(LoadError::Unavailable { reason: "503".into() }.is_transient());
        assert!(!LoadError::EmptyResource.is_transient());
        assert!(!LoadError::corrupt("bad").is_transient());
    }
}
