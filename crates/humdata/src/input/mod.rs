//! Source loading: descriptors, provenance headers, parsing and retries.

mod loader;
mod outcome;
mod parser;
mod provenance;
mod source;

pub use loader::{fingerprint, LoadPolicy, SourceLoader};
pub use outcome::{LoadError, LoadOutcome};
pub use parser::{detect_delimiter, ParsedExtract, Parser};
pub use provenance::{parse_header, tagged_payload, ProvenanceMetadata, KNOWN_UPDATE_FREQUENCIES};
pub use source::{
    is_null_value, DuplicatePolicy, KeyKind, Location, RowFilter, SourceDescriptor, SourceRecord,
    SourceTable,
};
