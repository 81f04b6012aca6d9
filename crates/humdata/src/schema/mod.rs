//! Typed values and declared per-source schemas.

mod field;
mod table;
mod types;

pub use field::FieldSpec;
pub use table::SourceSchema;
pub use types::{FieldType, FieldValue};
