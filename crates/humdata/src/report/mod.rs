//! Report assembly: layout, WORLD aggregation, provenance and publication.

mod aggregate;
mod assembler;
mod layout;
mod persistence;
mod provenance;

pub use aggregate::{AggregateOutcome, Aggregation};
pub use assembler::{
    Assembly, MetadataValue, ReportAssembler, ReportDocument, ReportEntry, ReportValue, WORLD_KEY,
};
pub use layout::{strand_key, ReportLayout, StrandCondition, StrandSpec};
pub use provenance::FieldProvenance;
