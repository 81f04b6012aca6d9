//! humdata: multi-source humanitarian data aggregation.
//!
//! Loads tabular extracts from several providers, reconciles their country
//! keys against a canonical list, outer-joins them into one record per
//! country, computes derived metrics and publishes a JSON report with a
//! WORLD aggregate and per-field provenance.
//!
//! # Core Principles
//!
//! - **Missing stays missing**: absent values are explicit nulls, never zeros
//! - **Degrade per source**: one failed extract never aborts a run
//! - **Full provenance**: every reported field names where it came from
//!
//! # Example
//!
//! ```no_run
//! use humdata::{Pipeline, PipelineConfig};
//!
//! # async fn example() -> humdata::Result<()> {
//! let config = PipelineConfig::load("pipeline.toml")?;
//! let outcome = Pipeline::new(config).run_and_publish(None).await?;
//!
//! println!("Countries: {}", outcome.summary.countries);
//! println!("Sources loaded: {}", outcome.summary.loaded());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod derive;
pub mod error;
pub mod input;
pub mod join;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod schema;

pub use config::{PipelineConfig, RunSettings};
pub use derive::{DerivedMetric, MetricRegistry, MetricRule, NullPolicy, ZeroDivision};
pub use error::{HumdataError, Result};
pub use input::{LoadError, LoadOutcome, LoadPolicy, ProvenanceMetadata, SourceDescriptor, SourceLoader, SourceTable};
pub use join::{JoinEngine, JoinOrder, JoinedCountryRecord, JoinedTable, KeyedTable};
pub use pipeline::{CancelFlag, Pipeline, RunOutcome, RunSummary, SourceStatus};
pub use reconcile::{CanonicalCountry, CountryMatcher, CountryRegistry};
pub use report::{Aggregation, ReportAssembler, ReportDocument, ReportLayout, StrandCondition, StrandSpec, WORLD_KEY};
pub use schema::{FieldSpec, FieldType, FieldValue, SourceSchema};
