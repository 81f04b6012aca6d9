//! End-to-end run: load, reconcile, join, derive, assemble, publish.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{HumdataError, Result};
use crate::input::{LoadOutcome, ProvenanceMetadata};
use crate::join::{KeyedTable, KeyingReport};
use crate::reconcile::CountryRegistry;
use crate::report::{AggregateOutcome, FieldProvenance, ReportDocument};

/// Shared cancellation signal, checked between stages and before publishing.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HumdataError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What happened to one source during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub loaded: bool,
    pub rows: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceMetadata>,
    #[serde(flatten)]
    pub keying: KeyingReport,
}

/// Record of a run, threaded through every stage.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceStatus>,
    /// Country entries in the report, excluding WORLD.
    pub countries: usize,
    pub fields: usize,
    pub derived_fields: usize,
    /// Null accounting of every WORLD aggregation.
    pub world: IndexMap<String, AggregateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.sources.iter().filter(|s| s.loaded).count()
    }

    pub fn failed(&self) -> usize {
        self.sources.len() - self.loaded()
    }

    /// Raw keys that matched no country, by source.
    pub fn unmatched(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources
            .iter()
            .flat_map(|s| s.keying.unmatched.iter().map(move |k| (s.name.as_str(), k.as_str())))
    }
}

/// A finished run: the report and what happened while building it.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: ReportDocument,
    pub summary: RunSummary,
}

/// Runs a configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally controlled cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Load every source in parallel and build the report in memory.
    pub async fn run(&self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let registry = self.config.country_registry()?;
        self.cancel.check()?;

        log::info!("loading {} source(s)", self.config.sources.len());
        let outcomes = self.config.loader().load_all(&self.config.sources).await;
        self.cancel.check()?;

        self.build(&registry, outcomes, started_at)
    }

    /// Run and publish the report to `output`, or to the configured output
    /// path when `None`.
    pub async fn run_and_publish(&self, output: Option<&Path>) -> Result<RunOutcome> {
        let path = output
            .map(Path::to_path_buf)
            .or_else(|| self.config.run.output.clone())
            .ok_or_else(|| HumdataError::Config("no output path configured".into()))?;

        let mut outcome = self.run().await?;
        outcome.report.publish(&path, &self.cancel)?;
        outcome.summary.output = Some(path);
        Ok(outcome)
    }

    /// Build the report from already loaded sources.
    ///
    /// Fails with `NoSourcesAvailable` when no source loaded. Sources that
    /// failed still contribute their declared fields as nulls.
    pub fn build(
        &self,
        registry: &CountryRegistry,
        outcomes: Vec<LoadOutcome>,
        started_at: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let loaded = outcomes.iter().filter(|o| o.is_success()).count();
        if loaded == 0 {
            return Err(HumdataError::NoSourcesAvailable {
                failed: outcomes.len(),
            });
        }

        let matcher = self.config.matcher();
        let mut tables = Vec::with_capacity(outcomes.len());
        let mut sources = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            let (table, keying) = KeyedTable::from_outcome(outcome, registry, &matcher);
            sources.push(SourceStatus {
                name: outcome.source().to_string(),
                loaded: outcome.is_success(),
                rows: table.rows.len(),
                attempts: outcome.attempts,
                error: outcome.error_message(),
                error_kind: outcome.error().map(|e| e.kind()),
                fingerprint: outcome.fingerprint.clone(),
                provenance: outcome.provenance.clone(),
                keying,
            });
            tables.push(table);
        }

        let mut joined = self.config.join_engine().join(&tables)?;
        let base_fields = joined.fields.len();
        self.cancel.check()?;

        let metrics = self.config.metrics();
        let provenance = FieldProvenance::from_sources(&joined, &outcomes).with_metrics(&metrics)?;
        metrics.apply(&mut joined)?;
        self.cancel.check()?;

        let assembly = self.config.assembler().assemble(&joined, &provenance)?;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            sources,
            countries: joined.len(),
            fields: base_fields,
            derived_fields: joined.fields.len() - base_fields,
            world: assembly.world,
            output: None,
        };
        log::info!(
            "built report: {} countr(ies), {} of {} source(s) loaded",
            summary.countries,
            summary.loaded(),
            summary.sources.len()
        );

        Ok(RunOutcome {
            report: assembly.document,
            summary,
        })
    }
}
