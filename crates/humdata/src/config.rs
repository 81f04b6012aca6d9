//! Declarative pipeline configuration (TOML).
//!
//! ```toml
//! countries_file = "countries.csv"
//!
//! [run]
//! output = "out/report.json"
//! join_order = "first_appearance"
//! min_confidence = 80
//!
//! [organizations]
//! wpp = "UN DESA"
//!
//! [[sources]]
//! name = "population"
//! location = "data/population.csv"
//! key_column = "Location"
//! provenance = true
//!
//! [[sources.fields]]
//! column = "PopTotal"
//! type = "float"
//!
//! [[metrics]]
//! name = "IDPShare"
//! rule = "percent"
//! numerator = "IDPs"
//! denominator = "PopTotal"
//!
//! [report]
//! plain = ["PopTotal"]
//!
//! [[report.strands]]
//! label = "Displacement"
//! fields = ["IDPs", "IDPShare"]
//!
//! [world]
//! PopTotal = "sum"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::derive::{DerivedMetric, MetricRegistry};
use crate::error::{HumdataError, Result};
use crate::input::{LoadPolicy, SourceDescriptor, SourceLoader};
use crate::join::{JoinEngine, JoinOrder, KeyedTable};
use crate::reconcile::{CanonicalCountry, CountryMatcher, CountryRegistry, DEFAULT_MIN_CONFIDENCE};
use crate::report::{Aggregation, ReportAssembler, ReportLayout};
use crate::schema::FieldType;

/// `[run]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Where the report is published.
    pub output: Option<PathBuf>,
    pub join_order: JoinOrder,
    /// Minimum reconciler confidence (0-100) for name keys.
    pub min_confidence: u8,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output: None,
            join_order: JoinOrder::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// Complete description of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub load: LoadPolicy,
    /// Organisation per source key, for headers without `source_org`.
    #[serde(default)]
    pub organizations: IndexMap<String, String>,
    #[serde(default)]
    pub countries: Vec<CanonicalCountry>,
    /// CSV with `code,name,aliases` columns.
    #[serde(default)]
    pub countries_file: Option<PathBuf>,
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub metrics: Vec<DerivedMetric>,
    #[serde(default)]
    pub report: ReportLayout,
    /// Field name to WORLD aggregation.
    #[serde(default)]
    pub world: IndexMap<String, Aggregation>,
}

impl PipelineConfig {
    /// Read and validate a configuration file.
    ///
    /// Relative paths inside the file resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| HumdataError::io(path, e))?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_toml_str(&content, base).map_err(|e| match e {
            HumdataError::Toml { source, .. } => HumdataError::Toml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate configuration text, resolving relative paths
    /// against `base`.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut config: PipelineConfig = toml::from_str(content).map_err(|source| HumdataError::Toml {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            source.location = source.location.resolved_against(base);
        }
        if let Some(file) = &self.countries_file {
            if file.is_relative() {
                self.countries_file = Some(base.join(file));
            }
        }
        if let Some(output) = &self.run.output {
            if output.is_relative() {
                self.run.output = Some(base.join(output));
            }
        }
    }

    /// Check the configuration without touching any source.
    ///
    /// Catches schema conflicts, unknown or cyclic metric inputs, layout or
    /// WORLD references to fields nothing produces, and metrics or WORLD
    /// aggregations over fields of the wrong declared type.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(HumdataError::Config("no sources configured".into()));
        }
        if self.countries.is_empty() && self.countries_file.is_none() {
            return Err(HumdataError::Config(
                "no canonical countries: set `countries` or `countries_file`".into(),
            ));
        }
        if !self.countries.is_empty() && self.countries_file.is_some() {
            return Err(HumdataError::Config(
                "set either `countries` or `countries_file`, not both".into(),
            ));
        }
        if self.run.min_confidence > 100 {
            return Err(HumdataError::Config(format!(
                "min_confidence must be between 0 and 100, got {}",
                self.run.min_confidence
            )));
        }

        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].iter().any(|s| s.name == source.name) {
                return Err(HumdataError::Config(format!("duplicate source name '{}'", source.name)));
            }
            if source.key_column.trim().is_empty() {
                return Err(HumdataError::Config(format!("source '{}' has no key_column", source.name)));
            }
            if source.fields.is_empty() {
                return Err(HumdataError::Config(format!("source '{}' declares no fields", source.name)));
            }
            if let Some(name) = source.fields.duplicate_output_name() {
                return Err(HumdataError::Config(format!(
                    "source '{}' declares field '{}' twice",
                    source.name, name
                )));
            }
        }

        // Join the declared shapes alone to surface conflicts before loading.
        let shapes: Vec<KeyedTable> = self.sources.iter().map(KeyedTable::unavailable).collect();
        let joined = JoinEngine::default().join(&shapes)?;

        let metrics = self.metrics();
        metrics.evaluation_order(&joined.fields)?;

        let mut available = joined.fields;
        available.extend(metrics.names().into_iter().map(String::from));
        let assembler = self.assembler();
        assembler.validate(&available)?;

        let types = metrics.field_types(&self.declared_types())?;
        assembler.check_types(&types)
    }

    /// Declared type of every source field; a shared field takes the type of
    /// its first declaration.
    fn declared_types(&self) -> IndexMap<String, FieldType> {
        let mut types = IndexMap::new();
        for source in &self.sources {
            for spec in &source.fields.fields {
                types
                    .entry(spec.output_name().to_string())
                    .or_insert(spec.field_type);
            }
        }
        types
    }

    /// The canonical country list, read from `countries_file` if set.
    pub fn country_registry(&self) -> Result<CountryRegistry> {
        match &self.countries_file {
            Some(path) => CountryRegistry::from_csv(path),
            None => CountryRegistry::new(self.countries.clone()),
        }
    }

    pub fn loader(&self) -> SourceLoader {
        SourceLoader::with_policy(self.organizations.clone(), self.load.clone())
    }

    pub fn matcher(&self) -> CountryMatcher {
        CountryMatcher::new(self.run.min_confidence)
    }

    pub fn metrics(&self) -> MetricRegistry {
        MetricRegistry::with_metrics(self.metrics.clone())
    }

    pub fn assembler(&self) -> ReportAssembler {
        ReportAssembler::new(self.report.clone(), self.world.clone())
    }

    pub fn join_engine(&self) -> JoinEngine {
        JoinEngine::new(self.run.join_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::MetricRule;
    use crate::input::Location;

    const CONFIG: &str = r#"
[run]
output = "out/report.json"
join_order = "by_code"

[load]
timeout_secs = 5

[organizations]
wpp = "UN DESA"

[[countries]]
code = "TCD"
name = "Chad"
aliases = ["Tchad"]

[[sources]]
name = "population"
location = "data/population.csv"
key_column = "Location"
provenance = true

[[sources.fields]]
column = "PopTotal"
type = "float"

[[sources]]
name = "displacement"
location = "https://example.org/idps.csv"
key_column = "ISO3"
key_kind = "code"

[[sources.fields]]
column = "IDPs"
type = "integer"

[[metrics]]
name = "IDPShare"
rule = "percent"
numerator = "IDPs"
denominator = "PopTotal"

[report]
plain = ["PopTotal"]

[[report.strands]]
label = "Displacement"
fields = ["IDPs", "IDPShare"]

[world]
PopTotal = "sum"
IDPShare = { weighted_mean = { weight = "PopTotal" } }
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = PipelineConfig::from_toml_str(CONFIG, Path::new("/etc/humdata")).unwrap();

        assert_eq!(config.run.join_order, JoinOrder::ByCode);
        assert_eq!(config.run.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(config.run.output, Some(PathBuf::from("/etc/humdata/out/report.json")));
        assert_eq!(config.load.timeout_secs, 5);
        assert_eq!(config.load.retries, LoadPolicy::default().retries);
        assert_eq!(
            config.sources[0].location,
            Location::Path(PathBuf::from("/etc/humdata/data/population.csv"))
        );
        assert!(config.sources[1].location.is_remote());
        assert!(matches!(config.metrics[0].rule, MetricRule::Percent { .. }));
        assert_eq!(
            config.world["IDPShare"],
            Aggregation::WeightedMean {
                weight: "PopTotal".into()
            }
        );
        assert_eq!(config.country_registry().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_strand_field_fails_validation() {
        let broken = CONFIG.replace(r#"fields = ["IDPs", "IDPShare"]"#, r#"fields = ["Refugees"]"#);
        assert!(matches!(
            PipelineConfig::from_toml_str(&broken, Path::new(".")),
            Err(HumdataError::UnknownField { ref field, .. }) if field == "Refugees"
        ));
    }

    #[test]
    fn test_conflicting_sources_fail_validation() {
        let broken = CONFIG.replace(r#"column = "IDPs""#, r#"column = "PopTotal""#);
        assert!(matches!(
            PipelineConfig::from_toml_str(&broken, Path::new(".")),
            Err(HumdataError::SchemaConflict { .. })
        ));
    }

    #[test]
    fn test_rules_over_text_fields_fail_validation() {
        let with_region = CONFIG.replace(
            "[[sources]]\nname = \"displacement\"",
            "[[sources.fields]]\ncolumn = \"Region\"\ntype = \"text\"\n\n[[sources]]\nname = \"displacement\"",
        );
        assert!(PipelineConfig::from_toml_str(&with_region, Path::new(".")).is_ok());

        let ranked = with_region.replace(
            "[report]",
            "[[metrics]]\nname = \"RegionRank\"\nrule = \"rank\"\nfield = \"Region\"\n\n[report]",
        );
        assert!(matches!(
            PipelineConfig::from_toml_str(&ranked, Path::new(".")),
            Err(HumdataError::IncompatibleField { ref field, found: FieldType::Text, .. }) if field == "Region"
        ));

        let summed = with_region.replace("PopTotal = \"sum\"", "PopTotal = \"sum\"\nRegion = \"sum\"");
        let err = PipelineConfig::from_toml_str(&summed, Path::new(".")).unwrap_err();
        assert!(matches!(err, HumdataError::IncompatibleField { ref field, .. } if field == "Region"));
        assert!(err.is_configuration_error());

        let counted = with_region.replace("PopTotal = \"sum\"", "PopTotal = \"sum\"\nRegion = \"count\"");
        assert!(PipelineConfig::from_toml_str(&counted, Path::new(".")).is_ok());
    }

    #[test]
    fn test_ordinal_needs_an_integer_field() {
        let labelled = CONFIG.replace(
            "[report]",
            "[[metrics]]\nname = \"ShareLabel\"\nrule = \"ordinal\"\nfield = \"IDPShare\"\n\n[[metrics]]\nname = \"IDPRank\"\nrule = \"rank\"\nfield = \"IDPShare\"\n\n[[metrics]]\nname = \"IDPRankLabel\"\nrule = \"ordinal\"\nfield = \"IDPRank\"\n\n[report]",
        );
        assert!(matches!(
            PipelineConfig::from_toml_str(&labelled, Path::new(".")),
            Err(HumdataError::IncompatibleField { ref field, found: FieldType::Float, .. }) if field == "IDPShare"
        ));

        let ranked_only = labelled.replace(
            "[[metrics]]\nname = \"ShareLabel\"\nrule = \"ordinal\"\nfield = \"IDPShare\"\n\n",
            "",
        );
        assert!(PipelineConfig::from_toml_str(&ranked_only, Path::new(".")).is_ok());
    }

    #[test]
    fn test_syntax_error_is_toml_error() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[[sources]\n", Path::new(".")),
            Err(HumdataError::Toml { .. })
        ));
    }
}
