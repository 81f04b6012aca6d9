//! End-to-end tests for the report pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use humdata::report::{MetadataValue, ReportValue};
use humdata::{
    CancelFlag, FieldValue, HumdataError, Pipeline, PipelineConfig, ReportDocument, WORLD_KEY,
};

/// Helper to write a file into the test directory.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write test file");
    path
}

const POPULATION: &str = "\
#{\"source_key\": \"WPP\", \"extract_date\": \"2024-07-01\", \"update_frequency\": \"Every year\"}
Location,PopTotal,Region
Chad,18278.5,Africa
South Sudan,11088.75,Africa
Syria,23227.0,Asia
Atlantis,5,Ocean
";

const DISPLACEMENT: &str = "\
ISO3\tIDPs\tRefugees
TCD\t381289\t
SSD\t2000000\t5
SSD\t1\t1
";

const CONFIG: &str = r#"
[run]
output = "out/report.json"

[organizations]
WPP = "UN DESA Population Division"

[[countries]]
code = "TCD"
name = "Chad"

[[countries]]
code = "SSD"
name = "South Sudan"

[[countries]]
code = "SYR"
name = "Syrian Arab Republic"
aliases = ["Syria"]

[[sources]]
name = "population"
location = "population.csv"
key_column = "Location"
provenance = true

[[sources.fields]]
column = "PopTotal"
type = "float"
required = true

[[sources.fields]]
column = "Region"
type = "text"

[[sources]]
name = "displacement"
location = "displacement.tsv"
key_column = "ISO3"
key_kind = "code"

[[sources.fields]]
column = "IDPs"
type = "integer"

[[sources.fields]]
column = "Refugees"
type = "integer"

[[sources]]
name = "funding"
location = "missing/funding.csv"
key_column = "Country"

[[sources.fields]]
column = "appealFunded"
name = "Funding"
type = "float"

[[metrics]]
name = "IDPShare"
rule = "percent"
numerator = "IDPs"
denominator = "PopTotal"

[report]
plain = ["PopTotal"]

[[report.strands]]
label = "Displacement"
fields = ["IDPs", "Refugees", "IDPShare"]

[[report.strands]]
label = "Africa Funding"
fields = ["Funding"]
condition = { field = "Region", equals = "Africa" }

[world]
PopTotal = "sum"
IDPs = "sum"
"#;

fn setup() -> (TempDir, PipelineConfig) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    create_test_file(dir.path(), "population.csv", POPULATION);
    create_test_file(dir.path(), "displacement.tsv", DISPLACEMENT);
    let config_path = create_test_file(dir.path(), "humdata.toml", CONFIG);
    let config = PipelineConfig::load(&config_path).expect("Config should load");
    (dir, config)
}

fn field<'a>(report: &'a ReportDocument, key: &str, name: &str) -> &'a FieldValue {
    report
        .entry(key)
        .and_then(|entry| entry.get(name))
        .and_then(ReportValue::as_field)
        .expect("plain field present")
}

fn strand_field<'a>(report: &'a ReportDocument, key: &str, strand: &str, name: &str) -> &'a FieldValue {
    report
        .entry(key)
        .and_then(|entry| entry.get(strand))
        .and_then(ReportValue::as_strand)
        .and_then(|fields| fields.get(name))
        .expect("strand field present")
}

// =============================================================================
// Report Shape Tests
// =============================================================================

#[tokio::test]
async fn test_one_entry_per_country_then_world() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    let keys: Vec<&str> = outcome.report.data.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["TCD", "SSD", "SYR", WORLD_KEY]);
    assert_eq!(outcome.report.country_count(), 3);
    assert_eq!(outcome.summary.countries, 3);
}

#[tokio::test]
async fn test_outer_join_fills_missing_with_null() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");
    let report = &outcome.report;

    // SYR is absent from the displacement source.
    assert_eq!(
        strand_field(report, "SYR", "Strand_01_Displacement", "IDPs"),
        &FieldValue::Null
    );
    // Empty cell in a loaded row.
    assert_eq!(
        strand_field(report, "TCD", "Strand_01_Displacement", "Refugees"),
        &FieldValue::Null
    );
    assert_eq!(
        strand_field(report, "TCD", "Strand_01_Displacement", "IDPs"),
        &FieldValue::Integer(381289)
    );
}

#[tokio::test]
async fn test_duplicate_rows_keep_first() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    assert_eq!(
        strand_field(&outcome.report, "SSD", "Strand_01_Displacement", "IDPs"),
        &FieldValue::Integer(2_000_000)
    );
    let displacement = outcome
        .summary
        .sources
        .iter()
        .find(|s| s.name == "displacement")
        .unwrap();
    assert_eq!(displacement.keying.duplicates, 1);
}

#[tokio::test]
async fn test_unmatched_keys_are_reported() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    let unmatched: Vec<(&str, &str)> = outcome.summary.unmatched().collect();
    assert_eq!(unmatched, vec![("population", "Atlantis")]);
    assert!(outcome.report.entry("Atlantis").is_none());
}

#[tokio::test]
async fn test_conditional_strand_only_where_condition_holds() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");
    let report = &outcome.report;

    assert!(report.entry("TCD").unwrap().contains_key("Strand_02_Africa_Funding"));
    assert!(report.entry("SSD").unwrap().contains_key("Strand_02_Africa_Funding"));
    assert!(!report.entry("SYR").unwrap().contains_key("Strand_02_Africa_Funding"));
    // WORLD carries every strand.
    assert!(report.world().unwrap().contains_key("Strand_02_Africa_Funding"));
}

// =============================================================================
// Derived Metric Tests
// =============================================================================

#[tokio::test]
async fn test_percent_metric_and_null_propagation() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");
    let report = &outcome.report;

    match strand_field(report, "TCD", "Strand_01_Displacement", "IDPShare") {
        FieldValue::Float(share) => {
            assert!((share - 381289.0 / 18278.5 * 100.0).abs() < 1e-9);
        }
        other => panic!("Expected float share, got {:?}", other),
    }
    assert_eq!(
        strand_field(report, "SYR", "Strand_01_Displacement", "IDPShare"),
        &FieldValue::Null
    );
    assert_eq!(outcome.summary.derived_fields, 1);
}

// =============================================================================
// WORLD Aggregation Tests
// =============================================================================

#[tokio::test]
async fn test_world_sums_skip_nulls() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");
    let report = &outcome.report;

    assert_eq!(field(report, WORLD_KEY, "PopTotal"), &FieldValue::Float(52594.25));
    assert_eq!(
        strand_field(report, WORLD_KEY, "Strand_01_Displacement", "IDPs"),
        &FieldValue::Integer(2_381_289)
    );
    // No aggregation declared.
    assert_eq!(
        strand_field(report, WORLD_KEY, "Strand_01_Displacement", "Refugees"),
        &FieldValue::Null
    );

    let idps = &outcome.summary.world["IDPs"];
    assert_eq!(idps.included, 2);
    assert_eq!(idps.excluded_nulls, 1);
}

// =============================================================================
// Degraded Source Tests
// =============================================================================

#[tokio::test]
async fn test_failed_source_degrades_to_nulls() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    let funding = outcome
        .summary
        .sources
        .iter()
        .find(|s| s.name == "funding")
        .unwrap();
    assert!(!funding.loaded);
    assert_eq!(funding.error_kind, Some("resource_not_found"));
    assert_eq!(outcome.summary.loaded(), 2);
    assert_eq!(outcome.summary.failed(), 1);

    assert_eq!(
        strand_field(&outcome.report, "TCD", "Strand_02_Africa_Funding", "Funding"),
        &FieldValue::Null
    );
}

#[tokio::test]
async fn test_corrupt_source_degrades_to_nulls() {
    let (dir, config) = setup();
    // Key column renamed, so the extract no longer matches its descriptor.
    create_test_file(dir.path(), "displacement.tsv", &DISPLACEMENT.replace("ISO3", "Code"));
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    let displacement = outcome
        .summary
        .sources
        .iter()
        .find(|s| s.name == "displacement")
        .unwrap();
    assert!(!displacement.loaded);
    assert_eq!(displacement.error_kind, Some("resource_corrupt"));

    let report = &outcome.report;
    for code in ["TCD", "SSD", "SYR"] {
        assert_eq!(strand_field(report, code, "Strand_01_Displacement", "IDPs"), &FieldValue::Null);
        assert_eq!(strand_field(report, code, "Strand_01_Displacement", "IDPShare"), &FieldValue::Null);
    }
    assert_eq!(field(report, "TCD", "PopTotal"), &FieldValue::Float(18278.5));
    assert_eq!(outcome.summary.world["IDPs"].included, 0);
}

#[tokio::test]
async fn test_all_sources_failing_is_an_error() {
    let (dir, _) = setup();
    fs::remove_file(dir.path().join("population.csv")).unwrap();
    fs::remove_file(dir.path().join("displacement.tsv")).unwrap();
    let config = PipelineConfig::load(dir.path().join("humdata.toml")).unwrap();

    let result = Pipeline::new(config).run().await;
    assert!(matches!(result, Err(HumdataError::NoSourcesAvailable { failed: 3 })));
}

// =============================================================================
// Provenance Tests
// =============================================================================

#[tokio::test]
async fn test_metadata_mirrors_layout() {
    let (_dir, config) = setup();
    let outcome = Pipeline::new(config).run().await.expect("Run failed");
    let metadata = &outcome.report.metadata;

    match &metadata["PopTotal"] {
        MetadataValue::Field(Some(provenance)) => {
            assert_eq!(provenance.source_key, "WPP");
            assert_eq!(provenance.source_org, "UN DESA Population Division");
            assert_eq!(provenance.update_frequency, "Every year");
        }
        other => panic!("Expected PopTotal provenance, got {:?}", other),
    }

    match &metadata["Strand_01_Displacement"] {
        MetadataValue::Strand(fields) => {
            assert_eq!(fields.len(), 3);
            assert_eq!(fields["IDPs"], None);
            // Derived from PopTotal, the only input with provenance.
            let share = fields["IDPShare"].as_ref().expect("derived provenance");
            assert!(share.calculation.is_some());
        }
        other => panic!("Expected strand metadata, got {:?}", other),
    }
}

// =============================================================================
// Publishing Tests
// =============================================================================

#[tokio::test]
async fn test_publish_round_trips_values() {
    let (dir, config) = setup();
    let outcome = Pipeline::new(config)
        .run_and_publish(None)
        .await
        .expect("Run failed");

    let output = dir.path().join("out/report.json");
    assert_eq!(outcome.summary.output.as_deref(), Some(output.as_path()));

    let reloaded = ReportDocument::load(&output).expect("Report should reload");
    assert_eq!(reloaded, outcome.report);
    assert_eq!(field(&reloaded, "TCD", "PopTotal"), &FieldValue::Float(18278.5));
}

#[tokio::test]
async fn test_cancelled_run_keeps_previous_report() {
    let (dir, config) = setup();
    let output = create_test_file(dir.path(), "previous.json", "{\"data\": {}, \"metadata\": {}}");

    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = Pipeline::new(config)
        .with_cancel(cancel)
        .run_and_publish(Some(&output))
        .await;

    assert!(matches!(result, Err(HumdataError::Cancelled)));
    let previous = fs::read_to_string(&output).unwrap();
    assert_eq!(previous, "{\"data\": {}, \"metadata\": {}}");
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_config_rejects_unknown_layout_field() {
    let broken = CONFIG.replace("plain = [\"PopTotal\"]", "plain = [\"PopTotal\", \"Nope\"]");
    let result = PipelineConfig::from_toml_str(&broken, Path::new("."));
    assert!(matches!(result, Err(HumdataError::UnknownField { .. })));
}

#[test]
fn test_config_rejects_conflicting_sources() {
    let broken = CONFIG.replace("column = \"Refugees\"", "column = \"Refugees\"\nname = \"PopTotal\"");
    let result = PipelineConfig::from_toml_str(&broken, Path::new("."));
    assert!(matches!(result, Err(HumdataError::SchemaConflict { .. })));
}

#[test]
fn test_config_rejects_numeric_rules_over_text() {
    let ranked = CONFIG.replace(
        "[report]",
        "[[metrics]]\nname = \"RegionRank\"\nrule = \"rank\"\nfield = \"Region\"\n\n[report]",
    );
    let result = PipelineConfig::from_toml_str(&ranked, Path::new("."));
    assert!(matches!(result, Err(HumdataError::IncompatibleField { ref field, .. }) if field == "Region"));

    let summed = CONFIG.replace("IDPs = \"sum\"", "IDPs = \"sum\"\nRegion = \"sum\"");
    let result = PipelineConfig::from_toml_str(&summed, Path::new("."));
    assert!(matches!(result, Err(HumdataError::IncompatibleField { ref field, .. }) if field == "Region"));
}

// =============================================================================
// Demo Configuration Tests
// =============================================================================

fn demo_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/humdata.toml")
}

#[tokio::test]
async fn test_demo_config_runs() {
    let config = PipelineConfig::load(demo_config()).expect("Demo config should load");
    let outcome = Pipeline::new(config).run().await.expect("Run failed");

    assert_eq!(outcome.summary.failed(), 0);
    assert_eq!(outcome.summary.countries, 9);
    assert_eq!(outcome.summary.unmatched().count(), 0);

    let report = &outcome.report;
    // Niger has no displacement row; its rank label stays null.
    assert_eq!(
        strand_field(report, "NER", "Strand_01_Displacement", "IDPRankLabel"),
        &FieldValue::Null
    );
    assert_eq!(
        strand_field(report, "SDN", "Strand_01_Displacement", "IDPRankLabel"),
        &FieldValue::Text("1st".into())
    );
    // Population is in thousands, so the share reads per 100,000 people.
    match strand_field(report, "SDN", "Strand_01_Displacement", "IDPShare") {
        FieldValue::Float(share) => {
            let per_100k = 9_053_000.0 / (50_448.963 * 1000.0) * 100_000.0;
            assert!((share - per_100k).abs() < 1e-6);
        }
        other => panic!("Expected float share, got {:?}", other),
    }
    match &report.metadata["Strand_01_Displacement"] {
        MetadataValue::Strand(fields) => {
            let share = fields["IDPShare"].as_ref().expect("derived provenance");
            assert!(share.calculation.as_deref().unwrap_or("").contains("per 100,000"));
        }
        other => panic!("Expected strand metadata, got {:?}", other),
    }
    // Sudan and Syria have no appeal in the funding extract.
    assert!(!report.entry("SDN").unwrap().contains_key("Strand_02_Response_Plan"));
    assert!(report.entry("TCD").unwrap().contains_key("Strand_02_Response_Plan"));
}
