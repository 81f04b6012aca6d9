//! Inspect command - load a single source the way the serving layer does.

use std::path::PathBuf;

use colored::Colorize;
use humdata::PipelineConfig;

pub fn run(
    config_path: PathBuf,
    source_name: String,
    rows: usize,
    country: Option<String>,
    json_output: bool,
    _verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(&config_path)?;
    let descriptor = config
        .sources
        .iter()
        .find(|s| s.name == source_name)
        .ok_or_else(|| {
            let known: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
            format!(
                "Unknown source '{}'. Configured sources: {}",
                source_name,
                known.join(", ")
            )
        })?;

    let outcome = config.loader().load(descriptor);
    let fingerprint = outcome.fingerprint.clone();
    let (success, table, provenance) = outcome.into_response();
    let table = match (table, country) {
        (Ok(table), Some(country)) => table
            .fuzzy_filter_by_key(&country, &config.matcher())
            .map_err(|e| e.to_string()),
        (table, _) => table,
    };

    if json_output {
        let body = match &table {
            Ok(table) => serde_json::json!({
                "fields": table.fields,
                "rows": table.rows.iter().take(rows).map(|r| serde_json::json!({
                    "key": r.key,
                    "values": r.values,
                })).collect::<Vec<_>>(),
                "row_count": table.row_count(),
            }),
            Err(message) => serde_json::json!({ "error": message }),
        };
        let response = serde_json::json!({
            "success": success,
            "result": body,
            "metadata": provenance,
            "fingerprint": fingerprint,
        });
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match table {
        Ok(table) => {
            println!(
                "{} {} ({} rows)",
                "Loaded".green().bold(),
                source_name.white(),
                table.row_count()
            );
            if let Some(provenance) = &provenance {
                println!(
                    "  {} {} / {} / {} / {}",
                    "Provenance:".yellow(),
                    provenance.source_key,
                    provenance.source_org,
                    provenance.extract_date,
                    provenance.update_frequency
                );
            }
            if let Some(fingerprint) = &fingerprint {
                println!("  {} {}", "Fingerprint:".yellow(), fingerprint.dimmed());
            }
            println!();
            println!("  {}", format!("key | {}", table.fields.join(" | ")).bold());
            for record in table.rows.iter().take(rows) {
                let values: Vec<String> = record.values.values().map(|v| v.to_string()).collect();
                println!("  {} | {}", record.key.cyan(), values.join(" | "));
            }
            if table.row_count() > rows {
                println!("  {}", format!("... {} more", table.row_count() - rows).dimmed());
            }
        }
        Err(message) => {
            println!("{} {}", "Unavailable:".red().bold(), message);
        }
    }

    Ok(())
}
