//! Run command - execute the pipeline and publish the report.

use std::path::PathBuf;

use colored::Colorize;
use humdata::{CancelFlag, Pipeline, PipelineConfig, RunSummary};

pub fn run(
    config_path: PathBuf,
    output: Option<PathBuf>,
    json_output: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(&config_path)?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling; the previous report is kept");
        handler_flag.cancel();
    })?;

    if !json_output {
        println!(
            "{} {} ({} sources)",
            "Running".cyan().bold(),
            config_path.display().to_string().white(),
            config.sources.len()
        );
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let pipeline = Pipeline::new(config).with_cancel(cancel);
    let outcome = runtime.block_on(pipeline.run_and_publish(output.as_deref()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    } else {
        print_summary(&outcome.summary, verbose);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    println!();
    println!("{}", "Sources:".yellow().bold());
    for source in &summary.sources {
        if source.loaded {
            println!(
                "  {} {} ({} rows)",
                "✓".green(),
                source.name.white(),
                source.rows
            );
        } else {
            println!(
                "  {} {} [{}]",
                "✗".red(),
                source.name.white(),
                source.error_kind.unwrap_or("error")
            );
            if let Some(error) = &source.error {
                println!("      {}", error.dimmed());
            }
        }
        if source.keying.duplicates > 0 {
            println!(
                "      {} duplicate row(s) discarded",
                source.keying.duplicates.to_string().yellow()
            );
        }
        if verbose {
            for (raw, code, confidence) in &source.keying.fuzzy_matches {
                println!("      {} '{}' → {} ({}%)", "~".blue(), raw, code, confidence);
            }
        }
    }

    let unmatched: Vec<_> = summary.unmatched().collect();
    if !unmatched.is_empty() {
        println!();
        println!("{}", "Unmatched keys:".yellow().bold());
        for (source, key) in unmatched {
            println!("  {}: {}", source, key.red());
        }
    }

    let partial: Vec<_> = summary
        .world
        .iter()
        .filter(|(_, outcome)| outcome.excluded_nulls > 0)
        .collect();
    if !partial.is_empty() {
        println!();
        println!("{}", "WORLD aggregates with missing values:".yellow().bold());
        for (field, outcome) in partial {
            println!(
                "  {}: {} included, {} null",
                field,
                outcome.included,
                outcome.excluded_nulls.to_string().yellow()
            );
        }
    }

    println!();
    println!(
        "{} {} countries, {} fields (+{} derived), {}/{} sources loaded",
        "Report:".green().bold(),
        summary.countries,
        summary.fields,
        summary.derived_fields,
        summary.loaded(),
        summary.sources.len()
    );
    if let Some(output) = &summary.output {
        println!("  Written to {}", output.display().to_string().white());
    }
}
