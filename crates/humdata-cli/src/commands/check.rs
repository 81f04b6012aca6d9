//! Check command - validate a configuration without any I/O on sources.

use std::path::PathBuf;

use colored::Colorize;
use humdata::PipelineConfig;

pub fn run(config_path: PathBuf, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(&config_path)?;
    let registry = config.country_registry()?;

    println!(
        "{} {}",
        "Configuration OK:".green().bold(),
        config_path.display().to_string().white()
    );
    println!("  Countries: {}", registry.len());
    println!("  Sources:   {}", config.sources.len());
    println!("  Metrics:   {}", config.metrics.len());
    println!("  Strands:   {}", config.report.strands.len());

    if verbose {
        println!();
        for source in &config.sources {
            let fields: Vec<&str> = source.fields.output_names();
            println!(
                "  {} {} → {}",
                source.name.cyan(),
                source.location.to_string().dimmed(),
                fields.join(", ")
            );
        }
        for (key, strand) in config.report.keyed_strands() {
            let condition = strand
                .condition
                .as_ref()
                .map(|c| format!(" (when {} = {})", c.field, c.equals))
                .unwrap_or_default();
            println!("  {}{}", key.yellow(), condition);
        }
    }

    Ok(())
}
