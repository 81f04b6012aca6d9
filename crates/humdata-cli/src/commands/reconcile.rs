//! Match command - reconcile a raw country value.

use std::path::PathBuf;

use colored::Colorize;
use humdata::{CountryMatcher, CountryRegistry, HumdataError, PipelineConfig};

pub fn run(
    name: String,
    config_path: Option<PathBuf>,
    countries: Option<PathBuf>,
    min_confidence: Option<u8>,
    _verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, configured) = match (config_path, countries) {
        (Some(path), _) => {
            let config = PipelineConfig::load(&path)?;
            (config.country_registry()?, Some(config.matcher()))
        }
        (None, Some(csv)) => (CountryRegistry::from_csv(&csv)?, None),
        (None, None) => return Err("Must specify --config or --countries".into()),
    };

    let matcher = match min_confidence {
        Some(threshold) => CountryMatcher::new(threshold),
        None => configured.unwrap_or_default(),
    };

    match matcher.reconcile(&name, &registry) {
        Ok(found) => {
            println!(
                "{} {} ({}) confidence {}",
                "Match:".green().bold(),
                found.country.code.white().bold(),
                found.country.name,
                found.confidence
            );
            Ok(())
        }
        Err(HumdataError::NoMatch {
            best,
            confidence,
            threshold,
            ..
        }) => {
            println!("{} '{}'", "No match:".red().bold(), name);
            if let Some(best) = best {
                println!(
                    "  Closest: {} (confidence {} < {})",
                    best.yellow(),
                    confidence,
                    threshold
                );
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
