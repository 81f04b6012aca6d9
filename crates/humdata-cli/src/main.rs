//! humdata CLI - humanitarian data aggregation pipeline.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            json,
        } => commands::run::run(config, output, json, cli.verbose),

        Commands::Check { config } => commands::check::run(config, cli.verbose),

        Commands::Inspect {
            config,
            source,
            rows,
            country,
            json,
        } => commands::inspect::run(config, source, rows, country, json, cli.verbose),

        Commands::Match {
            name,
            config,
            countries,
            min_confidence,
        } => commands::reconcile::run(name, config, countries, min_confidence, cli.verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(verbose)
        .init();
}
