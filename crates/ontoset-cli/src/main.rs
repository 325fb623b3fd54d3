//! Ontoset CLI: the `ontoset` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { domain, json } => commands::check::run(domain, json),

        Commands::Types { domain, id, json } => commands::types::run(domain, id, json),

        Commands::Render { domain, json } => commands::render::run(domain, json),

        Commands::Run {
            domain,
            scenario,
            json,
        } => commands::run::run(domain, scenario, json),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
