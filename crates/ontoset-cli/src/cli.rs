use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ontoset",
    about = "Ontoset: load, inspect and exercise dynamic-classification domain models",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a domain document and report what it defines
    Check {
        /// Domain document JSON path
        domain: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the types that specialize one type of a domain
    Types {
        /// Domain document JSON path
        domain: String,

        /// Type id to query
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a domain model, one line per type
    Render {
        /// Domain document JSON path
        domain: String,

        /// Output the model view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a scenario against a fresh world of a domain
    Run {
        /// Domain document JSON path
        domain: String,

        /// Scenario JSON path
        scenario: String,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
}
