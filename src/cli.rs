use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "surveytab")]
#[command(about = "Survey response aggregation and cross-tabulation engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario file and print the computed cross-tab tree
    Run {
        /// Path to a JSON scenario file
        scenario: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the date window an average resolves to for a reference date
    Window {
        /// Average id from the built-in registry
        average_id: String,

        /// Reference date (YYYY-MM-DD)
        reference: chrono::NaiveDate,
    },
}
