use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Grounded card-fraud risk assessment", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (TOML); missing file means built-in defaults
    #[arg(
        short,
        long,
        global = true,
        default_value = "assessor_config",
        help = "Config file to layer over the built-in defaults"
    )]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assess one transaction and write the result (default)
    Assess {
        /// Transaction JSON file
        #[arg(short, long)]
        transaction: Option<PathBuf>,

        /// Where to write the assessment JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop and rebuild the vector index first
        #[arg(long)]
        rebuild: bool,
    },
    /// Chunk, embed and index the policy document and historical cases
    Ingest {
        /// Drop the index before ingesting
        #[arg(long)]
        rebuild: bool,
    },
    /// Run a labelled dataset and write a metrics report
    Evaluate {
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Re-assess the first record this many times to measure action consistency
        #[arg(long, default_value_t = 0)]
        repeat: usize,
    },
}
