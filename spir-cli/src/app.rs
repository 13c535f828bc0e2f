use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// spir - static program analysis over the SPIR intermediate representation
#[derive(Debug, Parser)]
#[command(name = "spir", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Set logging level (debug, info, warn, error).
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Show timestamps in logs.
    #[arg(long, global = true)]
    pub log_time: bool,

    /// Show source locations in logs.
    #[arg(long, global = true)]
    pub log_source: bool,

    /// Show the originating module in logs.
    #[arg(long, global = true)]
    pub log_func: bool,

    /// Use JSON format for logging.
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze a SPIR file.
    Analyze {
        /// Path to the SPIR container.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Link multiple SPIR files into one unit.
    Link {
        /// Paths to the SPIR containers, first definition wins for
        /// declarations.
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Where to write the linked unit.
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,
    },
}
