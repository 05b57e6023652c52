//! CLI argument definitions using clap
//!
//! Commands:
//! - bitvault serve --config <path>
//! - bitvault check-config --config <path>
//! - bitvault catalog --config <path> [--filename <name>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bitvault - replicated bit preservation for web archives
#[derive(Parser, Debug)]
#[command(name = "bitvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the configured replica until interrupted
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./bitvault.json")]
        config: PathBuf,
    },

    /// Validate a configuration file and exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./bitvault.json")]
        config: PathBuf,
    },

    /// Print checksum catalog entries
    Catalog {
        /// Path to configuration file
        #[arg(long, default_value = "./bitvault.json")]
        config: PathBuf,

        /// Print only this file's entry
        #[arg(long)]
        filename: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
