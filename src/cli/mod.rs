//! CLI module for bitvault
//!
//! Provides command-line interface for:
//! - serve: Run the configured replica server
//! - check-config: Validate a configuration file
//! - catalog: Inspect a checksum catalog

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{catalog, check_config, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match run_command(cli.command) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = write_error(e.code_str(), e.message());
            Err(e)
        }
    }
}
