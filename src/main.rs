//! Lockwatch: Git LFS lock synchronization for working copies.
//!
//! This is the main entry point for the `lockwatch` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes.

mod cli;
mod commands;
pub mod asset_index;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lfs;
pub mod ordering;
pub mod parse;
pub mod process;
pub mod repo;
pub mod settings;
pub mod table;

#[cfg(test)]
pub mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
