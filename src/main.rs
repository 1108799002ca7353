//! rts-verify CLI entry point.
//!
//! Verifies the actions taken by rollback to stable from the verbose
//! messages in a log file. Prints nothing and exits 0 when no violation is
//! found; otherwise prints the first violation with its line and exits 1.
//!
//! Set `RUST_LOG=info` (or `debug`) for progress output on stderr.

use clap::Parser;
use rts_verify::{verify_file, VerifierConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Verify actions taken by rollback to stable from verbose messages
#[derive(Parser, Debug)]
#[command(name = "rts-verify")]
#[command(version, about, long_about = None)]
struct Cli {
    /// The log file to parse verbose messages from
    file: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match verify_file(&VerifierConfig::default(), &cli.file) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
