//! Binary crate for the `cdo` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Mapping failures to process exit codes

use std::process::ExitCode;

use cdo_core::FetchError;
use clap::Parser;

mod cli;

/// Exit status when the service answered but had no rows for the request.
const EXIT_NO_DATA: u8 = 2;
const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = cli::Cli::parse();
    cli::init_tracing(cmd.verbose);

    match cmd.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FetchError>() {
        Some(fetch) if fetch.is_no_data() => EXIT_NO_DATA,
        _ => EXIT_FAILURE,
    }
}
