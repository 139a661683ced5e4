//! grainhill CLI - CTS-CA hillslope grain engine
//!
//! Command-line interface for running simulations.

use std::process::ExitCode;

use grainhill::cli::{run_cli, Args};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,grainhill=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli(Args::parse())
}
