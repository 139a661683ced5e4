//! Minimal runner CLI.
//!
//! Lives in the library so argument parsing and command logic can be
//! tested; `main.rs` only sets up logging and calls [`run_cli`].

mod args;
mod commands;
mod output;

pub use args::{Args, Command, DEFAULT_VERIFY_UNTIL};
pub use commands::{execute_run, run_cli, run_digest, stop_condition, RunReport};
pub use output::{format_run_report, hex_digest, print_help, print_version};
