//! CLI argument parsing.
//!
//! Hand-rolled parser over any string iterator so it can be tested without
//! touching `std::env`.

use std::path::PathBuf;
use std::str::FromStr;

/// Default simulated-time limit for `verify` runs.
pub const DEFAULT_VERIFY_UNTIL: f64 = 1.0e3;

/// CLI arguments container.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    /// The command to execute.
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a simulation and print a summary.
    Run {
        /// Path to the configuration YAML file.
        config_path: PathBuf,
        /// Simulated-time limit.
        until: Option<f64>,
        /// Transition budget.
        max_events: Option<u64>,
        /// Optional seed override.
        seed_override: Option<u64>,
        /// Print the per-column profile.
        verbose: bool,
    },
    /// Run a configuration several times and compare journal digests.
    Verify {
        /// Path to the configuration YAML file.
        config_path: PathBuf,
        /// Number of runs.
        runs: usize,
        /// Simulated-time limit of each run.
        until: f64,
    },
    /// Load and validate a configuration without running it.
    Validate {
        /// Path to the configuration YAML file.
        config_path: PathBuf,
    },
    /// Show help
    Help,
    /// Show version
    Version,
}

impl Args {
    /// Parse command-line arguments from an iterator.
    ///
    /// The first item is the program name.
    #[must_use]
    pub fn parse_from<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse_from_vec(&args)
    }

    /// Parse command-line arguments from the environment.
    #[must_use]
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    fn parse_from_vec(args: &[String]) -> Self {
        if args.len() < 2 {
            return Self {
                command: Command::Help,
            };
        }

        let command = match args[1].as_str() {
            "run" => Self::parse_run_command(args),
            "verify" => Self::parse_verify_command(args),
            "validate" => Self::parse_validate_command(args),
            "-h" | "--help" | "help" => Command::Help,
            "-V" | "--version" | "version" => Command::Version,
            unknown => {
                eprintln!("Unknown command: {unknown}");
                Command::Help
            }
        };

        Self { command }
    }

    fn parse_run_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'run' command requires a config path");
            return Command::Help;
        }

        let mut until = None;
        let mut max_events = None;
        let mut seed_override = None;
        let mut verbose = false;

        let mut i = 3;
        while i < args.len() {
            match args[i].as_str() {
                "--until" => {
                    let Some(t) = flag_value(args, i, is_time) else {
                        return Command::Help;
                    };
                    until = Some(t);
                    i += 2;
                }
                "--events" => {
                    let Some(n) = flag_value(args, i, |_: &u64| true) else {
                        return Command::Help;
                    };
                    max_events = Some(n);
                    i += 2;
                }
                "--seed" => {
                    let Some(seed) = flag_value(args, i, |_: &u64| true) else {
                        return Command::Help;
                    };
                    seed_override = Some(seed);
                    i += 2;
                }
                "-v" | "--verbose" => {
                    verbose = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        Command::Run {
            config_path: PathBuf::from(&args[2]),
            until,
            max_events,
            seed_override,
            verbose,
        }
    }

    fn parse_verify_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'verify' command requires a config path");
            return Command::Help;
        }

        let mut runs = 3;
        let mut until = DEFAULT_VERIFY_UNTIL;

        let mut i = 3;
        while i < args.len() {
            match args[i].as_str() {
                "--runs" => {
                    let Some(n) = flag_value(args, i, |&n: &usize| n > 0) else {
                        return Command::Help;
                    };
                    runs = n;
                    i += 2;
                }
                "--until" => {
                    let Some(t) = flag_value(args, i, is_time) else {
                        return Command::Help;
                    };
                    until = t;
                    i += 2;
                }
                _ => i += 1,
            }
        }

        Command::Verify {
            config_path: PathBuf::from(&args[2]),
            runs,
            until,
        }
    }

    fn parse_validate_command(args: &[String]) -> Command {
        if args.len() < 3 {
            eprintln!("Error: 'validate' command requires a config path");
            return Command::Help;
        }

        Command::Validate {
            config_path: PathBuf::from(&args[2]),
        }
    }
}

fn is_time(t: &f64) -> bool {
    t.is_finite() && *t >= 0.0
}

/// Parse the value after the flag at `args[i]`, reporting a missing or
/// rejected value on stderr.
fn flag_value<T: FromStr>(args: &[String], i: usize, accept: impl Fn(&T) -> bool) -> Option<T> {
    let flag = &args[i];
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: '{flag}' requires a value");
        return None;
    };
    match raw.parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        _ => {
            eprintln!("Error: invalid value '{raw}' for '{flag}'");
            None
        }
    }
}
