//! CLI command handlers.
//!
//! Each handler returns an `ExitCode`; the work itself lives in small
//! `SimResult` functions so it can be tested without capturing stdout.

use std::path::Path;
use std::process::ExitCode;

use tracing::{info, warn};

use crate::config::SimConfig;
use crate::engine::{EngineStats, RunOutcome, SimEngine, SimTime, StopCondition};
use crate::error::{SimError, SimResult};
use crate::lattice::{LatticeSnapshot, NodeState};

use super::args::DEFAULT_VERIFY_UNTIL;
use super::output::{print_help, print_run_report, print_verify_result, print_version};
use super::{Args, Command};

/// Everything a finished `run` reports.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Engine counters.
    pub stats: EngineStats,
    /// Final lattice.
    pub snapshot: LatticeSnapshot,
    /// State names in code order, where declared.
    pub state_names: Vec<Option<String>>,
}

/// Main CLI entry point.
///
/// Dispatches to the appropriate command handler based on parsed arguments.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    match args.command {
        Command::Run {
            config_path,
            until,
            max_events,
            seed_override,
            verbose,
        } => run_simulation(&config_path, until, max_events, seed_override, verbose),
        Command::Verify {
            config_path,
            runs,
            until,
        } => verify_reproducibility(&config_path, runs, until),
        Command::Validate { config_path } => validate_config(&config_path),
        Command::Help => {
            print_help();
            ExitCode::SUCCESS
        }
        Command::Version => {
            print_version();
            ExitCode::SUCCESS
        }
    }
}

/// Stop condition for a `run` invocation.
///
/// With neither limit given the run stops at [`DEFAULT_VERIFY_UNTIL`].
///
/// # Errors
///
/// Returns a configuration error for a negative or non-finite time limit.
pub fn stop_condition(until: Option<f64>, max_events: Option<u64>) -> SimResult<StopCondition> {
    let until = match (until, max_events) {
        (None, None) => Some(DEFAULT_VERIFY_UNTIL),
        (until, _) => until,
    };
    let mut stop = StopCondition::never();
    if let Some(t) = until {
        let time = SimTime::try_new(t)
            .ok_or_else(|| SimError::config(format!("invalid time limit {t}")))?;
        stop = stop.with_until(time);
    }
    if let Some(n) = max_events {
        stop = stop.with_max_events(n);
    }
    Ok(stop)
}

/// Build an engine from `config` and run it once.
///
/// # Errors
///
/// Returns error if the engine cannot be built or the run hits a Jidoka
/// violation.
pub fn execute_run(config: &SimConfig, stop: &StopCondition) -> SimResult<RunReport> {
    let mut engine = SimEngine::from_config(config)?;
    let outcome = engine.advance_until(stop)?;
    let rules = engine.rules();
    let state_names = (0..rules.num_states())
        .map(|code| {
            u8::try_from(code)
                .ok()
                .and_then(|c| rules.state_name(NodeState(c)))
                .map(str::to_string)
        })
        .collect();
    Ok(RunReport {
        outcome,
        stats: engine.stats(),
        snapshot: engine.snapshot(),
        state_names,
    })
}

/// Journal digest of one run of `config` to `until`.
///
/// # Errors
///
/// Returns error if the run fails.
pub fn run_digest(config: &SimConfig, until: SimTime) -> SimResult<[u8; 32]> {
    let mut config = config.clone();
    config.reproducibility.record_journal = true;
    let mut engine = SimEngine::from_config(&config)?;
    engine.advance_until(&StopCondition::until(until))?;
    match engine.journal() {
        Some(journal) => journal.digest(),
        None => Err(SimError::invariant("journal missing after recorded run")),
    }
}

/// Run a simulation from a YAML file.
#[must_use]
pub fn run_simulation(
    path: &Path,
    until: Option<f64>,
    max_events: Option<u64>,
    seed_override: Option<u64>,
    verbose: bool,
) -> ExitCode {
    let result = SimConfig::load(path).and_then(|mut config| {
        if let Some(seed) = seed_override {
            config.reproducibility.seed = seed;
        }
        let stop = stop_condition(until, max_events)?;
        info!(config = %path.display(), seed = config.reproducibility.seed, "running");
        execute_run(&config, &stop)
    });

    match result {
        Ok(report) => {
            print_run_report(&report, verbose);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Run the same configuration `runs` times and compare journal digests.
#[must_use]
pub fn verify_reproducibility(path: &Path, runs: usize, until: f64) -> ExitCode {
    let result = SimConfig::load(path).and_then(|config| {
        let until = SimTime::try_new(until)
            .ok_or_else(|| SimError::config(format!("invalid time limit {until}")))?;
        (0..runs.max(1))
            .map(|_| run_digest(&config, until))
            .collect::<SimResult<Vec<_>>>()
    });

    match result {
        Ok(digests) => {
            let identical = digests.windows(2).all(|w| w[0] == w[1]);
            if !identical {
                warn!(runs = digests.len(), "journal digests differ between runs");
            }
            print_verify_result(&digests, identical);
            if identical {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Load and validate a configuration, building the engine without running
/// it.
#[must_use]
pub fn validate_config(path: &Path) -> ExitCode {
    match SimConfig::load(path).and_then(|config| SimEngine::from_config(&config)) {
        Ok(engine) => {
            println!(
                "✓ {}: {} nodes, {} links, {} states",
                path.display(),
                engine.lattice().num_nodes(),
                engine.lattice().num_links(),
                engine.rules().num_states()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {}: {e}", path.display());
            ExitCode::from(1)
        }
    }
}
