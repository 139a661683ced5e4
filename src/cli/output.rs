//! CLI output formatting.

use crate::rules::grain_hill::{AIR, REGOLITH};

use super::commands::RunReport;

/// Print version information.
pub fn print_version() {
    println!("grainhill {}", env!("CARGO_PKG_VERSION"));
}

/// Print help message.
pub fn print_help() {
    println!(
        r"grainhill - CTS-CA hillslope grain engine

USAGE:
    grainhill <COMMAND> [OPTIONS]

COMMANDS:
    run <config.yaml>           Run a simulation and print a summary
        --until <T>             Simulated-time limit (default: 1000)
        --events <N>            Transition budget
        --seed <N>              Override the configured seed
        -v, --verbose           Print the column profile

    verify <config.yaml>        Compare journal digests across runs
        --runs <N>              Number of runs (default: 3)
        --until <T>             Simulated-time limit (default: 1000)

    validate <config.yaml>      Check a configuration without running it

    help                        Show this help message
    version                     Show version information

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=grainhill=debug) to control log output.
"
    );
}

/// Hex form of a 32-byte digest.
#[must_use]
pub fn hex_digest(digest: &[u8; 32]) -> String {
    blake3::Hash::from(*digest).to_hex().to_string()
}

/// Lines of the run summary.
#[must_use]
pub fn format_run_report(report: &RunReport, verbose: bool) -> Vec<String> {
    let outcome = &report.outcome;
    let stats = &report.stats;
    let mut lines = vec![
        format!("Status:       {:?}", outcome.status),
        format!("Final time:   {}", outcome.final_time),
        format!("Transitions:  {}", outcome.event_count),
        format!("Forcing:      {}", outcome.forcing_count),
        format!(
            "Queue:        {} live / {} entries, {} stale discarded",
            stats.live_events, stats.queued_entries, stats.stale_discarded
        ),
        String::new(),
        "State counts:".to_string(),
    ];

    for (state, count) in report.snapshot.state_counts() {
        let name = report
            .state_names
            .get(state.index())
            .and_then(Option::as_deref)
            .unwrap_or("-");
        lines.push(format!("  {:>3} {:<18} {count}", state.0, name));
    }

    if verbose {
        lines.push(String::new());
        lines.push("Column profile (col, elevation, regolith):".to_string());
        for profile in report.snapshot.column_profiles(AIR, REGOLITH) {
            lines.push(format!(
                "  {:>4} {:>8.1} {:>4}",
                profile.col, profile.elevation, profile.regolith_thickness
            ));
        }
    }
    lines
}

/// Print the run summary.
pub fn print_run_report(report: &RunReport, verbose: bool) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for line in format_run_report(report, verbose) {
        println!("{line}");
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Print digests from a `verify` run.
pub fn print_verify_result(digests: &[[u8; 32]], identical: bool) {
    for (i, digest) in digests.iter().enumerate() {
        println!("  run {:>2}: {}", i + 1, hex_digest(digest));
    }
    if identical {
        println!("✓ {} runs produced identical journals", digests.len());
    } else {
        println!("✗ journals differ between runs");
    }
}
