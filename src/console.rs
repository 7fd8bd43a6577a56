// Copyright 2024-2026 The jitdiff authors

//! Messages printed for the operator, as opposed to the tracing log.

use std::time::Duration;

use console::style;

use crate::stats::Stats;

pub fn print_error(msg: &str) {
    println!("{}: {}", style("error").bold().red(), msg);
}

/// The block printed after a normal stop.
pub fn print_summary(stats: &Stats, prog_timeout: Duration, elapsed: Duration) {
    // humantime prints sub-second noise unless we truncate to whole seconds.
    let elapsed = Duration::from_secs(elapsed.as_secs());
    println!(
        "Found {}/{} differences in {}",
        style(stats.diff_count()).bold().green(),
        stats.mut_count(),
        humantime::format_duration(elapsed),
    );
    println!("- {} generated references", stats.ref_count());
    println!("- {} generated mutants", stats.mut_count());
    println!("- {} mutation failures", stats.mutation_failure_count());
    println!(
        "- {} mutant compilation failures",
        stats.compilation_failure_count()
    );
    println!(
        "- {} mutant timeouts ({}s)",
        stats.mutant_timeout_count(),
        prog_timeout.as_secs()
    );
    println!(
        "- {} all timeouts ({}s)",
        stats.timeout_count(),
        prog_timeout.as_secs()
    );
}

pub fn print_abnormal() {
    println!("{}", style("Exited abnormally").bold().red());
}
