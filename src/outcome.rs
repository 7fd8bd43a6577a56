// Copyright 2024-2026 The jitdiff authors

//! Results of running references and mutants, and the divergence decision.

use camino::{Utf8Path, Utf8PathBuf};
use strum::Display;

/// Exit code reserved to mean "the subprocess was killed by our deadline".
///
/// Never produced by a real process exit; adapters that synthesize results
/// (e.g. a remote runner) use the same value for their own timeouts.
pub const TIMEOUT_EXIT_CODE: i32 = 0xC0FFEE;

/// What one subprocess run produced: its exit code and combined stdout+stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub output: String,
}

impl RunResult {
    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

/// Everything a worker learned about one reference.
#[derive(Debug)]
pub enum TrialResult {
    /// The reference itself timed out; nothing to compare against.
    ReferenceTimeout { reference: Utf8PathBuf },
    /// The reference ran; zero or more mutant attempts followed.
    Normal {
        reference: Utf8PathBuf,
        ref_run: RunResult,
        mutants: Vec<MutantOutcome>,
    },
}

impl TrialResult {
    pub fn reference(&self) -> &Utf8Path {
        match self {
            TrialResult::ReferenceTimeout { reference } => reference,
            TrialResult::Normal { reference, .. } => reference,
        }
    }
}

/// One iteration of the mutation loop.
#[derive(Debug)]
pub enum MutantOutcome {
    /// The mutator rejected the reference.
    MutationFailed {
        mutant_dir: Utf8PathBuf,
        diagnostic: String,
    },
    /// The mutant was produced but did not compile.
    CompileFailed {
        mutant_file: Utf8PathBuf,
        mutation_log: String,
        diagnostic: String,
    },
    /// Both the reference and the mutant carried the timeout sentinel.
    BothTimedOut {
        mutant_file: Utf8PathBuf,
        mutation_log: String,
    },
    /// The mutant ran to completion.
    Executed {
        mutant_file: Utf8PathBuf,
        mutation_log: String,
        run: RunResult,
    },
}

impl MutantOutcome {
    /// Counts toward the K successful mutants a trial must collect.
    pub fn is_successful_attempt(&self) -> bool {
        matches!(
            self,
            MutantOutcome::Executed { .. } | MutantOutcome::BothTimedOut { .. }
        )
    }
}

/// Which observable differed between reference and mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DiffKind {
    #[strum(serialize = "return-code")]
    ReturnCode,
    #[strum(serialize = "prog-output")]
    ProgOutput,
}

/// The writer's verdict on one executed mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exit code and output both match; discard.
    Match,
    /// The mutant alone hit the deadline; not counted as a difference.
    MutantTimeout,
    /// A candidate miscompilation.
    Difference(DiffKind),
}

/// Decide whether an executed mutant diverged from its reference.
///
/// The both-timed-out case never reaches here; it is diverted in the trial.
pub fn compare_runs(ref_run: &RunResult, mut_run: &RunResult) -> Verdict {
    if ref_run.exit_code != mut_run.exit_code {
        if mut_run.timed_out() {
            Verdict::MutantTimeout
        } else {
            Verdict::Difference(DiffKind::ReturnCode)
        }
    } else if ref_run.output != mut_run.output {
        Verdict::Difference(DiffKind::ProgOutput)
    } else {
        Verdict::Match
    }
}
