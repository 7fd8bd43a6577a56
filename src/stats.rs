// Copyright 2024-2026 The jitdiff authors

//! Process-wide counters.
//!
//! Only the writer increments them, so there is no contended read-modify-write
//! cycle to worry about; atomics make the end-of-run snapshot safe to read
//! from the main thread while the writer is still draining.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    refs: AtomicUsize,
    mutants: AtomicUsize,
    diffs: AtomicUsize,
    mutation_failures: AtomicUsize,
    compilation_failures: AtomicUsize,
    mutant_timeouts: AtomicUsize,
    all_timeouts: AtomicUsize,
}

macro_rules! counter {
    ($get:ident, $inc:ident, $field:ident) => {
        pub fn $get(&self) -> usize {
            self.$field.load(Ordering::Relaxed)
        }

        /// Increment and return the pre-increment value, which serves as the
        /// next dense id for this bucket.
        pub fn $inc(&self) -> usize {
            self.$field.fetch_add(1, Ordering::Relaxed)
        }
    };
}

impl Stats {
    counter!(ref_count, inc_ref_count, refs);
    counter!(mut_count, inc_mut_count, mutants);
    counter!(diff_count, inc_diff_count, diffs);
    counter!(mutation_failure_count, inc_mutation_failure_count, mutation_failures);
    counter!(
        compilation_failure_count,
        inc_compilation_failure_count,
        compilation_failures
    );
    counter!(mutant_timeout_count, inc_mutant_timeout_count, mutant_timeouts);
    counter!(timeout_count, inc_timeout_count, all_timeouts);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increments_return_dense_ids() {
        let stats = Stats::default();
        assert_eq!(stats.inc_diff_count(), 0);
        assert_eq!(stats.inc_diff_count(), 1);
        assert_eq!(stats.diff_count(), 2);
        assert_eq!(stats.ref_count(), 0);
    }
}
