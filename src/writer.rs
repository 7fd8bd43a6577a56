// Copyright 2024-2026 The jitdiff authors

//! The single consumer of trial results.
//!
//! Runs on its own thread; nothing else touches the persisted layout or
//! advances the counters, so ids come out dense and monotonic without any
//! cross-thread coordination beyond the atomic loads in [Stats].
//!
//! Layout under `out_dir`:
//! ```text
//! differences/diffs.csv
//! differences/<diff_id>/{<reference files>, mutant/, reference.txt, mutant.txt}
//! mutation-failures/<mutf_id>/{<reference files>, mutant/mutation.err.txt}
//! compilation-failures/<compf_id>/{…, mutant/{mutation.txt, compilation.err.txt}}
//! mutant-timeouts/<mtmo_id>/{…, mutant/mutation.txt}
//! all-timeouts/<tmo_id>/{…, mutant/mutation.txt}
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::fsutil::{copy_top_level_files, move_dir};
use crate::outcome::{compare_runs, DiffKind, MutantOutcome, RunResult, TrialResult, Verdict};
use crate::stats::Stats;
use crate::Result;

/// Name of the relocated mutant directory inside every bucket.
const MUTANT_DIR_NAME: &str = "mutant";
/// The mutator's report, written next to the mutant on success paths.
const MUTATION_LOG_FILE: &str = "mutation.txt";
/// The mutator's diagnostics when it rejected the reference.
const MUTATION_ERR_FILE: &str = "mutation.err.txt";
/// The VM compiler's diagnostics for a mutant that did not compile.
const COMPILE_ERR_FILE: &str = "compilation.err.txt";

const DIFFS_CSV_HEADER: &str = "diff_id,ref_id,mut_id,diff_type,\
                                reference_return_code,reference_output_length,\
                                mutant_return_code,mutant_output_length\n";

pub struct ResultWriter {
    diff_dir: Utf8PathBuf,
    diffs_csv: Utf8PathBuf,
    mutf_dir: Utf8PathBuf,
    compf_dir: Utf8PathBuf,
    mtmo_dir: Utf8PathBuf,
    tmo_dir: Utf8PathBuf,
    save_timeouts: bool,
    stats: Arc<Stats>,
}

impl ResultWriter {
    /// Create the bucket directories and the CSV with its header line.
    pub fn new(out_dir: &Utf8Path, stats: Arc<Stats>, save_timeouts: bool) -> Result<ResultWriter> {
        let writer = ResultWriter {
            diff_dir: out_dir.join("differences"),
            diffs_csv: out_dir.join("differences/diffs.csv"),
            mutf_dir: out_dir.join("mutation-failures"),
            compf_dir: out_dir.join("compilation-failures"),
            mtmo_dir: out_dir.join("mutant-timeouts"),
            tmo_dir: out_dir.join("all-timeouts"),
            save_timeouts,
            stats,
        };
        for dir in [
            &writer.diff_dir,
            &writer.mutf_dir,
            &writer.compf_dir,
            &writer.mtmo_dir,
            &writer.tmo_dir,
        ] {
            fs::create_dir_all(dir).with_context(|| format!("create bucket directory {dir}"))?;
        }
        fs::write(&writer.diffs_csv, DIFFS_CSV_HEADER)
            .with_context(|| format!("write {}", writer.diffs_csv))?;
        Ok(writer)
    }

    /// Classify one trial, persist what is interesting, and reclaim the
    /// reference directory.
    pub fn append(&mut self, trial: TrialResult) -> Result<()> {
        let ref_id = self.stats.inc_ref_count();
        let ref_dir = trial
            .reference()
            .parent()
            .context("reference file has no parent directory")?
            .to_owned();
        if let TrialResult::Normal {
            reference,
            ref_run,
            mutants,
        } = trial
        {
            for outcome in mutants {
                self.classify(ref_id, &reference, &ref_run, outcome)?;
            }
        }
        // Everything worth keeping has been copied out by now.
        fs::remove_dir_all(&ref_dir).with_context(|| format!("remove {ref_dir}"))?;
        Ok(())
    }

    fn classify(
        &mut self,
        ref_id: usize,
        reference: &Utf8Path,
        ref_run: &RunResult,
        outcome: MutantOutcome,
    ) -> Result<()> {
        let mut_id = self.stats.inc_mut_count();
        match outcome {
            MutantOutcome::MutationFailed {
                mutant_dir: _,
                diagnostic,
            } => {
                let mutf_id = self.stats.inc_mutation_failure_count();
                let bucket = self.mutf_dir.join(mutf_id.to_string());
                info!(mut_id, mutf_id, %bucket, "mutation error");
                // The failed attempt's directory holds nothing worth keeping.
                let mutant_dir = self.stage_bucket(reference, &bucket, None)?;
                fs::write(mutant_dir.join(MUTATION_ERR_FILE), diagnostic)
                    .context("write mutation diagnostics")?;
            }
            MutantOutcome::CompileFailed {
                mutant_file,
                mutation_log,
                diagnostic,
            } => {
                let compf_id = self.stats.inc_compilation_failure_count();
                let bucket = self.compf_dir.join(compf_id.to_string());
                info!(mut_id, compf_id, %bucket, "mutant compilation error");
                let mutant_dir = self.stage_bucket(
                    reference,
                    &bucket,
                    Some(mutant_file.parent().context("mutant file has no parent")?),
                )?;
                fs::write(mutant_dir.join(MUTATION_LOG_FILE), mutation_log)
                    .context("write mutation log")?;
                fs::write(mutant_dir.join(COMPILE_ERR_FILE), diagnostic)
                    .context("write compiler diagnostics")?;
            }
            MutantOutcome::BothTimedOut {
                mutant_file,
                mutation_log,
            } => {
                let tmo_id = self.stats.inc_timeout_count();
                if !self.save_timeouts {
                    return Ok(());
                }
                let bucket = self.tmo_dir.join(tmo_id.to_string());
                info!(mut_id, tmo_id, %bucket, "reference and mutant both timed out");
                let mutant_dir = self.stage_bucket(
                    reference,
                    &bucket,
                    Some(mutant_file.parent().context("mutant file has no parent")?),
                )?;
                fs::write(mutant_dir.join(MUTATION_LOG_FILE), mutation_log)
                    .context("write mutation log")?;
            }
            MutantOutcome::Executed {
                mutant_file,
                mutation_log,
                run,
            } => {
                self.classify_executed(ref_id, mut_id, reference, ref_run, &mutant_file, mutation_log, &run)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_executed(
        &mut self,
        ref_id: usize,
        mut_id: usize,
        reference: &Utf8Path,
        ref_run: &RunResult,
        mutant_file: &Utf8Path,
        mutation_log: String,
        mut_run: &RunResult,
    ) -> Result<()> {
        let mutant_dir = mutant_file.parent().context("mutant file has no parent")?;
        let kind = match compare_runs(ref_run, mut_run) {
            Verdict::Match => {
                debug!(mut_id, "mutant matches reference, discarding");
                return Ok(());
            }
            Verdict::MutantTimeout => {
                let mtmo_id = self.stats.inc_mutant_timeout_count();
                if !self.save_timeouts {
                    return Ok(());
                }
                let bucket = self.mtmo_dir.join(mtmo_id.to_string());
                info!(mut_id, mtmo_id, %bucket, "only the mutant timed out");
                let staged = self.stage_bucket(reference, &bucket, Some(mutant_dir))?;
                fs::write(staged.join(MUTATION_LOG_FILE), mutation_log)
                    .context("write mutation log")?;
                return Ok(());
            }
            Verdict::Difference(kind) => kind,
        };

        let diff_id = self.stats.inc_diff_count();
        warn!(mut_id, diff_id, %kind, "FOUND A DIFFERENCE");
        self.append_diff_row(diff_id, ref_id, mut_id, kind, ref_run, mut_run)?;

        let bucket = self.diff_dir.join(diff_id.to_string());
        let staged = self.stage_bucket(reference, &bucket, Some(mutant_dir))?;
        fs::write(staged.join(MUTATION_LOG_FILE), mutation_log).context("write mutation log")?;
        fs::write(
            bucket.join("reference.txt"),
            format!("Return code: {}\n{}", ref_run.exit_code, ref_run.output),
        )
        .context("write reference.txt")?;
        fs::write(
            bucket.join("mutant.txt"),
            format!("Return code: {}\n{}", mut_run.exit_code, mut_run.output),
        )
        .context("write mutant.txt")?;
        Ok(())
    }

    fn append_diff_row(
        &self,
        diff_id: usize,
        ref_id: usize,
        mut_id: usize,
        kind: DiffKind,
        ref_run: &RunResult,
        mut_run: &RunResult,
    ) -> Result<()> {
        let mut csv = OpenOptions::new()
            .append(true)
            .open(&self.diffs_csv)
            .with_context(|| format!("open {} for append", self.diffs_csv))?;
        writeln!(
            csv,
            "{diff_id},{ref_id},{mut_id},{kind},{},{},{},{}",
            ref_run.exit_code,
            ref_run.output.len(),
            mut_run.exit_code,
            mut_run.output.len(),
        )
        .context("append diff row")?;
        Ok(())
    }

    /// Populate a bucket: the reference's top-level files at the bucket root,
    /// and the offending mutant directory relocated to `<bucket>/mutant`
    /// (created empty when the attempt produced no mutant).
    fn stage_bucket(
        &self,
        reference: &Utf8Path,
        bucket: &Utf8Path,
        mutant_dir: Option<&Utf8Path>,
    ) -> Result<Utf8PathBuf> {
        fs::create_dir_all(bucket).with_context(|| format!("create bucket {bucket}"))?;
        let ref_dir = reference
            .parent()
            .context("reference file has no parent directory")?;
        copy_top_level_files(ref_dir, bucket)?;
        let staged_mutant = bucket.join(MUTANT_DIR_NAME);
        match mutant_dir {
            Some(mutant_dir) => move_dir(mutant_dir, &staged_mutant)?,
            None => fs::create_dir_all(&staged_mutant)
                .with_context(|| format!("create {staged_mutant}"))?,
        }
        Ok(staged_mutant)
    }
}
