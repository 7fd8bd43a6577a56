// Copyright 2024-2026 The jitdiff authors

//! One trial: compile and run a reference, then mutate it until enough
//! mutants have been executed.

use std::fs;
use std::time::Duration;

use anyhow::{bail, Context};
use camino::Utf8Path;
use tracing::{debug, info};

use crate::fsutil::copy_files_with_extensions;
use crate::mutate::Mutator;
use crate::outcome::{MutantOutcome, TrialResult};
use crate::vm::{CompileOutcome, ForceMode, Vm, SOURCE_AND_ARTIFACT_EXTENSIONS};
use crate::Result;

/// Compiling a reference or a mutant is expected to be quick; 30 s covers a
/// cold toolchain.
const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for one mutator invocation.
const MUTATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Sub-directory of a reference where its mutants are staged. The name is
/// reserved: generators must never emit it.
pub const MUTANTS_DIR_NAME: &str = "mutants";

/// Per-trial tuning, fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Mutants to execute successfully per reference (K).
    pub num_mutation: usize,
    /// Deadline for the reference run; mutants get twice this, because
    /// mutation deliberately stretches loop trip counts.
    pub prog_timeout: Duration,
    /// Root seed; combined with the trial index to derive the trial's RNG.
    pub rand_seed: u64,
}

/// Run the whole state machine for one reference.
///
/// `index` is the producer-assigned 1-based submission index; it salts the
/// trial-local RNG so parallel trials draw disjoint mutation seeds.
pub fn run_trial(
    reference: &Utf8Path,
    index: usize,
    vm: &dyn Vm,
    mutator: &dyn Mutator,
    tuning: &Tuning,
) -> Result<TrialResult> {
    let ref_dir = reference
        .parent()
        .context("reference file has no parent directory")?;
    let mutants_root = ref_dir.join(MUTANTS_DIR_NAME);
    if mutants_root.exists() {
        bail!("reference {reference} already contains a `{MUTANTS_DIR_NAME}` directory; the name is reserved");
    }
    debug!(%reference, index, "start trial");

    // References come from trusted generators and must compile.
    let artifact = match vm.compile(reference, &[], COMPILE_TIMEOUT)? {
        CompileOutcome::Compiled(artifact) => artifact,
        CompileOutcome::Error(diagnostic) => {
            bail!("failed to compile reference {reference}: {diagnostic}")
        }
    };

    let ref_run = vm.run(&artifact, &[], ForceMode::None, &[], tuning.prog_timeout)?;
    if ref_run.timed_out() {
        info!(%reference, "reference timed out, discarding trial");
        return Ok(TrialResult::ReferenceTimeout {
            reference: reference.to_owned(),
        });
    }

    let mut rng = fastrand::Rng::with_seed(tuning.rand_seed.wrapping_add(index as u64));
    let mut mutants = Vec::new();
    let mut succeeded = 0;
    for i in 0..2 * tuning.num_mutation {
        if succeeded >= tuning.num_mutation {
            break;
        }
        let mutant_dir = mutants_root.join(i.to_string());
        fs::create_dir_all(&mutant_dir).with_context(|| format!("create dir {mutant_dir}"))?;
        debug!(%reference, attempt = i, succeeded, "mutate");

        let mutation = mutator.mutate(reference, &mutant_dir, rng.u32(..), MUTATION_TIMEOUT)?;
        let mutant_file = match mutation.mutant {
            Some(mutant_file) => mutant_file,
            None => {
                mutants.push(MutantOutcome::MutationFailed {
                    mutant_dir,
                    diagnostic: mutation.log,
                });
                continue;
            }
        };

        // The mutant compiles against the same dependencies as the reference.
        copy_files_with_extensions(
            ref_dir,
            &mutant_dir,
            SOURCE_AND_ARTIFACT_EXTENSIONS,
            mutant_file.file_name().context("mutant file has no name")?,
        )?;

        let mutant_artifact = match vm.compile(&mutant_file, &[], COMPILE_TIMEOUT)? {
            CompileOutcome::Compiled(artifact) => artifact,
            CompileOutcome::Error(diagnostic) => {
                mutants.push(MutantOutcome::CompileFailed {
                    mutant_file,
                    mutation_log: mutation.log,
                    diagnostic,
                });
                continue;
            }
        };

        let mut_run = vm.run(
            &mutant_artifact,
            &[],
            ForceMode::None,
            &[],
            2 * tuning.prog_timeout,
        )?;
        let outcome = if ref_run.timed_out() && mut_run.timed_out() {
            MutantOutcome::BothTimedOut {
                mutant_file,
                mutation_log: mutation.log,
            }
        } else {
            MutantOutcome::Executed {
                mutant_file,
                mutation_log: mutation.log,
                run: mut_run,
            }
        };
        if outcome.is_successful_attempt() {
            succeeded += 1;
        }
        mutants.push(outcome);
    }

    Ok(TrialResult::Normal {
        reference: reference.to_owned(),
        ref_run,
        mutants,
    })
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::fs::write;

    use camino::{Utf8Path, Utf8PathBuf};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::mutate::MutationOutcome;
    use crate::outcome::{RunResult, TIMEOUT_EXIT_CODE};
    use crate::vm::Artifact;

    fn tuning(num_mutation: usize) -> Tuning {
        Tuning {
            num_mutation,
            prog_timeout: Duration::from_secs(2),
            rand_seed: 7,
        }
    }

    fn make_reference(tmp: &TempDir) -> Utf8PathBuf {
        let dir = Utf8PathBuf::try_from(tmp.path().to_owned()).unwrap();
        let java_file = dir.join("Test.java");
        write(&java_file, "class Test {}").unwrap();
        write(dir.join("Util.java"), "class Util {}").unwrap();
        java_file
    }

    /// Scripted VM: each run pops the next result; compilation can be told
    /// to fail for mutants.
    struct FakeVm {
        runs: RefCell<Vec<RunResult>>,
        fail_mutant_compile: bool,
    }

    impl FakeVm {
        fn with_runs(runs: Vec<RunResult>) -> FakeVm {
            FakeVm {
                runs: RefCell::new(runs),
                fail_mutant_compile: false,
            }
        }
    }

    impl Vm for FakeVm {
        fn compile(
            &self,
            source: &Utf8Path,
            _classpath: &[String],
            _timeout: Duration,
        ) -> crate::Result<CompileOutcome> {
            if self.fail_mutant_compile && source.as_str().contains(MUTANTS_DIR_NAME) {
                return Ok(CompileOutcome::Error("bad mutant".to_owned()));
            }
            Ok(CompileOutcome::Compiled(Artifact {
                class_dir: source.parent().unwrap().to_owned(),
                main_class: source.file_stem().unwrap().to_owned(),
                jar: None,
            }))
        }

        fn run(
            &self,
            _artifact: &Artifact,
            _args: &[String],
            _force: ForceMode,
            _extra_opts: &[String],
            _timeout: Duration,
        ) -> crate::Result<RunResult> {
            Ok(self.runs.borrow_mut().remove(0))
        }

        fn is_alive(&self) -> bool {
            true
        }

        fn describe(&self) -> String {
            "fake".to_owned()
        }
    }

    /// Copies the reference unchanged, or fails every attempt.
    struct FakeMutator {
        fail: bool,
    }

    impl Mutator for FakeMutator {
        fn mutate(
            &self,
            reference: &Utf8Path,
            out_dir: &Utf8Path,
            _seed: u32,
            _timeout: Duration,
        ) -> crate::Result<MutationOutcome> {
            if self.fail {
                return Ok(MutationOutcome {
                    mutant: None,
                    log: "boom".to_owned(),
                });
            }
            let dest = out_dir.join(reference.file_name().unwrap());
            std::fs::copy(reference, &dest).unwrap();
            Ok(MutationOutcome {
                mutant: Some(dest),
                log: "mutated ok".to_owned(),
            })
        }
    }

    fn ok_run(output: &str) -> RunResult {
        RunResult {
            exit_code: 0,
            output: output.to_owned(),
        }
    }

    #[test]
    fn identity_mutation_executes_k_mutants() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        let vm = FakeVm::with_runs(vec![ok_run("hi\n"), ok_run("hi\n")]);
        let mutator = FakeMutator { fail: false };

        let result = run_trial(&reference, 1, &vm, &mutator, &tuning(1)).unwrap();
        match result {
            TrialResult::Normal { ref_run, mutants, .. } => {
                assert_eq!(ref_run, ok_run("hi\n"));
                assert_eq!(mutants.len(), 1);
                match &mutants[0] {
                    MutantOutcome::Executed { run, mutation_log, mutant_file } => {
                        assert_eq!(run, &ok_run("hi\n"));
                        assert_eq!(mutation_log, "mutated ok");
                        // Dependencies travelled into the mutant directory.
                        assert!(mutant_file.parent().unwrap().join("Util.java").is_file());
                    }
                    other => panic!("unexpected outcome {other:?}"),
                }
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn reference_timeout_short_circuits() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        let vm = FakeVm::with_runs(vec![RunResult {
            exit_code: TIMEOUT_EXIT_CODE,
            output: String::new(),
        }]);
        let mutator = FakeMutator { fail: false };

        let result = run_trial(&reference, 1, &vm, &mutator, &tuning(1)).unwrap();
        assert!(matches!(result, TrialResult::ReferenceTimeout { .. }));
        // No mutant directories were created.
        assert!(!reference.parent().unwrap().join(MUTANTS_DIR_NAME).exists());
    }

    #[test]
    fn mutation_failures_consume_all_2k_attempts() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        let vm = FakeVm::with_runs(vec![ok_run("hi\n")]);
        let mutator = FakeMutator { fail: true };

        let result = run_trial(&reference, 1, &vm, &mutator, &tuning(2)).unwrap();
        match result {
            TrialResult::Normal { mutants, .. } => {
                // 2K attempts, none successful.
                assert_eq!(mutants.len(), 4);
                for outcome in &mutants {
                    match outcome {
                        MutantOutcome::MutationFailed { diagnostic, .. } => {
                            assert_eq!(diagnostic, "boom")
                        }
                        other => panic!("unexpected outcome {other:?}"),
                    }
                }
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn compile_failure_is_recorded_and_loop_continues() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        let vm = FakeVm {
            runs: RefCell::new(vec![ok_run("hi\n")]),
            fail_mutant_compile: true,
        };
        let mutator = FakeMutator { fail: false };

        let result = run_trial(&reference, 1, &vm, &mutator, &tuning(1)).unwrap();
        match result {
            TrialResult::Normal { mutants, .. } => {
                assert_eq!(mutants.len(), 2);
                assert!(mutants.iter().all(|m| matches!(
                    m,
                    MutantOutcome::CompileFailed { diagnostic, .. } if diagnostic == "bad mutant"
                )));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn k_zero_runs_no_mutation_loop() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        let vm = FakeVm::with_runs(vec![ok_run("hi\n")]);
        let mutator = FakeMutator { fail: false };

        let result = run_trial(&reference, 1, &vm, &mutator, &tuning(0)).unwrap();
        match result {
            TrialResult::Normal { mutants, .. } => assert!(mutants.is_empty()),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn preexisting_mutants_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let reference = make_reference(&tmp);
        std::fs::create_dir(reference.parent().unwrap().join(MUTANTS_DIR_NAME)).unwrap();
        let vm = FakeVm::with_runs(vec![]);
        let mutator = FakeMutator { fail: false };

        let err = run_trial(&reference, 1, &vm, &mutator, &tuning(1)).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn same_seed_and_index_draw_the_same_mutation_seeds() {
        let a: Vec<u32> = {
            let mut rng = fastrand::Rng::with_seed(7u64.wrapping_add(3));
            (0..4).map(|_| rng.u32(..)).collect()
        };
        let b: Vec<u32> = {
            let mut rng = fastrand::Rng::with_seed(7u64.wrapping_add(3));
            (0..4).map(|_| rng.u32(..)).collect()
        };
        assert_eq!(a, b);
    }
}
