// Copyright 2024-2026 The jitdiff authors

//! The producer/workers/collector pipeline.
//!
//! One producer thread pulls references from the generator and feeds a
//! bounded work queue; N worker threads run trials, each with its own VM and
//! mutator handle; one writer thread classifies results. Both queues are
//! bounded, so a slow writer or slow workers push back on the producer
//! instead of growing memory over a days-long campaign.
//!
//! Shutdown comes in two flavors. Graceful (the generator ran dry): the work
//! queue is closed, workers finish their trials naturally, and the writer
//! drains what is left. Fast (a signal arrived or the VM died): the producer
//! stops submitting, workers notice the interrupt flag inside their
//! subprocess polls and bail, and the writer gets a bounded grace period to
//! drain before being abandoned.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tracing::{debug, debug_span, error, info, warn};

use crate::generate::Generator;
use crate::interrupt::{check_interrupted, was_interrupted};
use crate::mutate::Mutator;
use crate::outcome::TrialResult;
use crate::trial::{run_trial, Tuning};
use crate::vm::Vm;
use crate::writer::ResultWriter;
use crate::Result;

/// Capacity of the result queue; workers block here when the writer lags.
pub const DEFAULT_RESULT_QUEUE_SIZE: usize = 128;

/// How long the writer may keep draining after the workers are gone.
const WRITER_GRACE: Duration = Duration::from_secs(15);

/// How often the writer wakes up to re-check the grace deadline.
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The adapters one worker owns exclusively.
pub struct Worker {
    pub vm: Box<dyn Vm>,
    pub mutator: Box<dyn Mutator>,
}

pub struct PipelineOptions {
    pub result_queue_size: usize,
    pub tuning: Tuning,
}

pub struct PipelineOutcome {
    /// True when the generator ran dry; false after a signal or VM death.
    pub stopped_normally: bool,
}

struct WorkItem {
    /// 1-based submission index, in generator order.
    index: usize,
    reference: Utf8PathBuf,
}

/// Run the pipeline to completion.
///
/// `probe_vm` is the producer's private handle, used only for the
/// per-submission `is_alive` check; `workers` carries one VM and mutator
/// handle per worker thread.
pub fn run(
    generator: &mut dyn Generator,
    probe_vm: &dyn Vm,
    workers: Vec<Worker>,
    writer: ResultWriter,
    options: &PipelineOptions,
) -> Result<PipelineOutcome> {
    let num_workers = workers.len();
    let (work_tx, work_rx) = mpsc::sync_channel::<WorkItem>(2 * num_workers);
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (result_tx, result_rx) = mpsc::sync_channel::<TrialResult>(options.result_queue_size);
    let grace_deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

    let produced = thread::scope(|scope| {
        let writer_deadline = Arc::clone(&grace_deadline);
        let writer_thread = scope.spawn(move || writer_loop(writer, result_rx, writer_deadline));

        let mut worker_threads = Vec::with_capacity(num_workers);
        for (worker_index, worker) in workers.into_iter().enumerate() {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let tuning = options.tuning;
            worker_threads.push(scope.spawn(move || {
                worker_loop(worker_index, worker, work_rx, result_tx, tuning)
            }));
        }
        // Only the workers may keep the queues alive: the producer must see
        // a send error once every worker has exited, and the writer must see
        // a disconnect once the workers are done.
        drop(work_rx);
        drop(result_tx);

        let produced = produce(generator, probe_vm, work_tx);

        info!("waiting for workers to finish");
        for handle in worker_threads {
            let _ = handle.join();
        }
        *grace_deadline.lock().expect("grace deadline lock") =
            Some(Instant::now() + WRITER_GRACE);
        let _ = writer_thread.join();
        produced
    });

    let stopped_normally = produced?;
    info!(stopped_normally, "pipeline exited");
    Ok(PipelineOutcome { stopped_normally })
}

/// Feed the work queue until the generator ends, the VM dies, or a signal
/// arrives. Returns whether the stop was the graceful one.
fn produce(
    generator: &mut dyn Generator,
    probe_vm: &dyn Vm,
    work_tx: SyncSender<WorkItem>,
) -> Result<bool> {
    let mut index = 0;
    loop {
        if check_interrupted().is_err() {
            info!("stopped by signal");
            return Ok(false);
        }
        let reference = match generator.next_reference()? {
            Some(reference) => reference,
            None => {
                info!("generator exhausted, stopping normally");
                return Ok(true);
            }
        };
        if !probe_vm.is_alive() {
            warn!(vm = %probe_vm.describe(), "vm is no longer alive, stopping");
            return Ok(false);
        }
        index += 1;
        debug!(index, %reference, "submit reference");
        // Blocks when the queue is full: that is the backpressure.
        if work_tx
            .send(WorkItem { index, reference })
            .is_err()
        {
            warn!("all workers exited, stopping");
            return Ok(false);
        }
    }
}

/// One worker: take items until the queue closes, run the trial, submit the
/// result. A failed trial is logged and skipped so one malformed reference
/// cannot take the worker down.
fn worker_loop(
    worker_index: usize,
    worker: Worker,
    work_rx: Arc<Mutex<Receiver<WorkItem>>>,
    result_tx: SyncSender<TrialResult>,
    tuning: Tuning,
) {
    loop {
        let item = match work_rx.lock().expect("work queue lock").recv() {
            Ok(item) => item,
            Err(_) => break, // queue closed
        };
        let _span = debug_span!("trial", worker = worker_index, index = item.index).entered();
        match run_trial(
            &item.reference,
            item.index,
            worker.vm.as_ref(),
            worker.mutator.as_ref(),
            &tuning,
        ) {
            Ok(result) => {
                if result_tx.send(result).is_err() {
                    break; // writer is gone
                }
            }
            Err(err) => {
                if was_interrupted() {
                    break;
                }
                error!(index = item.index, "trial failed: {err:#}");
            }
        }
    }
    debug!(worker = worker_index, "worker exiting");
}

/// The collector: classify results until the channel closes or the grace
/// deadline passes.
fn writer_loop(
    mut writer: ResultWriter,
    result_rx: Receiver<TrialResult>,
    grace_deadline: Arc<Mutex<Option<Instant>>>,
) {
    loop {
        if let Some(deadline) = *grace_deadline.lock().expect("grace deadline lock") {
            if Instant::now() > deadline {
                warn!("writer grace period expired, discarding queued results");
                break;
            }
        }
        match result_rx.recv_timeout(WRITER_POLL_INTERVAL) {
            Ok(result) => {
                if let Err(err) = writer.append(result) {
                    error!("failed to record trial result: {err:#}");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("writer exiting");
}

#[cfg(test)]
mod test {
    use std::fs::{create_dir_all, read_to_string, write};
    use std::time::Duration;

    use camino::{Utf8Path, Utf8PathBuf};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::mutate::MutationOutcome;
    use crate::outcome::RunResult;
    use crate::stats::Stats;
    use crate::vm::{Artifact, CompileOutcome, ForceMode};

    /// Creates `count` reference directories up front, then ends.
    struct FakeGenerator {
        out_dir: Utf8PathBuf,
        count: usize,
        index: usize,
    }

    impl Generator for FakeGenerator {
        fn next_reference(&mut self) -> crate::Result<Option<Utf8PathBuf>> {
            if self.index >= self.count {
                return Ok(None);
            }
            self.index += 1;
            let dir = self.out_dir.join(self.index.to_string());
            create_dir_all(&dir)?;
            let file = dir.join("Test.java");
            write(&file, "class Test {}")?;
            Ok(Some(file))
        }
    }

    /// Compiles everything; mutant runs print `mutant_output`, reference
    /// runs print "hi\n".
    struct FakeVm {
        mutant_output: String,
        alive: bool,
    }

    impl Vm for FakeVm {
        fn compile(
            &self,
            source: &Utf8Path,
            _classpath: &[String],
            _timeout: Duration,
        ) -> crate::Result<CompileOutcome> {
            Ok(CompileOutcome::Compiled(Artifact {
                class_dir: source.parent().unwrap().to_owned(),
                main_class: source.file_stem().unwrap().to_owned(),
                jar: None,
            }))
        }

        fn run(
            &self,
            artifact: &Artifact,
            _args: &[String],
            _force: ForceMode,
            _extra_opts: &[String],
            _timeout: Duration,
        ) -> crate::Result<RunResult> {
            let output = if artifact.class_dir.as_str().contains("mutants") {
                self.mutant_output.clone()
            } else {
                "hi\n".to_owned()
            };
            Ok(RunResult {
                exit_code: 0,
                output,
            })
        }

        fn is_alive(&self) -> bool {
            self.alive
        }

        fn describe(&self) -> String {
            "fake".to_owned()
        }
    }

    struct IdentityMutator;

    impl Mutator for IdentityMutator {
        fn mutate(
            &self,
            reference: &Utf8Path,
            out_dir: &Utf8Path,
            _seed: u32,
            _timeout: Duration,
        ) -> crate::Result<MutationOutcome> {
            let dest = out_dir.join(reference.file_name().unwrap());
            std::fs::copy(reference, &dest)?;
            Ok(MutationOutcome {
                mutant: Some(dest),
                log: "log".to_owned(),
            })
        }
    }

    struct Harness {
        _work: TempDir,
        gen_dir: Utf8PathBuf,
        out_dir: Utf8PathBuf,
        stats: Arc<Stats>,
    }

    fn harness() -> Harness {
        let work = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(work.path().to_owned()).unwrap();
        let gen_dir = root.join("gen");
        let out_dir = root.join("out");
        create_dir_all(&gen_dir).unwrap();
        create_dir_all(&out_dir).unwrap();
        Harness {
            _work: work,
            gen_dir,
            out_dir,
            stats: Arc::new(Stats::default()),
        }
    }

    fn run_pipeline(
        harness: &Harness,
        count: usize,
        num_workers: usize,
        mutant_output: &str,
        alive: bool,
    ) -> PipelineOutcome {
        let mut generator = FakeGenerator {
            out_dir: harness.gen_dir.clone(),
            count,
            index: 0,
        };
        let probe_vm = FakeVm {
            mutant_output: mutant_output.to_owned(),
            alive,
        };
        let workers = (0..num_workers)
            .map(|_| Worker {
                vm: Box::new(FakeVm {
                    mutant_output: mutant_output.to_owned(),
                    alive,
                }) as Box<dyn Vm>,
                mutator: Box::new(IdentityMutator) as Box<dyn Mutator>,
            })
            .collect();
        let writer =
            ResultWriter::new(&harness.out_dir, Arc::clone(&harness.stats), false).unwrap();
        let options = PipelineOptions {
            result_queue_size: DEFAULT_RESULT_QUEUE_SIZE,
            tuning: Tuning {
                num_mutation: 1,
                prog_timeout: Duration::from_secs(2),
                rand_seed: 42,
            },
        };
        run(&mut generator, &probe_vm, workers, writer, &options).unwrap()
    }

    #[test]
    fn empty_generator_produces_empty_layout_and_zero_counts() {
        let harness = harness();
        let outcome = run_pipeline(&harness, 0, 2, "hi\n", true);
        assert!(outcome.stopped_normally);
        assert_eq!(harness.stats.ref_count(), 0);
        assert_eq!(harness.stats.mut_count(), 0);
        assert_eq!(harness.stats.diff_count(), 0);
        let csv = read_to_string(harness.out_dir.join("differences/diffs.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn identity_mutants_produce_no_differences() {
        let harness = harness();
        let outcome = run_pipeline(&harness, 3, 2, "hi\n", true);
        assert!(outcome.stopped_normally);
        assert_eq!(harness.stats.ref_count(), 3);
        assert_eq!(harness.stats.mut_count(), 3);
        assert_eq!(harness.stats.diff_count(), 0);
        // Every reference directory was reclaimed.
        for i in 1..=3 {
            assert!(!harness.gen_dir.join(i.to_string()).exists());
        }
    }

    #[test]
    fn divergent_mutants_are_all_recorded() {
        let harness = harness();
        let outcome = run_pipeline(&harness, 4, 2, "bye\n", true);
        assert!(outcome.stopped_normally);
        assert_eq!(harness.stats.ref_count(), 4);
        assert_eq!(harness.stats.diff_count(), 4);
        let csv = read_to_string(harness.out_dir.join("differences/diffs.csv")).unwrap();
        assert_eq!(csv.lines().count(), 5);
        for diff_id in 0..4 {
            assert!(harness
                .out_dir
                .join(format!("differences/{diff_id}"))
                .is_dir());
        }
    }

    #[test]
    fn dead_vm_stops_the_pipeline_abnormally() {
        let harness = harness();
        let outcome = run_pipeline(&harness, 5, 2, "hi\n", false);
        assert!(!outcome.stopped_normally);
        assert_eq!(harness.stats.ref_count(), 0);
    }
}
