// Copyright 2024-2026 The jitdiff authors

//! `jitdiff`: differential testing of JVM JIT compilers.
//!
//! A generator produces reference Java programs; a mutator derives
//! semantically equivalent mutants; both run under the target VM and any
//! divergence in exit status or output is persisted as a candidate
//! miscompilation.

mod art;
mod config;
mod console;
mod exit_code;
mod fsutil;
mod generate;
mod hotspot;
mod interrupt;
mod mutate;
mod outcome;
mod pipeline;
mod process;
mod stats;
mod trial;
mod vm;
mod writer;

use std::fs::File;
use std::process::exit;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, GeneratorConfig, JvmConfig};
use crate::generate::{ExistingTests, Generator, JFuzz, JFuzzKnobs, JavaFuzzer};
use crate::hotspot::{Graal, HotSpot, JavaToolchain, OpenJ9};
use crate::mutate::{Artemis, Mutator};
use crate::pipeline::{PipelineOptions, Worker, DEFAULT_RESULT_QUEUE_SIZE};
use crate::stats::Stats;
use crate::trial::Tuning;
use crate::vm::Vm;
use crate::writer::ResultWriter;

pub type Result<T> = anyhow::Result<T>;

/// Where the bundled generators live, relative to the working directory.
const JAVA_FUZZER_HOME: &str = "java_fuzzer";
const JFUZZ_HOME: &str = "jfuzz";

/// Differential testing harness for JIT compilers in Java virtual machines.
#[derive(Parser, Debug)]
#[command(name = "jitdiff", version, about)]
struct Args {
    /// Campaign configuration file (YAML).
    config: Utf8PathBuf,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    exit(exit_code::SUCCESS)
                }
                _ => exit(exit_code::USAGE),
            }
        }
    };
    let config = match Config::read_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            console::print_error(&format!("{err:#}"));
            exit(exit_code::USAGE);
        }
    };
    let _log_guard = match setup_tracing(&config.out_dir) {
        Ok(guard) => guard,
        Err(err) => {
            console::print_error(&format!("{err:#}"));
            exit(exit_code::USAGE);
        }
    };
    interrupt::install_handler();

    let (mut generator, probe_vm, workers, writer, stats) = match build_components(&config) {
        Ok(components) => components,
        Err(err) => {
            console::print_error(&format!("{err:#}"));
            exit(exit_code::USAGE);
        }
    };

    let options = PipelineOptions {
        result_queue_size: DEFAULT_RESULT_QUEUE_SIZE,
        tuning: Tuning {
            num_mutation: config.num_mutation,
            prog_timeout: Duration::from_secs(config.prog_timeout),
            rand_seed: config.rand_seed,
        },
    };
    let start = Instant::now();
    match pipeline::run(
        generator.as_mut(),
        probe_vm.as_ref(),
        workers,
        writer,
        &options,
    ) {
        Ok(outcome) if outcome.stopped_normally => {
            console::print_summary(&stats, options.tuning.prog_timeout, start.elapsed());
            exit(exit_code::SUCCESS);
        }
        Ok(_) => {
            console::print_abnormal();
            exit(exit_code::ABNORMAL);
        }
        Err(err) => {
            console::print_error(&format!("{err:#}"));
            console::print_abnormal();
            exit(exit_code::ABNORMAL);
        }
    }
}

type Components = (
    Box<dyn Generator>,
    Box<dyn Vm>,
    Vec<Worker>,
    ResultWriter,
    Arc<Stats>,
);

/// Build every adapter from the configuration. Any failure here is a
/// configuration error: bad paths, missing binaries, a dead device.
fn build_components(config: &Config) -> Result<Components> {
    let toolchain = JavaToolchain::new(&config.java.home, config.java.classpath.clone())?;

    let probe_vm = build_vm(&config.jvm, &toolchain)?;
    ensure!(
        probe_vm.is_alive(),
        "jvm is not alive: {}",
        probe_vm.describe()
    );
    info!(vm = %probe_vm.describe(), "target vm ready");

    let generator = build_generator(&config.generator, config.rand_seed)?;

    let mut workers = Vec::with_capacity(config.num_proc);
    for _ in 0..config.num_proc {
        let mutator: Box<dyn Mutator> = Box::new(Artemis::new(
            &config.artemis.jar,
            toolchain.clone(),
            &config.artemis.policy,
            config.artemis.min_loop_trip,
            config.artemis.max_loop_trip,
            &config.artemis.code_bricks,
            config.artemis.extra_opts.clone(),
        ));
        workers.push(Worker {
            vm: build_vm(&config.jvm, &toolchain)?,
            mutator,
        });
    }

    let stats = Arc::new(Stats::default());
    let writer = ResultWriter::new(&config.out_dir, Arc::clone(&stats), config.save_timeouts)?;
    Ok((generator, probe_vm, workers, writer, stats))
}

fn build_vm(jvm: &JvmConfig, toolchain: &JavaToolchain) -> Result<Box<dyn Vm>> {
    Ok(match jvm {
        JvmConfig::Hotspot {
            java_home,
            classpath,
            options,
        } => Box::new(HotSpot::new(java_home, classpath.clone(), options.clone())?),
        JvmConfig::Openj9 {
            java_home,
            classpath,
            options,
        } => Box::new(OpenJ9::new(java_home, classpath.clone(), options.clone())?),
        JvmConfig::Graal {
            java_home,
            classpath,
            options,
        } => Box::new(Graal::new(java_home, classpath.clone(), options.clone())?),
        JvmConfig::HostArt {
            host_home,
            min_api,
            options,
        } => Box::new(art::HostArt::new(
            host_home,
            toolchain.clone(),
            *min_api,
            options.clone(),
        )?),
        JvmConfig::TargetArt {
            android_home,
            build_tools,
            serial_no,
            app_process,
            min_api,
            options,
        } => Box::new(art::TargetArt::new(
            android_home,
            build_tools,
            serial_no,
            *app_process,
            toolchain.clone(),
            *min_api,
            options.clone(),
        )?),
    })
}

fn build_generator(generator: &GeneratorConfig, rand_seed: u64) -> Result<Box<dyn Generator>> {
    Ok(match generator {
        GeneratorConfig::JavaFuzzer { out_dir, conf } => {
            let home = Utf8Path::new(JAVA_FUZZER_HOME);
            let conf = match conf.as_deref() {
                None | Some("none") | Some("None") => home.join("config.yml"),
                Some(path) => Utf8PathBuf::from(path),
            };
            ensure!(conf.exists(), "Java*Fuzzer conf does not exist: {conf}");
            Box::new(JavaFuzzer::new(home, &conf, out_dir)?)
        }
        GeneratorConfig::JFuzz {
            out_dir,
            max_expr_depth,
            max_stmt_list_size,
            max_nested_branch,
            max_nested_loop,
            max_nested_try_catch,
        } => Box::new(JFuzz::new(
            Utf8Path::new(JFUZZ_HOME),
            out_dir,
            JFuzzKnobs {
                max_expr_depth: *max_expr_depth,
                max_stmt_list_size: *max_stmt_list_size,
                max_nested_branch: *max_nested_branch,
                max_nested_loop: *max_nested_loop,
                max_nested_try_catch: *max_nested_try_catch,
            },
            rand_seed,
        )?),
        GeneratorConfig::ExistingTests { out_dir, exist_dir } => {
            Box::new(ExistingTests::new(exist_dir, out_dir)?)
        }
    })
}

/// Log everything to `<out_dir>/jitdiff.log`; mirror to stderr at the level
/// chosen by `RUST_LOG` (default `info`).
fn setup_tracing(out_dir: &Utf8Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = out_dir.join("jitdiff.log");
    let log_file =
        File::create(&log_path).with_context(|| format!("create log file {log_path}"))?;
    let (file_writer, guard) = tracing_appender::non_blocking(log_file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(LevelFilter::DEBUG);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(guard)
}
