// Copyright 2024-2026 The jitdiff authors

//! Sources of reference programs.
//!
//! A generator hands the pipeline one freshly prepared directory per call,
//! containing a nominated `Test.java` plus any sibling dependencies. The
//! pipeline takes ownership of the directory; the writer removes it after
//! classification. A call may take tens of seconds (the fuzzers are external
//! processes), which is why the producer runs on its own thread.

use std::fs::{self, File};
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::fsutil::{copy_dir_recursive, copy_into};
use crate::process::run_redirected;
use crate::Result;

/// Deadline for one external generation step.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// The nominated source file inside each reference directory.
pub const TEST_FILE_NAME: &str = "Test.java";

/// A lazy, single-consumer source of reference files.
pub trait Generator: Send {
    /// Prepare the next reference and return the path to its nominated
    /// source file, or `None` when the generator is exhausted.
    fn next_reference(&mut self) -> Result<Option<Utf8PathBuf>>;
}

/// Runs the Java*Fuzzer ruby script and captures its stdout as `Test.java`.
pub struct JavaFuzzer {
    load_path: Utf8PathBuf,
    fuzzer: Utf8PathBuf,
    utils_file: Utf8PathBuf,
    conf: Utf8PathBuf,
    out_dir: Utf8PathBuf,
    index: usize,
}

impl JavaFuzzer {
    pub fn new(home: &Utf8Path, conf: &Utf8Path, out_dir: &Utf8Path) -> Result<JavaFuzzer> {
        let load_path = home.join("rb");
        let fuzzer = load_path.join("Fuzzer.rb");
        ensure!(
            fuzzer.is_file(),
            "Fuzzer.rb does not exist in Java*Fuzzer home {home}"
        );
        let utils_file = load_path.join("FuzzerUtils.java");
        ensure!(
            utils_file.is_file(),
            "FuzzerUtils.java does not exist in Java*Fuzzer home {home}"
        );
        Ok(JavaFuzzer {
            load_path,
            fuzzer,
            utils_file,
            conf: conf.to_owned(),
            out_dir: out_dir.to_owned(),
            index: 0,
        })
    }
}

impl Generator for JavaFuzzer {
    fn next_reference(&mut self) -> Result<Option<Utf8PathBuf>> {
        self.index += 1;
        let class_dir = self.out_dir.join(self.index.to_string());
        fs::create_dir_all(&class_dir).with_context(|| format!("create dir {class_dir}"))?;
        let java_file = class_dir.join(TEST_FILE_NAME);
        let out = File::create(&java_file).with_context(|| format!("create {java_file}"))?;
        let argv = vec![
            "ruby".to_owned(),
            "-I".to_owned(),
            self.load_path.to_string(),
            self.fuzzer.to_string(),
            "-f".to_owned(),
            self.conf.to_string(),
        ];
        let code = run_redirected(&argv, None, out, GENERATE_TIMEOUT)?;
        if code != 0 {
            let output = fs::read_to_string(&java_file).unwrap_or_default();
            bail!("Java*Fuzzer failed to generate a java file: {output}");
        }
        copy_into(&self.utils_file, &class_dir)?;
        debug!(index = self.index, %java_file, "generated reference");
        Ok(Some(java_file))
    }
}

/// Runs the jfuzz native binary with bounded-grammar knobs.
pub struct JFuzz {
    binary: Utf8PathBuf,
    out_dir: Utf8PathBuf,
    max_expr_depth: u32,
    max_stmt_list_size: u32,
    max_nested_branch: u32,
    max_nested_loop: u32,
    max_nested_try_catch: u32,
    rng: fastrand::Rng,
    index: usize,
}

pub struct JFuzzKnobs {
    pub max_expr_depth: u32,
    pub max_stmt_list_size: u32,
    pub max_nested_branch: u32,
    pub max_nested_loop: u32,
    pub max_nested_try_catch: u32,
}

impl JFuzz {
    pub fn new(home: &Utf8Path, out_dir: &Utf8Path, knobs: JFuzzKnobs, seed: u64) -> Result<JFuzz> {
        ensure!(
            cfg!(target_pointer_width = "64"),
            "jfuzz does not support 32-bit platforms"
        );
        let os = if cfg!(target_os = "linux") {
            "linux"
        } else if cfg!(target_os = "macos") {
            "darwin"
        } else {
            bail!("jfuzz does not support this platform");
        };
        let binary = home.join("bin").join(os).join("x86_64/jfuzz");
        ensure!(
            binary.is_file(),
            "binary jfuzz does not exist in jfuzz home {home}"
        );
        Ok(JFuzz {
            binary,
            out_dir: out_dir.to_owned(),
            max_expr_depth: knobs.max_expr_depth,
            max_stmt_list_size: knobs.max_stmt_list_size,
            max_nested_branch: knobs.max_nested_branch,
            max_nested_loop: knobs.max_nested_loop,
            max_nested_try_catch: knobs.max_nested_try_catch,
            rng: fastrand::Rng::with_seed(seed),
            index: 0,
        })
    }
}

impl Generator for JFuzz {
    fn next_reference(&mut self) -> Result<Option<Utf8PathBuf>> {
        self.index += 1;
        let class_dir = self.out_dir.join(self.index.to_string());
        fs::create_dir_all(&class_dir).with_context(|| format!("create dir {class_dir}"))?;
        let java_file = class_dir.join(TEST_FILE_NAME);
        let out = File::create(&java_file).with_context(|| format!("create {java_file}"))?;
        let argv = vec![
            self.binary.to_string(),
            "-s".to_owned(),
            self.rng.u32(..).to_string(),
            "-d".to_owned(),
            self.max_expr_depth.to_string(),
            "-l".to_owned(),
            self.max_stmt_list_size.to_string(),
            "-i".to_owned(),
            self.max_nested_branch.to_string(),
            "-n".to_owned(),
            self.max_nested_loop.to_string(),
            "-t".to_owned(),
            self.max_nested_try_catch.to_string(),
        ];
        let code = run_redirected(&argv, None, out, GENERATE_TIMEOUT)?;
        if code != 0 {
            let output = fs::read_to_string(&java_file).unwrap_or_default();
            bail!("jfuzz failed to generate a java file: {output}");
        }
        debug!(index = self.index, %java_file, "generated reference");
        Ok(Some(java_file))
    }
}

/// Replays tests stored on disk.
///
/// Every child directory of `test_dir` holding a `MANIFEST` file (one test
/// name per line, without extension) is replayed: the directory is copied
/// into the working tree once per listed name and the named `.java` file is
/// yielded. All other files in the directory travel along as dependencies.
pub struct ExistingTests {
    out_dir: Utf8PathBuf,
    dir_iter: camino::ReadDirUtf8,
    pending: Vec<Utf8PathBuf>,
    index: usize,
}

impl ExistingTests {
    pub fn new(test_dir: &Utf8Path, out_dir: &Utf8Path) -> Result<ExistingTests> {
        ensure!(test_dir.is_dir(), "not a directory: {test_dir}");
        let dir_iter = test_dir
            .read_dir_utf8()
            .with_context(|| format!("read dir {test_dir}"))?;
        Ok(ExistingTests {
            out_dir: out_dir.to_owned(),
            dir_iter,
            pending: Vec::new(),
            index: 0,
        })
    }

    /// Advance to the next child directory with a MANIFEST and queue its tests.
    fn refill(&mut self) -> Result<bool> {
        while let Some(entry) = self.dir_iter.next() {
            let entry = entry.context("read test dir entry")?;
            let class_dir = entry.path();
            let manifest = class_dir.join("MANIFEST");
            if !class_dir.is_dir() || !manifest.is_file() {
                continue;
            }
            let names = fs::read_to_string(&manifest)
                .with_context(|| format!("read {manifest}"))?;
            for name in names.lines().filter(|l| !l.is_empty()) {
                let java_file = class_dir.join(format!("{name}.java"));
                ensure!(
                    java_file.is_file(),
                    "file listed in MANIFEST does not exist or is not a file: {java_file}"
                );
                self.pending.push(java_file);
            }
            ensure!(!self.pending.is_empty(), "no tests found in {class_dir}");
            return Ok(true);
        }
        Ok(false)
    }
}

impl Generator for ExistingTests {
    fn next_reference(&mut self) -> Result<Option<Utf8PathBuf>> {
        if self.pending.is_empty() && !self.refill()? {
            return Ok(None);
        }
        self.index += 1;
        let java_file = self.pending.pop().expect("pending test queued");
        let class_dir = java_file.parent().expect("test file has a parent");
        let file_name = java_file.file_name().expect("test file has a name");

        let out_class_dir = self.out_dir.join(self.index.to_string());
        copy_dir_recursive(class_dir, &out_class_dir)?;
        // Remember where this replay came from; useful when triaging a find.
        fs::write(out_class_dir.join("LOCATION"), java_file.as_str())
            .with_context(|| format!("write LOCATION in {out_class_dir}"))?;
        debug!(index = self.index, %java_file, "replayed reference");
        Ok(Some(out_class_dir.join(file_name)))
    }
}
