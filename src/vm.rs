// Copyright 2024-2026 The jitdiff authors

//! The contract between the pipeline and a VM toolchain.
//!
//! A `Vm` knows how to turn a source file into a runnable artifact and how to
//! run it. Everything else about the toolchain (javac vs. d8, local vs. a
//! device behind adb) is the adapter's business.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use strum::Display;

use crate::outcome::RunResult;
use crate::Result;

/// Extensions of files that are compilation inputs or compiled artifacts,
/// and therefore travel with a source file into a mutant directory.
pub const SOURCE_AND_ARTIFACT_EXTENSIONS: &[&str] = &["java", "class", "dex"];

/// Hint for how strongly the VM should be pushed toward its JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ForceMode {
    /// Let the VM decide.
    None,
    /// Force pure interpretation.
    Interpret,
    /// Force eager JIT compilation.
    Jit,
}

/// A successfully compiled program.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Directory holding the compiled classes.
    pub class_dir: Utf8PathBuf,
    /// Name of the entry class.
    pub main_class: String,
    /// Dex jar, for ART-family toolchains.
    pub jar: Option<Utf8PathBuf>,
}

/// What compilation produced: an artifact, or the compiler's diagnostics.
#[derive(Debug)]
pub enum CompileOutcome {
    Compiled(Artifact),
    Error(String),
}

/// A VM toolchain under test.
///
/// One handle per worker; handles are never shared across threads. Adapters
/// that talk to a shared device must serialize internally.
pub trait Vm: Send {
    /// Compile `source`, with `classpath` entries prepended to the adapter's
    /// default classpath. Compiler failure is an ordinary [CompileOutcome];
    /// `Err` means the toolchain itself is broken.
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome>;

    /// Run a compiled artifact. A deadline kill is reported in-band through
    /// the timeout sentinel in [RunResult].
    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult>;

    /// Whether the VM is still reachable. Checked before each submission so
    /// a dead device stops the pipeline instead of drowning it in errors.
    fn is_alive(&self) -> bool;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}
