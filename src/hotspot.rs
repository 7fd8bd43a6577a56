// Copyright 2024-2026 The jitdiff authors

//! HotSpot-family toolchains: HotSpot itself, OpenJ9, and Graal.
//!
//! All three compile with `javac` and run with `java`; they differ only in
//! the flags that force the JIT and, for Graal, in how much time a forced
//! JIT run is granted.

use std::time::Duration;

use anyhow::{ensure, Context};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;

use crate::outcome::RunResult;
use crate::process::run_captured;
use crate::vm::{Artifact, CompileOutcome, ForceMode, Vm};
use crate::Result;

/// A JDK installation: `javac` to compile, `java` to run classes and jars.
///
/// Used directly as the mutator's host toolchain and embedded in every
/// HotSpot-family VM adapter.
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    home: Utf8PathBuf,
    javac: Utf8PathBuf,
    java: Utf8PathBuf,
    classpath: Vec<String>,
}

impl JavaToolchain {
    pub fn new(home: &Utf8Path, classpath: Vec<String>) -> Result<JavaToolchain> {
        let javac = home.join("bin/javac");
        let java = home.join("bin/java");
        ensure!(javac.is_file(), "command `javac` does not exist in {home}");
        ensure!(java.is_file(), "command `java` does not exist in {home}");
        Ok(JavaToolchain {
            home: home.to_owned(),
            javac,
            java,
            classpath,
        })
    }

    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    /// Compile one source file next to its dependencies.
    ///
    /// The source's own directory is always on the classpath, followed by the
    /// per-call entries and then the toolchain's defaults.
    pub fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        let class_dir = source
            .parent()
            .context("source file has no parent directory")?
            .to_owned();
        let cp = std::iter::once(class_dir.as_str())
            .chain(classpath.iter().map(String::as_str))
            .chain(self.classpath.iter().map(String::as_str))
            .join(":");
        let argv = vec![
            self.javac.to_string(),
            "-cp".to_owned(),
            cp,
            source.to_string(),
        ];
        let result = run_captured(&argv, None, &[], timeout)?;
        if result.exit_code != 0 {
            return Ok(CompileOutcome::Error(result.output));
        }
        let main_class = source
            .file_stem()
            .context("source file has no stem")?
            .to_owned();
        Ok(CompileOutcome::Compiled(Artifact {
            class_dir,
            main_class,
            jar: None,
        }))
    }

    /// `java -jar`, used to drive the mutator.
    pub fn jar_run(&self, jar: &Utf8Path, args: &[String], timeout: Duration) -> Result<RunResult> {
        let mut argv = vec![
            self.java.to_string(),
            "-jar".to_owned(),
            jar.to_string(),
        ];
        argv.extend(args.iter().cloned());
        run_captured(&argv, None, &[], timeout)
    }

    fn run_class(
        &self,
        artifact: &Artifact,
        args: &[String],
        vm_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let mut argv = vec![
            self.java.to_string(),
            "-cp".to_owned(),
            artifact.class_dir.to_string(),
        ];
        argv.extend(vm_opts.iter().cloned());
        argv.push(artifact.main_class.clone());
        argv.extend(args.iter().cloned());
        run_captured(&argv, None, &[], timeout)
    }
}

/// Build the VM option list: force flag first, then per-call extras, then
/// the configured defaults.
fn vm_opts(force_flag: Option<&str>, extra_opts: &[String], default_opts: &[String]) -> Vec<String> {
    force_flag
        .map(str::to_owned)
        .into_iter()
        .chain(extra_opts.iter().cloned())
        .chain(default_opts.iter().cloned())
        .collect()
}

pub struct HotSpot {
    toolchain: JavaToolchain,
    default_opts: Vec<String>,
}

impl HotSpot {
    pub fn new(java_home: &Utf8Path, classpath: Vec<String>, options: Vec<String>) -> Result<HotSpot> {
        Ok(HotSpot {
            toolchain: JavaToolchain::new(java_home, classpath)?,
            default_opts: options,
        })
    }

    fn run_forced(
        &self,
        artifact: &Artifact,
        args: &[String],
        force_flag: Option<&str>,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let opts = vm_opts(force_flag, extra_opts, &self.default_opts);
        self.toolchain.run_class(artifact, args, &opts, timeout)
    }
}

impl Vm for HotSpot {
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        self.toolchain.compile(source, classpath, timeout)
    }

    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let flag = match force {
            ForceMode::None => None,
            ForceMode::Interpret => Some("-Xint"),
            ForceMode::Jit => Some("-Xcomp"),
        };
        self.run_forced(artifact, args, flag, extra_opts, timeout)
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("hotspot:{}", self.toolchain.home())
    }
}

/// OpenJ9 shares the HotSpot command shape; only the forced-JIT flag differs.
pub struct OpenJ9(HotSpot);

impl OpenJ9 {
    pub fn new(java_home: &Utf8Path, classpath: Vec<String>, options: Vec<String>) -> Result<OpenJ9> {
        Ok(OpenJ9(HotSpot::new(java_home, classpath, options)?))
    }
}

impl Vm for OpenJ9 {
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        self.0.compile(source, classpath, timeout)
    }

    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let flag = match force {
            ForceMode::None => None,
            ForceMode::Interpret => Some("-Xint"),
            ForceMode::Jit => Some("-Xjit:count=0"),
        };
        self.0.run_forced(artifact, args, flag, extra_opts, timeout)
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("openj9:{}", self.0.toolchain.home())
    }
}

/// Graal behaves like HotSpot but its forced JIT warms up slowly, so forced
/// runs get twice the deadline.
pub struct Graal(HotSpot);

impl Graal {
    pub fn new(java_home: &Utf8Path, classpath: Vec<String>, options: Vec<String>) -> Result<Graal> {
        Ok(Graal(HotSpot::new(java_home, classpath, options)?))
    }
}

impl Vm for Graal {
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        self.0.compile(source, classpath, timeout)
    }

    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let timeout = if force == ForceMode::Jit {
            timeout * 2
        } else {
            timeout
        };
        self.0.run(artifact, args, force, extra_opts, timeout)
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("graal:{}", self.0.toolchain.home())
    }
}
