// Copyright 2024-2026 The jitdiff authors

//! Android Runtime toolchains: host-mode ART and a device behind adb.
//!
//! Both compile with `javac` followed by `d8` to pack a dex jar. Host ART
//! runs the jar with the `art` launcher script; target ART pushes the jar to
//! a device and runs it under `dalvikvm` (or `app_process`) through
//! `adb shell`.

use std::time::Duration;

use anyhow::{ensure, Context};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::hotspot::JavaToolchain;
use crate::outcome::RunResult;
use crate::process::run_captured;
use crate::vm::{Artifact, CompileOutcome, ForceMode, Vm};
use crate::Result;

/// Deadline for adb plumbing commands (push, rm, probes), which are not part
/// of the measured program run.
const ADB_TIMEOUT: Duration = Duration::from_secs(30);

/// Scratch directory on the device.
const DEVICE_WORK_DIR: &str = "/sdcard/ax.art";

/// Compile a source file to a dex jar: javac, then d8 over every class file
/// in the source's directory.
fn compile_dex(
    toolchain: &JavaToolchain,
    d8: &Utf8Path,
    min_api: u32,
    source: &Utf8Path,
    classpath: &[String],
    timeout: Duration,
) -> Result<CompileOutcome> {
    let artifact = match toolchain.compile(source, classpath, timeout)? {
        CompileOutcome::Compiled(artifact) => artifact,
        err @ CompileOutcome::Error(_) => return Ok(err),
    };
    let jar = artifact.class_dir.join("test.jar");
    let mut argv = vec![
        d8.to_string(),
        "--output".to_owned(),
        jar.to_string(),
        "--min-api".to_owned(),
        min_api.to_string(),
    ];
    for entry in artifact
        .class_dir
        .read_dir_utf8()
        .with_context(|| format!("read dir {}", artifact.class_dir))?
    {
        let entry = entry.context("read class dir entry")?;
        match entry.path().extension() {
            Some("class") | Some("dex") => argv.push(entry.path().to_string()),
            _ => {}
        }
    }
    let result = run_captured(&argv, None, &[], timeout)?;
    if result.exit_code != 0 {
        return Ok(CompileOutcome::Error(result.output));
    }
    Ok(CompileOutcome::Compiled(Artifact {
        jar: Some(jar),
        ..artifact
    }))
}

fn force_flag(force: ForceMode) -> Option<&'static str> {
    match force {
        ForceMode::None => None,
        ForceMode::Interpret => Some("-Xint"),
        ForceMode::Jit => Some("-Xjitthreshold:0"),
    }
}

/// ART built from an AOSP tree, run on the build host.
pub struct HostArt {
    host_home: Utf8PathBuf,
    art: Utf8PathBuf,
    d8: Utf8PathBuf,
    boot_classpath: Vec<String>,
    toolchain: JavaToolchain,
    min_api: u32,
    default_opts: Vec<String>,
}

impl HostArt {
    pub fn new(
        host_home: &Utf8Path,
        toolchain: JavaToolchain,
        min_api: u32,
        options: Vec<String>,
    ) -> Result<HostArt> {
        let bin = host_home.join("host/linux-x86/bin");
        let art = bin.join("art");
        let d8 = bin.join("d8");
        ensure!(art.is_file(), "command `art` does not exist in {host_home}");
        ensure!(d8.is_file(), "command `d8` does not exist in {host_home}");
        let libs = host_home.join("host/common/obj/JAVA_LIBRARIES");
        let boot_classpath = vec![
            libs.join("core-libart-hostdex_intermediates/classes.jar")
                .into_string(),
            libs.join("core-oj-hostdex_intermediates/classes.jar")
                .into_string(),
        ];
        Ok(HostArt {
            host_home: host_home.to_owned(),
            art,
            d8,
            boot_classpath,
            toolchain,
            min_api,
            default_opts: options,
        })
    }
}

impl Vm for HostArt {
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        let mut classpath = classpath.to_vec();
        classpath.extend(self.boot_classpath.iter().cloned());
        compile_dex(
            &self.toolchain,
            &self.d8,
            self.min_api,
            source,
            &classpath,
            timeout,
        )
    }

    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let jar = artifact.jar.as_ref().context("host-art artifact has no jar")?;
        // ANDROID_LOG_TAGS=*:f silences the "pre-compiled image not found"
        // chatter that would otherwise pollute the compared output;
        // ANDROID_DATA keeps ART's profiling droppings out of the tree.
        let data_dir = tempfile::Builder::new()
            .prefix("android-data-")
            .tempdir_in(jar.parent().context("jar has no parent")?)
            .context("create android-data directory")?;
        let mut argv = vec![
            self.art.to_string(),
            "--64".to_owned(),
            "--no-compile".to_owned(),
            "--".to_owned(),
            "-cp".to_owned(),
            jar.to_string(),
        ];
        argv.extend(force_flag(force).map(str::to_owned));
        argv.extend(extra_opts.iter().cloned());
        argv.extend(self.default_opts.iter().cloned());
        argv.push(artifact.main_class.clone());
        argv.extend(args.iter().cloned());
        let env = [
            ("ANDROID_LOG_TAGS".to_owned(), "*:f".to_owned()),
            (
                "ANDROID_DATA".to_owned(),
                data_dir.path().to_string_lossy().into_owned(),
            ),
        ];
        run_captured(&argv, None, &env, timeout)
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("art:host:{}", self.host_home)
    }
}

/// ART on a physical or emulated device reached through adb.
pub struct TargetArt {
    d8: Utf8PathBuf,
    adb: Utf8PathBuf,
    serial: String,
    app_process: bool,
    toolchain: JavaToolchain,
    min_api: u32,
    default_opts: Vec<String>,
}

impl TargetArt {
    /// Build the adapter and establish the device work directory. Fails if
    /// the device does not answer.
    pub fn new(
        android_home: &Utf8Path,
        build_tools: &str,
        serial: &str,
        app_process: bool,
        toolchain: JavaToolchain,
        min_api: u32,
        options: Vec<String>,
    ) -> Result<TargetArt> {
        let d8 = android_home.join("build-tools").join(build_tools).join("d8");
        ensure!(
            d8.is_file(),
            "command `d8` does not exist in build tools {build_tools}"
        );
        let adb = android_home.join("platform-tools/adb");
        ensure!(adb.is_file(), "command `adb` does not exist in {android_home}");
        let vm = TargetArt {
            d8,
            adb,
            serial: serial.to_owned(),
            app_process,
            toolchain,
            min_api,
            default_opts: options,
        };
        let res = vm.adb(&["shell", "mkdir", "-p", DEVICE_WORK_DIR])?;
        ensure!(
            res.exit_code == 0,
            "failed to connect to android device {serial}: {}",
            res.output
        );
        Ok(vm)
    }

    fn adb(&self, args: &[&str]) -> Result<RunResult> {
        let mut argv = vec![self.adb.to_string(), "-s".to_owned(), self.serial.clone()];
        argv.extend(args.iter().map(|a| a.to_string()));
        run_captured(&argv, None, &[], ADB_TIMEOUT)
    }
}

impl Vm for TargetArt {
    fn compile(
        &self,
        source: &Utf8Path,
        classpath: &[String],
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        compile_dex(
            &self.toolchain,
            &self.d8,
            self.min_api,
            source,
            classpath,
            timeout,
        )
    }

    fn run(
        &self,
        artifact: &Artifact,
        args: &[String],
        force: ForceMode,
        extra_opts: &[String],
        timeout: Duration,
    ) -> Result<RunResult> {
        let jar = artifact.jar.as_ref().context("target-art artifact has no jar")?;
        // A unique on-device name so concurrent workers sharing a device
        // cannot clobber each other's jars.
        let device_jar = format!("{}/{:032x}.jar", DEVICE_WORK_DIR, fastrand::u128(..));
        let push = self.adb(&["push", jar.as_str(), device_jar.as_str()])?;
        if push.exit_code != 0 {
            return Ok(push);
        }
        let mut art_cmd = if self.app_process {
            vec!["app_process".to_owned()]
        } else {
            vec!["dalvikvm".to_owned()]
        };
        art_cmd.push("-cp".to_owned());
        art_cmd.push(device_jar.clone());
        art_cmd.extend(force_flag(force).map(str::to_owned));
        art_cmd.extend(extra_opts.iter().cloned());
        art_cmd.extend(self.default_opts.iter().cloned());
        if self.app_process {
            art_cmd.push(DEVICE_WORK_DIR.to_owned());
        }
        art_cmd.push(artifact.main_class.clone());
        art_cmd.extend(args.iter().cloned());

        let mut argv = vec![
            self.adb.to_string(),
            "-s".to_owned(),
            self.serial.clone(),
            "shell".to_owned(),
        ];
        argv.extend(art_cmd);
        let result = run_captured(&argv, None, &[], timeout);

        // Always reclaim device space, even after a timeout kill.
        match self.adb(&["shell", "rm", "-rf", device_jar.as_str()]) {
            Ok(rm) if rm.exit_code == 0 => {}
            Ok(rm) => warn!(jar = %device_jar, output = %rm.output, "failed to remove device jar"),
            Err(err) => warn!(jar = %device_jar, ?err, "failed to remove device jar"),
        }
        result
    }

    fn is_alive(&self) -> bool {
        // Three ways to be dead: adb cannot enumerate, the device dropped off
        // the list, or its filesystem no longer accepts writes.
        let devices = match run_captured(
            &[self.adb.to_string(), "devices".to_owned()],
            None,
            &[],
            ADB_TIMEOUT,
        ) {
            Ok(res) => res,
            Err(_) => return false,
        };
        if devices.exit_code != 0 || !devices.output.contains(&format!("{}\tdevice", self.serial)) {
            return false;
        }
        let probe = format!("{DEVICE_WORK_DIR}/.jitdiff.aliveness");
        matches!(self.adb(&["shell", "touch", probe.as_str()]), Ok(res) if res.exit_code == 0)
    }

    fn describe(&self) -> String {
        format!("art:target:{}", self.serial)
    }
}
