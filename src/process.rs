// Copyright 2024-2026 The jitdiff authors

//! Run a subprocess with polling, a wall-clock deadline, and group
//! termination.
//!
//! Every child runs in its own process group on Unix, so that grandchildren
//! (a VM forking helpers, `adb` spawning a server) are also killed when the
//! deadline passes or the run is interrupted. Timeouts are reported in-band
//! through [TIMEOUT_EXIT_CODE] rather than as errors: a deadline kill is an
//! expected outcome of fuzzing, not a failure of the harness.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::time::{Duration, Instant};

use anyhow::Context;
use camino::Utf8Path;
use subprocess::{ExitStatus, Popen, PopenConfig, Redirection};
use tracing::{debug, trace, warn};

use crate::interrupt::check_interrupted;
use crate::outcome::{RunResult, TIMEOUT_EXIT_CODE};
use crate::Result;

/// How frequently to check whether the child finished.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command, capturing combined stdout+stderr, with a deadline.
///
/// On timeout the whole process group is killed and the result carries
/// [TIMEOUT_EXIT_CODE] plus whatever output was produced before the kill.
pub fn run_captured(
    argv: &[String],
    cwd: Option<&Utf8Path>,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<RunResult> {
    let mut out_file = tempfile::tempfile().context("create capture file")?;
    let status = spawn_and_wait(
        argv,
        cwd,
        env,
        out_file.try_clone().context("clone capture file")?,
        timeout,
    )?;
    out_file
        .seek(SeekFrom::Start(0))
        .context("rewind capture file")?;
    let mut buf = Vec::new();
    out_file
        .read_to_end(&mut buf)
        .context("read captured output")?;
    Ok(RunResult {
        exit_code: status,
        output: String::from_utf8_lossy(&buf).into_owned(),
    })
}

/// Run a command with combined stdout+stderr redirected into `out_file`.
///
/// Used by generators that stream a program source to a file. Returns the
/// exit code, with [TIMEOUT_EXIT_CODE] on a deadline kill.
pub fn run_redirected(
    argv: &[String],
    cwd: Option<&Utf8Path>,
    out_file: File,
    timeout: Duration,
) -> Result<i32> {
    spawn_and_wait(argv, cwd, &[], out_file, timeout)
}

/// Spawn in a fresh process group and poll until exit, deadline, or interrupt.
fn spawn_and_wait(
    argv: &[String],
    cwd: Option<&Utf8Path>,
    env: &[(String, String)],
    out_file: File,
    timeout: Duration,
) -> Result<i32> {
    let start = Instant::now();
    debug!(?argv, ?timeout, "spawn");
    let mut os_env = PopenConfig::current_env();
    os_env.extend(
        env.iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );
    let mut child = Popen::create(
        argv,
        PopenConfig {
            stdin: Redirection::None,
            stdout: Redirection::File(out_file),
            stderr: Redirection::Merge,
            cwd: cwd.map(|d| d.as_os_str().to_owned()),
            env: Some(os_env),
            ..setpgid_on_unix()
        },
    )
    .with_context(|| format!("failed to spawn {}", argv.join(" ")))?;
    let exit_status = loop {
        if start.elapsed() > timeout {
            debug!(
                elapsed = ?start.elapsed(),
                "timeout, killing child process group"
            );
            kill_group(&mut child)?;
            return Ok(TIMEOUT_EXIT_CODE);
        } else if let Err(e) = check_interrupted() {
            debug!("interrupted, killing child process group");
            kill_group(&mut child)?;
            return Err(e);
        } else if let Some(status) = child
            .wait_timeout(WAIT_POLL_INTERVAL)
            .context("wait for child")?
        {
            break status;
        }
    };
    trace!(?exit_status, elapsed = ?start.elapsed(), "child exited");
    Ok(exit_code(exit_status))
}

/// Map a child's exit status to the integer stored in [RunResult].
///
/// Deaths by signal are reported as the negated signal number, so they can
/// never collide with an ordinary exit code.
fn exit_code(status: ExitStatus) -> i32 {
    match status {
        ExitStatus::Exited(code) => code as i32,
        ExitStatus::Signaled(sig) => -(sig as i32),
        ExitStatus::Other(code) => code,
        ExitStatus::Undetermined => {
            warn!("child exit status undetermined");
            -1
        }
    }
}

/// Kill the child's whole process group and reap it.
fn kill_group(child: &mut Popen) -> Result<()> {
    kill_group_impl(child)?;
    if child
        .wait_timeout(Duration::from_secs(10))
        .context("wait for child after killing its process group")?
        .is_none()
    {
        warn!("child did not exit after process group kill");
    }
    Ok(())
}

#[cfg(unix)]
fn kill_group_impl(child: &mut Popen) -> Result<()> {
    use anyhow::anyhow;
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};

    let pid = nix::unistd::Pid::from_raw(
        child
            .pid()
            .expect("child has a pid")
            .try_into()
            .expect("pid fits in i32"),
    );
    if let Err(errno) = killpg(pid, Signal::SIGKILL) {
        // It might have already exited, in which case we can proceed to wait for it.
        if errno != Errno::ESRCH {
            let message = format!("failed to kill child process group: {errno}");
            warn!("{}", message);
            return Err(anyhow!(message));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_group_impl(child: &mut Popen) -> Result<()> {
    use anyhow::anyhow;

    if let Err(e) = child.kill() {
        let message = format!("failed to kill child: {e}");
        warn!("{}", message);
        return Err(anyhow!(message));
    }
    Ok(())
}

#[cfg(unix)]
fn setpgid_on_unix() -> PopenConfig {
    PopenConfig {
        setpgid: true,
        ..Default::default()
    }
}

#[cfg(not(unix))]
fn setpgid_on_unix() -> PopenConfig {
    Default::default()
}
