// Copyright 2024-2026 The jitdiff authors

//! The mutation contract and the Artemis adapter.
//!
//! A mutator derives, from a reference program, a program that the language
//! specification requires to behave identically. The harness never verifies
//! that equivalence; observed divergence under the VM is precisely the signal
//! it hunts for.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::debug;

use crate::hotspot::JavaToolchain;
use crate::Result;

/// What a mutation attempt produced. `mutant` is `None` when the mutator
/// rejected the reference, in which case `log` holds its diagnostics;
/// otherwise `log` is the mutation report.
#[derive(Debug)]
pub struct MutationOutcome {
    pub mutant: Option<Utf8PathBuf>,
    pub log: String,
}

/// An engine that rewrites a reference into a semantically equivalent mutant.
///
/// Must be deterministic under `seed`. On failure `out_dir` may exist but
/// holds no mutant file.
pub trait Mutator: Send {
    fn mutate(
        &self,
        reference: &Utf8Path,
        out_dir: &Utf8Path,
        seed: u32,
        timeout: Duration,
    ) -> Result<MutationOutcome>;
}

/// The Artemis mutator, invoked as an executable jar.
pub struct Artemis {
    jar: Utf8PathBuf,
    toolchain: JavaToolchain,
    policy: String,
    min_loop_trip: u32,
    max_loop_trip: u32,
    code_bricks: Utf8PathBuf,
    extra_opts: BTreeMap<String, String>,
}

impl Artemis {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jar: &Utf8Path,
        toolchain: JavaToolchain,
        policy: &str,
        min_loop_trip: u32,
        max_loop_trip: u32,
        code_bricks: &Utf8Path,
        extra_opts: BTreeMap<String, String>,
    ) -> Artemis {
        Artemis {
            jar: jar.to_owned(),
            toolchain,
            policy: policy.to_owned(),
            min_loop_trip,
            max_loop_trip,
            code_bricks: code_bricks.to_owned(),
            extra_opts,
        }
    }
}

impl Mutator for Artemis {
    fn mutate(
        &self,
        reference: &Utf8Path,
        out_dir: &Utf8Path,
        seed: u32,
        timeout: Duration,
    ) -> Result<MutationOutcome> {
        let mut args = vec!["-v".to_owned()];
        if !self.extra_opts.is_empty() {
            let joined = self
                .extra_opts
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .join(",");
            args.push(format!("-X{joined}"));
        }
        args.extend([
            "-s".to_owned(),
            seed.to_string(),
            "-p".to_owned(),
            self.policy.clone(),
            "-m".to_owned(),
            self.min_loop_trip.to_string(),
            "-M".to_owned(),
            self.max_loop_trip.to_string(),
            "-b".to_owned(),
            self.code_bricks.to_string(),
            "-o".to_owned(),
            out_dir.to_string(),
            "-i".to_owned(),
            reference.to_string(),
        ]);
        let result = self.toolchain.jar_run(&self.jar, &args, timeout)?;
        if result.exit_code != 0 {
            debug!(%reference, seed, "mutation failed");
            return Ok(MutationOutcome {
                mutant: None,
                log: result.output,
            });
        }
        let file_name = reference
            .file_name()
            .expect("reference file has a name");
        Ok(MutationOutcome {
            mutant: Some(out_dir.join(file_name)),
            log: result.output,
        })
    }
}
