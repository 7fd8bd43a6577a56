// Copyright 2024-2026 The jitdiff authors

//! Handle SIGINT/SIGTERM by setting a global atomic and checking it from
//! long-running operations.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;

use crate::Result;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn install_handler() {
    // The `termination` feature makes this fire for SIGTERM as well as ctrl-c.
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
        .expect("install signal handler");
}

pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Return an error if the program was interrupted and should shut down.
pub fn check_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(anyhow!("interrupted"))
    } else {
        Ok(())
    }
}
