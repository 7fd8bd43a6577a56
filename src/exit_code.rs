// Copyright 2024-2026 The jitdiff authors

//! Exit codes from jitdiff.
//!
//! These are assigned so that automation driving long fuzzing campaigns can
//! distinguish a clean run from a configuration mistake or a crashed one.

/// The run completed and stopped normally (whether or not differences were found).
pub const SUCCESS: i32 = 0;

/// Wrong arguments, unreadable or invalid configuration, or a dead device
/// at startup. Clap parse errors are mapped to this too.
pub const USAGE: i32 = 1;

/// The pipeline stopped abnormally: VM death, a signal, or an internal error.
///
/// From sysexits EX_SOFTWARE.
pub const ABNORMAL: i32 = 70;
