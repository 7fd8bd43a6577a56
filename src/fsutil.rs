// Copyright 2024-2026 The jitdiff authors

//! Small filesystem helpers for shuffling reference and mutant trees around.

use std::fs;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::Result;

/// Copy one file into a directory, keeping its name.
pub fn copy_into(file: &Utf8Path, dest_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let name = file.file_name().context("file has no name")?;
    let dest = dest_dir.join(name);
    fs::copy(file, &dest).with_context(|| format!("copy {file} to {dest}"))?;
    Ok(dest)
}

/// Copy the top-level plain files of `from_dir` into `to_dir`, skipping
/// subdirectories entirely.
pub fn copy_top_level_files(from_dir: &Utf8Path, to_dir: &Utf8Path) -> Result<()> {
    for entry in from_dir
        .read_dir_utf8()
        .with_context(|| format!("read dir {from_dir}"))?
    {
        let entry = entry.with_context(|| format!("read dir entry in {from_dir}"))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        copy_into(entry.path(), to_dir)?;
    }
    Ok(())
}

/// Copy the top-level files of `from_dir` whose extension is in `extensions`
/// into `to_dir`, except a file named `skip_name`.
pub fn copy_files_with_extensions(
    from_dir: &Utf8Path,
    to_dir: &Utf8Path,
    extensions: &[&str],
    skip_name: &str,
) -> Result<()> {
    for entry in from_dir
        .read_dir_utf8()
        .with_context(|| format!("read dir {from_dir}"))?
    {
        let entry = entry.with_context(|| format!("read dir entry in {from_dir}"))?;
        let path = entry.path();
        match path.extension() {
            Some(ext) if extensions.contains(&ext) => {}
            _ => continue,
        }
        if path.file_name() == Some(skip_name) {
            continue;
        }
        copy_into(path, to_dir)?;
    }
    Ok(())
}

/// Move a directory, falling back to copy-and-remove when the rename
/// crosses filesystems.
pub fn move_dir(from_dir: &Utf8Path, to_dir: &Utf8Path) -> Result<()> {
    if fs::rename(from_dir, to_dir).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(from_dir, to_dir)?;
    fs::remove_dir_all(from_dir).with_context(|| format!("remove {from_dir} after copy"))
}

/// Recursively copy a directory tree.
pub fn copy_dir_recursive(from_dir: &Utf8Path, to_dir: &Utf8Path) -> Result<()> {
    fs::create_dir_all(to_dir).with_context(|| format!("create dir {to_dir}"))?;
    for entry in from_dir
        .read_dir_utf8()
        .with_context(|| format!("read dir {from_dir}"))?
    {
        let entry = entry.with_context(|| format!("read dir entry in {from_dir}"))?;
        let dest = to_dir.join(entry.file_name());
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            copy_dir_recursive(entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("copy {} to {dest}", entry.path()))?;
        }
    }
    Ok(())
}
