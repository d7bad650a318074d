//! Utility functions for cman
//!
//! Small file and path helpers shared by the template applier, the reconciler
//! and the composite synchronizer.

use crate::error::{CmanError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Write a file by writing a hidden sibling and renaming it over the target
///
/// Readers never observe a half-written document. The temporary file is
/// hidden so a reconciliation running at the same time skips it.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(path)?;

    fs::write(&temp_path, content)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| CmanError::internal(format!("{:?} has no file name", path)))?;
    Ok(path.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}

/// Create a file that must not exist yet
///
/// Existence check and creation are one `create_new` call, so an existing
/// file is never overwritten.
pub fn create_new_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CmanError::DestinationExists(path.to_path_buf()),
            _ => CmanError::Io(e),
        })?;
    file.write_all(content)?;
    Ok(())
}

/// Create a directory that must not exist yet
pub fn create_new_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => CmanError::DestinationExists(path.to_path_buf()),
        _ => CmanError::Io(e),
    })
}

/// Write a file only if nothing exists at `path`; returns whether it was written
pub fn write_file_if_missing(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    create_new_file(path, content.as_bytes())?;
    Ok(true)
}

/// File name without its last extension
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Whether a path has the given extension (without the dot)
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy() == extension)
}

/// Dot-files are never part of the hierarchy
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Directory entries sorted by file name
///
/// `read_dir` order is platform dependent; sorting keeps sibling order stable
/// across runs.
pub fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}
