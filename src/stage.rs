//! Scoped local staging of input units.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("failed to stage {path:?}: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `"{parent directory}/{file name}"` of a path, used both for staging
/// destinations and output artifact names.
pub fn dirname_plus_basename(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if parent.is_empty() {
        base
    } else {
        format!("{parent}/{base}")
    }
}

/// Like [`dirname_plus_basename`] but with the file extension dropped, the
/// identifier an input unit's output artifact is named after.
pub fn unit_id(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if parent.is_empty() {
        stem
    } else {
        format!("{parent}/{stem}")
    }
}

/// A transient local copy of an input unit, removed when dropped.
///
/// Acquired before a unit is processed; the temporary file is removed when
/// the guard goes out of scope whether processing succeeded or failed.
#[derive(Debug)]
pub struct LocalCopy {
    path: PathBuf,
}

impl LocalCopy {
    /// Copy `source` under `tmp_dir`, keeping its `parent/name` tail so
    /// same-named files from different directories cannot collide.
    pub fn stage(source: &Path, tmp_dir: &Path) -> Result<Self, StageError> {
        let destination = tmp_dir.join(dirname_plus_basename(source));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source_err| StageError::Copy {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        }
        fs::copy(source, &destination).map_err(|source_err| StageError::Copy {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        Ok(Self { path: destination })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalCopy {
    fn drop(&mut self) {
        info!("Removing {}", self.path.display());
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("could not remove {}: {err}", self.path.display());
        }
    }
}
