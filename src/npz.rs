//! NumPy-format output artifacts.
//!
//! One run (or one background unit) is persisted as a `.npz` archive whose
//! `"X"` member holds the feature rows as an `n x width` float matrix;
//! classifier scores, when present, ride along as a 1-D `"score"` member.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::info;
use npyz::WriterBuilder;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::features::RowBuffer;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

fn npy_bytes(values: &[f64], shape: &[u64]) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(shape)
        .writer(&mut bytes)
        .begin_nd()?;
    writer.extend(values.iter().copied())?;
    writer.finish()?;
    Ok(bytes)
}

/// Write `buffer` as the `"X"` member of a fresh `.npz` at `path`, creating
/// parent directories as needed.
pub fn write_features(path: &Path, buffer: &RowBuffer) -> Result<(), ArtifactError> {
    write_archive(path, buffer, None)
}

/// As [`write_features`], with per-row classifier scores in a `"score"`
/// member.
pub fn write_features_with_scores(
    path: &Path,
    buffer: &RowBuffer,
    scores: &[f64],
) -> Result<(), ArtifactError> {
    write_archive(path, buffer, Some(scores))
}

fn write_archive(
    path: &Path,
    buffer: &RowBuffer,
    scores: Option<&[f64]>,
) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Saving {} entries to {}", buffer.len(), path.display());
    let mut archive = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default();
    archive.start_file("X.npy", options)?;
    archive.write_all(&npy_bytes(
        buffer.as_slice(),
        &[buffer.len() as u64, buffer.width() as u64],
    )?)?;
    if let Some(scores) = scores {
        archive.start_file("score.npy", options)?;
        archive.write_all(&npy_bytes(scores, &[scores.len() as u64])?)?;
    }
    archive.finish()?;
    Ok(())
}
