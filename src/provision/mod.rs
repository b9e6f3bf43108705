//! Startup provisioning: make sure the model file and the tokenizer files are on local disk.
//!
//! Both steps are idempotent. A file that already exists is trusted as is
//! (no checksum or freshness check), and an archive that is gone is assumed to
//! have been extracted by an earlier run, which is then confirmed by looking
//! for the files the loader needs.

pub mod source;

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::ZipArchive;

use crate::config::ArtifactConfig;
use crate::error::{Error, Result};

pub use source::{source_for, ArtifactSource, GoogleDriveSource, HubSource};

#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub model_path: PathBuf,
    pub tokenizer_dir: PathBuf,
}

pub fn provision(config: &ArtifactConfig, source: &dyn ArtifactSource) -> Result<Provisioned> {
    ensure_file(source, &config.model_id, &config.model_path)?;

    // Once extracted the archive is deleted, so only fetch it when the
    // tokenizer directory is not already usable.
    let tokenizer_ready = locate_contents(&config.tokenizer_dir, &config.tokenizer_expected_files).is_ok();
    if !tokenizer_ready {
        ensure_file(
            source,
            &config.tokenizer_archive_id,
            &config.tokenizer_archive_path,
        )?;
    }

    let tokenizer_dir = ensure_archive_extracted(
        &config.tokenizer_archive_path,
        &config.tokenizer_dir,
        &config.tokenizer_expected_files,
    )?;

    Ok(Provisioned {
        model_path: config.model_path.clone(),
        tokenizer_dir,
    })
}

pub fn ensure_file(source: &dyn ArtifactSource, identifier: &str, destination: &Path) -> Result<()> {
    if destination.exists() {
        info!("{} already exists, skipping download.", destination.display());
        return Ok(());
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    info!("Downloading {}...", destination.display());
    let partial = partial_path(destination);
    if let Err(e) = source.fetch(identifier, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(match e {
            Error::Provisioning { .. } => e,
            other => Error::provisioning(destination, other),
        });
    }

    if partial.exists() {
        fs::rename(&partial, destination)?;
    }

    if !destination.exists() {
        return Err(Error::provisioning(
            destination,
            "file is still missing after the download attempt",
        ));
    }
    Ok(())
}

/// Unpack `archive` into `target_dir` if the archive is present, then delete it.
///
/// Returns the directory holding `expected`: either `target_dir` itself or a
/// single nested folder inside it (archives are often zipped with their
/// top-level directory).
pub fn ensure_archive_extracted(
    archive: &Path,
    target_dir: &Path,
    expected: &[String],
) -> Result<PathBuf> {
    if archive.exists() {
        info!("Extracting {}...", archive.display());
        fs::create_dir_all(target_dir)?;
        extract_zip(archive, target_dir)?;
        // Removed only after a complete extraction so a failed run retries.
        fs::remove_file(archive)?;
    } else {
        info!("Zip file {} not found, skipping extraction.", archive.display());
    }

    locate_contents(target_dir, expected)
}

fn extract_zip(archive: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| Error::provisioning(archive, e))?;
    zip.extract(target_dir).map_err(|e| {
        warn!("extraction of {} failed, keeping the archive", archive.display());
        Error::provisioning(archive, e)
    })
}

fn locate_contents(target_dir: &Path, expected: &[String]) -> Result<PathBuf> {
    if contains_all(target_dir, expected) {
        return Ok(target_dir.to_path_buf());
    }

    if target_dir.is_dir() {
        for entry in fs::read_dir(target_dir)? {
            let path = entry?.path();
            if path.is_dir() && contains_all(&path, expected) {
                return Ok(path);
            }
        }
    }

    Err(Error::provisioning(
        target_dir,
        format!("expected files not found: {}", expected.join(", ")),
    ))
}

fn contains_all(dir: &Path, expected: &[String]) -> bool {
    dir.is_dir() && expected.iter().all(|name| dir.join(name).is_file())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
