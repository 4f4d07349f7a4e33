use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, Timelike};
use nasx_core::{FileEntry, NasPath};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tempfile::{TempDir, TempPath};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::io_utils;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to create archive: {0}")]
    ArchiveWrite(String),
    #[error("Failed to prepare staging area: {0}")]
    Staging(#[source] io::Error),
    #[error("{0} is outside the search root")]
    OutsideRoot(Utf8PathBuf),
    #[error("Temporary path is not valid UTF-8: {0}")]
    NonUtf8(PathBuf),
}

fn write_err(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::ArchiveWrite(e.to_string())
}

/// Per-request copy of the located files, laid out relative to the search root.
///
/// Owned by exactly one request. [`StagingSet::release`] removes the tree and
/// may be called any number of times; dropping the set releases it too.
#[derive(Debug)]
pub struct StagingSet {
    dir: Option<TempDir>,
    path: Utf8PathBuf,
    copied: usize,
    requested: usize,
}

impl StagingSet {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn copied(&self) -> usize {
        self.copied
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => info!("Cleaned up temporary directory: {}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Temporary directory already gone: {}", self.path)
            }
            Err(e) => warn!("Failed to cleanup temp directory {}: {}", self.path, e),
        }
    }
}

impl Drop for StagingSet {
    fn drop(&mut self) {
        self.release();
    }
}

/// A finished zip file on disk. Same release semantics as [`StagingSet`].
#[derive(Debug)]
pub struct Archive {
    file: Option<TempPath>,
    path: Utf8PathBuf,
    entries: usize,
    size: u64,
}

impl Archive {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }

    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => info!("Removed archive: {}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Archive already gone: {}", self.path)
            }
            Err(e) => warn!("Failed to remove archive {}: {}", self.path, e),
        }
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stages located files and packs them into a deflate-compressed zip.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    temp_root: Option<Utf8PathBuf>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create staging directories and archives under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    fn temp_root(&self) -> PathBuf {
        self.temp_root
            .as_ref()
            .map(|p| p.as_std_path().to_path_buf())
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Copy `entries` into a fresh staging directory at their path relative to `root`.
    ///
    /// A file that fails to copy is logged and skipped; compare
    /// [`StagingSet::copied`] with [`StagingSet::requested`] to detect it.
    pub fn stage(&self, entries: &[FileEntry], root: &Utf8Path) -> Result<StagingSet, ArchiveError> {
        let dir = tempfile::Builder::new()
            .prefix(nasx_config::STAGING_PREFIX)
            .tempdir_in(self.temp_root())
            .map_err(ArchiveError::Staging)?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(ArchiveError::NonUtf8)?;

        let mut staging = StagingSet {
            dir: Some(dir),
            path,
            copied: 0,
            requested: entries.len(),
        };

        for entry in entries {
            match Self::stage_one(entry, root, &staging.path) {
                Ok(rel) => {
                    debug!("Copied: {}", rel);
                    staging.copied += 1;
                }
                Err(e) => warn!("Failed to copy {}: {}", entry.path, e),
            }
        }

        info!(
            "Successfully copied {} of {} files to {}",
            staging.copied, staging.requested, staging.path
        );
        Ok(staging)
    }

    fn stage_one(
        entry: &FileEntry,
        root: &Utf8Path,
        staging_root: &Utf8Path,
    ) -> Result<Utf8PathBuf, ArchiveError> {
        let rel = entry
            .path
            .strip_prefix(root)
            .map_err(|_| ArchiveError::OutsideRoot(entry.path.clone()))?;
        if rel.as_str().is_empty() || !NasPath::verify_safe(rel.as_str()) {
            return Err(ArchiveError::OutsideRoot(entry.path.clone()));
        }
        io_utils::copy_preserving_times(&entry.path, &staging_root.join(rel))
            .map_err(ArchiveError::Staging)?;
        Ok(rel.to_path_buf())
    }

    /// Zip every regular file under the staging directory, named by its
    /// staging-relative path with `/` separators.
    pub fn pack(&self, staging: &StagingSet) -> Result<Archive, ArchiveError> {
        let named = tempfile::Builder::new()
            .prefix(nasx_config::ARCHIVE_PREFIX)
            .suffix(".zip")
            .tempfile_in(self.temp_root())
            .map_err(write_err)?;
        let (file, temp_path) = named.into_parts();
        let path = Utf8PathBuf::from_path_buf(temp_path.to_path_buf())
            .map_err(ArchiveError::NonUtf8)?;

        // `temp_path` deletes the half-written file if anything below fails.
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut entries = 0usize;

        for walk in WalkDir::new(staging.path()).sort_by_file_name() {
            let walk = walk.map_err(write_err)?;
            if !walk.file_type().is_file() {
                continue;
            }
            let rel = walk
                .path()
                .strip_prefix(staging.path())
                .map_err(write_err)?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let meta = walk.metadata().map_err(write_err)?;
            let options = match zip_timestamp(&meta) {
                Some(ts) => base.last_modified_time(ts),
                None => base,
            };

            writer.start_file(name.as_str(), options).map_err(write_err)?;
            let mut src = File::open(walk.path()).map_err(write_err)?;
            io::copy(&mut src, &mut writer).map_err(write_err)?;
            debug!("Added to zip: {}", name);
            entries += 1;
        }

        let mut out = writer.finish().map_err(write_err)?;
        out.flush().map_err(write_err)?;
        drop(out);

        let size = fs::metadata(&path).map_err(write_err)?.len();
        info!("Created zip archive: {} ({} entries, {} bytes)", path, entries, size);
        Ok(Archive {
            file: Some(temp_path),
            path,
            entries,
            size,
        })
    }
}

fn zip_timestamp(meta: &fs::Metadata) -> Option<zip::DateTime> {
    let modified: chrono::DateTime<chrono::Local> = meta.modified().ok()?.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(modified.year()).ok()?,
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    .ok()
}
