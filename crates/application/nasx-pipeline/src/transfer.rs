use camino::{Utf8Path, Utf8PathBuf};
use nasx_scanner::LocateError;
use std::fs;
use std::io;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::io_utils;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Source(#[from] LocateError),
    #[error("Failed to create target directory {path}: {source}")]
    Target {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: Utf8PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8(std::path::PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files_copied: usize,
    pub bytes_copied: u64,
}

/// Copy every regular file under `src` into `dst`, keeping the relative layout
/// and modification times. The first failing file aborts the copy.
pub fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> Result<CopyReport, TransferError> {
    let meta = fs::metadata(src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LocateError::PathNotFound(src.to_owned()),
        io::ErrorKind::PermissionDenied => LocateError::PermissionDenied(src.to_owned()),
        _ => LocateError::Io {
            path: src.to_owned(),
            source: e,
        },
    })?;
    if !meta.is_dir() {
        return Err(LocateError::NotADirectory(src.to_owned()).into());
    }

    fs::create_dir_all(dst).map_err(|source| TransferError::Target {
        path: dst.to_owned(),
        source,
    })?;

    info!("Starting to copy files from {} to {}", src, dst);
    let mut report = CopyReport::default();

    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| TransferError::Walk {
            root: src.to_owned(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| TransferError::NonUtf8(entry.path().to_path_buf()))?;
        let Ok(rel) = path.strip_prefix(src) else {
            continue;
        };

        let bytes = io_utils::copy_preserving_times(path, &dst.join(rel)).map_err(|source| {
            TransferError::Copy {
                path: path.to_owned(),
                source,
            }
        })?;
        debug!("Copied: {}", rel);
        report.files_copied += 1;
        report.bytes_copied += bytes;
    }

    info!("Copy completed! Total {} files copied", report.files_copied);
    Ok(report)
}
