use camino::{Utf8Path, Utf8PathBuf};
use nasx_core::FileEntry;
use std::fs;
use std::io;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("Path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),
    #[error("Path is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(Utf8PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LocateError {
    fn from_io(path: &Utf8Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => LocateError::PathNotFound(path.to_owned()),
            io::ErrorKind::PermissionDenied => LocateError::PermissionDenied(path.to_owned()),
            _ => LocateError::Io {
                path: path.to_owned(),
                source: err,
            },
        }
    }
}

pub struct Locator;

impl Locator {
    fn mtime(meta: &fs::Metadata) -> Option<SystemTime> {
        meta.modified().ok()
    }

    /// Lazily enumerate files under `root` whose extension is `ext`.
    ///
    /// The root is checked up front; the walk itself is deferred to the
    /// returned iterator, which visits entries in file-name order at every
    /// level so two walks over the same tree agree.
    pub fn find_by_extension(root: &Utf8Path, ext: &str) -> Result<FileIter, LocateError> {
        let meta = fs::metadata(root).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound && root.as_str().starts_with(r"\\") {
                warn!("{} looks like a UNC path; ensure the network share is reachable", root);
            }
            LocateError::from_io(root, e)
        })?;
        if !meta.is_dir() {
            return Err(LocateError::NotADirectory(root.to_owned()));
        }
        // Surface an unreadable root as an error instead of an empty walk.
        fs::read_dir(root).map_err(|e| LocateError::from_io(root, e))?;

        info!("Searching for .{} files in {}", ext.trim_start_matches('.'), root);
        Ok(FileIter {
            root: root.to_owned(),
            ext: ext.trim_start_matches('.').to_string(),
            walker: WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
        })
    }

    pub fn collect(root: &Utf8Path, ext: &str) -> Result<Vec<FileEntry>, LocateError> {
        let files: Vec<FileEntry> = Self::find_by_extension(root, ext)?.collect();
        info!("Found {} .{} files in {}", files.len(), ext.trim_start_matches('.'), root);
        Ok(files)
    }
}

/// Single-pass iterator over matching files. Unreadable entries are logged and skipped.
pub struct FileIter {
    root: Utf8PathBuf,
    ext: String,
    walker: walkdir::IntoIter,
}

impl FileIter {
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn matches(&self, path: &Utf8Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        if cfg!(any(windows, target_os = "macos")) {
            ext.eq_ignore_ascii_case(&self.ext)
        } else {
            ext == self.ext
        }
    }
}

impl Iterator for FileIter {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                warn!("Skipping non UTF-8 path: {}", entry.path().display());
                continue;
            };
            if !self.matches(path) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    continue;
                }
            };
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };

            debug!("Matched {}", relative);
            return Some(FileEntry {
                path: path.to_owned(),
                relative_path: relative.to_owned(),
                filename: path.file_name().unwrap_or_default().to_string(),
                size: meta.len(),
                modified: Locator::mtime(&meta),
            });
        }
    }
}
