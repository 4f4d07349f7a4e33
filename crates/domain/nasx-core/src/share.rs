use crate::path_utils::{NasPath, NormalizedPath, PathError, PathKind};
use camino::{Utf8Path, Utf8PathBuf};
use std::str::FromStr;

/// One `PREFIX=MOUNT` rule: a share prefix and where it is mounted locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareMount {
    pub prefix: NormalizedPath,
    pub mount_point: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareMountParseError {
    #[error("expected PREFIX=MOUNT, got '{0}'")]
    MissingSeparator(String),
    #[error("mount point is empty in '{0}'")]
    EmptyMountPoint(String),
    #[error("invalid share prefix: {0}")]
    Prefix(#[from] PathError),
}

impl FromStr for ShareMount {
    type Err = ShareMountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, mount) = s
            .split_once('=')
            .ok_or_else(|| ShareMountParseError::MissingSeparator(s.to_string()))?;
        let mount = mount.trim();
        if mount.is_empty() {
            return Err(ShareMountParseError::EmptyMountPoint(s.to_string()));
        }
        Ok(Self {
            prefix: NasPath::normalize(prefix)?,
            mount_point: Utf8PathBuf::from(mount),
        })
    }
}

/// Resolves normalized share paths to local filesystem paths.
///
/// On Windows UNC paths are native and the map is usually empty. Elsewhere the
/// share is mounted (CIFS/SMB) under some directory and each rule says where.
/// The first rule whose prefix matches on whole segments wins; UNC host and
/// share names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareMap {
    mounts: Vec<ShareMount>,
}

impl ShareMap {
    pub fn new(mounts: Vec<ShareMount>) -> Self {
        Self { mounts }
    }

    pub fn mounts(&self) -> &[ShareMount] {
        &self.mounts
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn resolve(&self, path: &NormalizedPath) -> Utf8PathBuf {
        for mount in &self.mounts {
            if let Some(rest) = strip_segments(path, &mount.prefix) {
                let mut out = mount.mount_point.clone();
                for seg in rest {
                    out.push(seg);
                }
                return out;
            }
        }
        Utf8PathBuf::from(path.as_str())
    }

    /// Local mount point for the rule covering `path`, if any.
    pub fn mount_point_for(&self, path: &NormalizedPath) -> Option<&Utf8Path> {
        self.mounts
            .iter()
            .find(|m| strip_segments(path, &m.prefix).is_some())
            .map(|m| m.mount_point.as_path())
    }

    /// The share-level prefix (`\\host\share`) a mount rule was written for.
    pub fn share_prefix_for(&self, path: &NormalizedPath) -> Option<&NormalizedPath> {
        self.mounts
            .iter()
            .find(|m| strip_segments(path, &m.prefix).is_some())
            .map(|m| &m.prefix)
    }
}

fn strip_segments<'a>(path: &'a NormalizedPath, prefix: &NormalizedPath) -> Option<Vec<&'a str>> {
    if path.kind() != prefix.kind() {
        return None;
    }
    let mut segs = path.segments();
    for want in prefix.segments() {
        let got = segs.next()?;
        let same = match path.kind() {
            PathKind::Unc => got.eq_ignore_ascii_case(want),
            PathKind::Local => got == want,
        };
        if !same {
            return None;
        }
    }
    Some(segs.collect())
}
