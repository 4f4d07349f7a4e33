use std::fmt;
use tracing::debug;

/// Leading marker of a canonical UNC path.
pub const UNC_PREFIX: &str = r"\\";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Path cannot be empty")]
    Empty,
    #[error("Invalid UNC path after normalization: '{0}'")]
    InvalidUnc(String),
    #[error("Path has no segments left after normalization: '{0}'")]
    NoSegments(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Unc,
    Local,
}

/// A path in canonical form. Only [`NasPath::normalize`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    value: String,
    kind: PathKind,
}

impl NormalizedPath {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn is_unc(&self) -> bool {
        self.kind == PathKind::Unc
    }

    pub fn separator(&self) -> char {
        match self.kind {
            PathKind::Unc => '\\',
            PathKind::Local => std::path::MAIN_SEPARATOR,
        }
    }

    /// Non-empty segments; for UNC paths the first two are host and share.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let sep = self.separator();
        self.value.split(sep).filter(|s| !s.is_empty())
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

pub struct NasPath;

impl NasPath {
    /// Canonicalize a user-supplied directory path.
    ///
    /// UNC inputs (`\\host\share`, `//host/share`, `\host\share`, or any mix of
    /// slash directions and repeated separators) come out as `\\host\share`.
    /// Everything else has separator runs collapsed to the platform separator.
    /// Trailing separators and colons are removed. Normalizing an already
    /// normalized path returns it unchanged.
    pub fn normalize(raw: &str) -> Result<NormalizedPath, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        debug!("Original path received: '{}' ({} chars)", raw, raw.len());

        let kind = Self::classify(trimmed);
        let collapsed = match kind {
            PathKind::Unc => Self::collapse_unc(trimmed),
            PathKind::Local => {
                collapse_separators(trimmed, |c| c == '/' || c == '\\', std::path::MAIN_SEPARATOR)
            }
        };

        let cleaned = collapsed
            .trim_end_matches(|c: char| c == '\\' || c == '/' || c == ':' || c.is_whitespace());

        match kind {
            PathKind::Unc => {
                let body = cleaned.strip_prefix(UNC_PREFIX).unwrap_or("");
                if body.is_empty() || body.starts_with('\\') {
                    return Err(PathError::InvalidUnc(trimmed.to_string()));
                }
            }
            PathKind::Local => {
                if cleaned.is_empty() {
                    return Err(PathError::NoSegments(trimmed.to_string()));
                }
            }
        }

        debug!("Normalized path: '{}' ({:?})", cleaned, kind);
        Ok(NormalizedPath {
            value: cleaned.to_string(),
            kind,
        })
    }

    pub fn classify(path: &str) -> PathKind {
        if path.starts_with("//") || path.starts_with('\\') {
            PathKind::Unc
        } else {
            PathKind::Local
        }
    }

    /// Reject relative paths that could climb out of the directory they are joined to.
    pub fn verify_safe(rel_path: &str) -> bool {
        let p = std::path::Path::new(rel_path);
        !p.is_absolute()
            && !p
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }

    fn collapse_unc(path: &str) -> String {
        // Any number of leading separators ends up as exactly two.
        let unified = path.replace('/', "\\");
        let body = unified.trim_start_matches('\\');
        let mut out = String::with_capacity(body.len() + UNC_PREFIX.len());
        out.push_str(UNC_PREFIX);
        out.push_str(&collapse_separators(body, |c| c == '\\', '\\'));
        out
    }
}

fn collapse_separators(input: &str, is_sep: impl Fn(char) -> bool, sep: char) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if is_sep(c) {
            if !in_run {
                out.push(sep);
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}
