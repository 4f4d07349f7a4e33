use camino::Utf8PathBuf;
use std::fmt;
use std::time::SystemTime;

pub mod api;
pub mod path_utils;
pub mod payload;
pub mod share;

pub use path_utils::{NasPath, NormalizedPath, PathError, PathKind};
pub use payload::{LenientPayload, ParseStrategy, Payload, PayloadError};
pub use share::{ShareMap, ShareMount, ShareMountParseError};

/// A spreadsheet located under a search root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: Utf8PathBuf,
    pub relative_path: Utf8PathBuf,
    pub filename: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Username/password pair used to mount a share.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both halves must be present, like the `net use` flow expects.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Self::new(u, p)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The fields the service reads out of a parsed request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasRequest {
    pub nas_path: String,
    pub credentials: Option<Credentials>,
}

impl NasRequest {
    pub fn from_payload(payload: &Payload) -> Result<Self, PayloadError> {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let nas_path = text("nas_path").ok_or(PayloadError::MissingField("nas_path"))?;
        Ok(Self {
            nas_path,
            credentials: Credentials::from_parts(text("username"), text("password")),
        })
    }
}
