//! Central configuration constants for runtime limits and defaults.

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "NAS Excel Downloader";

/// Default bind address for the service (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port for the service.
pub const DEFAULT_PORT: u16 = 5000;

/// Server the companion client talks to when none is given.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Extension of the files the service collects.
pub const XLSX_EXTENSION: &str = "xlsx";

/// Prefix of per-request staging directories.
pub const STAGING_PREFIX: &str = "nas_xlsx_";

/// Prefix of archive files, both on disk and in download names.
pub const ARCHIVE_PREFIX: &str = "nas_xlsx_files_";

/// `chrono` format of the timestamp embedded in download names.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Environment variables holding default share credentials.
pub const USERNAME_ENV: &str = "NAS_USERNAME";
pub const PASSWORD_ENV: &str = "NAS_PASSWORD";

/// Default limit for a share mount command, in seconds.
pub const DEFAULT_MOUNT_TIMEOUT_SECS: u64 = 30;

/// Minimum allowed mount timeout.
pub const MIN_MOUNT_TIMEOUT_SECS: u64 = 1;

/// Maximum allowed mount timeout.
pub const MAX_MOUNT_TIMEOUT_SECS: u64 = 300;

/// How long a single archive chunk read may stall before the download is aborted.
pub const STREAM_CHUNK_TIMEOUT_SECS: u64 = 60;

/// Read size used when streaming archives.
pub const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Convenience function to clamp a mount timeout into the allowed range.
pub fn clamp_mount_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_MOUNT_TIMEOUT_SECS, MAX_MOUNT_TIMEOUT_SECS)
}

/// Download file name for an archive created at `timestamp` (already formatted).
pub fn archive_file_name(timestamp: &str) -> String {
    format!("{ARCHIVE_PREFIX}{timestamp}.zip")
}
