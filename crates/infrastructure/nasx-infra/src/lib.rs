pub mod drive;
pub mod net;

// Re-exports for convenience
pub use drive::{CommandMounter, DriveMounter, DriveSession, MountError, NoopMounter};
pub use net::{default_http_client, ClientError, DownloadedArchive, NasClient};
