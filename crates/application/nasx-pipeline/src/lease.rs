use camino::Utf8PathBuf;
use nasx_core::{Credentials, NormalizedPath};
use nasx_infra::{DriveMounter, DriveSession, MountError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Slot {
    users: usize,
    session: Option<DriveSession>,
}

/// Reference-counted drive sessions, one per share.
///
/// The first user of a share mounts it and the last one unmounts it, so a
/// request finishing never pulls a share out from under another. Later users
/// ride on the session opened with the first user's credentials.
pub struct ShareLeases {
    mounter: Arc<dyn DriveMounter>,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot>>>>,
}

/// A claim on a mounted share. Hand it back through [`ShareLeases::release`].
#[derive(Debug)]
pub struct Lease {
    key: String,
}

impl ShareLeases {
    pub fn new(mounter: Arc<dyn DriveMounter>) -> Self {
        Self {
            mounter,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<Slot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn acquire(
        &self,
        share: &NormalizedPath,
        target: Option<Utf8PathBuf>,
        credentials: &Credentials,
    ) -> Result<Lease, MountError> {
        let key = share.as_str().to_string();
        let slot = self.slot(&key);
        // Held across the mount so concurrent first users wait for it.
        let mut slot = slot.lock().await;
        if slot.users == 0 {
            let session = self
                .mounter
                .acquire(share, target.as_deref(), credentials)
                .await?;
            slot.session = Some(session);
        } else {
            debug!("Reusing mounted share {} ({} users)", key, slot.users);
        }
        slot.users += 1;
        Ok(Lease { key })
    }

    pub async fn release(&self, lease: Lease) {
        let slot = self.slot(&lease.key);
        let mut slot = slot.lock().await;
        slot.users = slot.users.saturating_sub(1);
        if slot.users > 0 {
            debug!("Share {} still in use by {} requests", lease.key, slot.users);
            return;
        }
        if let Some(session) = slot.session.take() {
            self.mounter.release(session).await;
        }
    }
}
