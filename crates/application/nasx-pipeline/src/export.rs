use camino::{Utf8Path, Utf8PathBuf};
use nasx_core::{Credentials, FileEntry, NasPath, NasRequest, NormalizedPath, PathError, ShareMap};
use nasx_infra::{DriveMounter, MountError, NoopMounter};
use nasx_scanner::{LocateError, Locator};
use std::sync::Arc;
use tracing::{debug, info};

use crate::archive::{Archive, ArchiveBuilder, ArchiveError, StagingSet};
use crate::lease::ShareLeases;
use crate::transfer::{self, CopyReport, TransferError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A request path after normalization and share-map resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    pub normalized: NormalizedPath,
    pub root: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathProbe {
    pub exists: bool,
    pub is_directory: bool,
}

#[derive(Debug)]
pub struct Listing {
    pub resolved: ResolvedRoot,
    pub files: Vec<FileEntry>,
}

/// Staged and packed files ready to be sent. Both guards clean up on drop.
#[derive(Debug)]
pub struct ReadyExport {
    pub resolved: ResolvedRoot,
    pub archive: Archive,
    pub staging: StagingSet,
    pub files_found: usize,
}

#[derive(Debug)]
pub enum ExportOutcome {
    /// The root exists but holds no matching files.
    Empty(ResolvedRoot),
    Ready(ReadyExport),
}

/// What to mount before touching a share.
struct MountPlan {
    share: NormalizedPath,
    target: Option<Utf8PathBuf>,
    credentials: Credentials,
}

/// Runs locate, stage and pack for one request, holding a drive session
/// around the filesystem work when a UNC path comes with credentials.
pub struct ExportPipeline {
    shares: ShareMap,
    leases: Arc<ShareLeases>,
    builder: ArchiveBuilder,
    extension: String,
    default_credentials: Option<Credentials>,
}

impl ExportPipeline {
    pub fn new(shares: ShareMap) -> Self {
        Self {
            shares,
            leases: Arc::new(ShareLeases::new(Arc::new(NoopMounter))),
            builder: ArchiveBuilder::new(),
            extension: nasx_config::XLSX_EXTENSION.to_string(),
            default_credentials: None,
        }
    }

    pub fn with_mounter(mut self, mounter: Arc<dyn DriveMounter>) -> Self {
        self.leases = Arc::new(ShareLeases::new(mounter));
        self
    }

    pub fn with_archive_builder(mut self, builder: ArchiveBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Credentials used when a request does not carry its own.
    pub fn with_default_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.default_credentials = credentials;
        self
    }

    pub fn shares(&self) -> &ShareMap {
        &self.shares
    }

    pub fn resolve(&self, raw: &str) -> Result<ResolvedRoot, PathError> {
        let normalized = NasPath::normalize(raw)?;
        let root = self.shares.resolve(&normalized);
        debug!("Resolved {} -> {}", normalized, root);
        Ok(ResolvedRoot { normalized, root })
    }

    /// Existence check without mounting anything.
    pub async fn probe(&self, resolved: &ResolvedRoot) -> PathProbe {
        match tokio::fs::metadata(&resolved.root).await {
            Ok(meta) => PathProbe {
                exists: true,
                is_directory: meta.is_dir(),
            },
            Err(_) => PathProbe {
                exists: false,
                is_directory: false,
            },
        }
    }

    pub async fn list(&self, request: &NasRequest) -> Result<Listing, ExportError> {
        let resolved = self.resolve(&request.nas_path)?;
        self.list_at(request, resolved).await
    }

    /// [`list`](Self::list) for a path the caller already resolved.
    pub async fn list_at(
        &self,
        request: &NasRequest,
        resolved: ResolvedRoot,
    ) -> Result<Listing, ExportError> {
        let ext = self.extension.clone();
        let files = self
            .with_share(request, &resolved, move |root| {
                Ok(Locator::collect(&root, &ext)?)
            })
            .await?;
        Ok(Listing { resolved, files })
    }

    pub async fn export(&self, request: &NasRequest) -> Result<ExportOutcome, ExportError> {
        let resolved = self.resolve(&request.nas_path)?;
        self.export_at(request, resolved).await
    }

    pub async fn export_at(
        &self,
        request: &NasRequest,
        resolved: ResolvedRoot,
    ) -> Result<ExportOutcome, ExportError> {
        let ext = self.extension.clone();
        let builder = self.builder.clone();
        let outcome_root = resolved.clone();

        self.with_share(request, &resolved, move |root| {
            let files = Locator::collect(&root, &ext)?;
            if files.is_empty() {
                return Ok(ExportOutcome::Empty(outcome_root));
            }

            let mut staging = builder.stage(&files, &root)?;
            let archive = builder.pack(&staging)?;
            // The archive is self-contained; the staged copies are no longer needed.
            staging.release();

            info!(
                "Packed {} of {} files into {}",
                staging.copied(),
                files.len(),
                archive.path()
            );
            Ok(ExportOutcome::Ready(ReadyExport {
                resolved: outcome_root,
                archive,
                staging,
                files_found: files.len(),
            }))
        })
        .await
    }

    /// Copy everything under the request path into `target`, mounting the
    /// share first when credentials are available.
    pub async fn copy_to(
        &self,
        request: &NasRequest,
        target: &Utf8Path,
    ) -> Result<CopyReport, ExportError> {
        let resolved = self.resolve(&request.nas_path)?;
        let target = target.to_owned();
        self.with_share(request, &resolved, move |root| {
            Ok(transfer::copy_tree(&root, &target)?)
        })
        .await
    }

    fn credentials_for<'a>(&'a self, request: &'a NasRequest) -> Option<&'a Credentials> {
        request
            .credentials
            .as_ref()
            .or(self.default_credentials.as_ref())
    }

    /// Local paths are never mounted. UNC paths are mounted only when
    /// credentials are known.
    fn mount_plan(&self, request: &NasRequest, normalized: &NormalizedPath) -> Option<MountPlan> {
        if !normalized.is_unc() {
            return None;
        }
        let credentials = self.credentials_for(request)?.clone();
        let share = self
            .shares
            .share_prefix_for(normalized)
            .unwrap_or(normalized)
            .clone();
        let target = self.shares.mount_point_for(normalized).map(Utf8Path::to_path_buf);
        Some(MountPlan {
            share,
            target,
            credentials,
        })
    }

    /// Run blocking `work` against the resolved root with the share mounted.
    ///
    /// Mount, work and unmount run on their own task, so the share is
    /// released even when the caller stops waiting.
    async fn with_share<T, F>(
        &self,
        request: &NasRequest,
        resolved: &ResolvedRoot,
        work: F,
    ) -> Result<T, ExportError>
    where
        T: Send + 'static,
        F: FnOnce(Utf8PathBuf) -> Result<T, ExportError> + Send + 'static,
    {
        let plan = self.mount_plan(request, &resolved.normalized);
        let task = tokio::spawn(run_leased(
            self.leases.clone(),
            plan,
            resolved.root.clone(),
            work,
        ));
        task.await?
    }
}

async fn run_leased<T, F>(
    leases: Arc<ShareLeases>,
    plan: Option<MountPlan>,
    root: Utf8PathBuf,
    work: F,
) -> Result<T, ExportError>
where
    T: Send + 'static,
    F: FnOnce(Utf8PathBuf) -> Result<T, ExportError> + Send + 'static,
{
    let lease = match plan {
        Some(plan) => Some(
            leases
                .acquire(&plan.share, plan.target, &plan.credentials)
                .await?,
        ),
        None => None,
    };

    let result = tokio::task::spawn_blocking(move || work(root)).await;

    if let Some(lease) = lease {
        leases.release(lease).await;
    }
    result?
}
