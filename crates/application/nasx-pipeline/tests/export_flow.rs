use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use nasx_core::{Credentials, NasRequest, NormalizedPath, ShareMap};
use nasx_infra::{DriveMounter, DriveSession, MountError};
use nasx_pipeline::{ArchiveBuilder, ExportError, ExportOutcome, ExportPipeline};
use nasx_scanner::LocateError;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingMounter {
    fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl DriveMounter for RecordingMounter {
    async fn acquire(
        &self,
        share: &NormalizedPath,
        target: Option<&Utf8Path>,
        credentials: &Credentials,
    ) -> Result<DriveSession, MountError> {
        self.calls.lock().unwrap().push(format!(
            "acquire {} {} {}",
            share,
            target.map(Utf8Path::as_str).unwrap_or("-"),
            credentials.username
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(MountError::Failed {
                share: share.to_string(),
                code: Some(2),
                stderr: "access denied".into(),
            });
        }
        Ok(DriveSession::unmounted(share.as_str()))
    }

    async fn release(&self, session: DriveSession) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("release {}", session.share()));
    }
}

struct Fixture {
    _src: tempfile::TempDir,
    scratch: tempfile::TempDir,
    mount: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let src = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let mount = Utf8PathBuf::from_path_buf(src.path().to_path_buf()).unwrap();
        fs::create_dir_all(mount.join("reports/2024")).unwrap();
        fs::write(mount.join("reports/2024/q1.xlsx"), b"q1").unwrap();
        fs::write(mount.join("reports/summary.xlsx"), b"sum").unwrap();
        fs::create_dir_all(mount.join("empty")).unwrap();
        Self {
            _src: src,
            scratch,
            mount,
        }
    }

    fn pipeline(&self, mounter: Arc<RecordingMounter>) -> ExportPipeline {
        let rule = format!(r"\\nas01\finance={}", self.mount);
        let shares = ShareMap::new(vec![rule.parse().unwrap()]);
        let scratch = Utf8PathBuf::from_path_buf(self.scratch.path().to_path_buf()).unwrap();
        ExportPipeline::new(shares)
            .with_mounter(mounter)
            .with_archive_builder(ArchiveBuilder::new().with_temp_root(scratch))
    }

    fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

fn request(path: &str, credentials: Option<Credentials>) -> NasRequest {
    NasRequest {
        nas_path: path.to_string(),
        credentials,
    }
}

#[tokio::test]
async fn list_resolves_unc_path_through_share_map() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(Arc::new(RecordingMounter::default()));

    let listing = pipeline
        .list(&request("//NAS01/finance//reports/", None))
        .await
        .unwrap();

    assert_eq!(listing.resolved.normalized.as_str(), r"\\NAS01\finance\reports");
    assert_eq!(listing.resolved.root, fx.mount.join("reports"));
    let rels: Vec<_> = listing
        .files
        .iter()
        .map(|f| f.relative_path.as_str().replace('\\', "/"))
        .collect();
    assert_eq!(rels, vec!["2024/q1.xlsx", "summary.xlsx"]);
}

#[tokio::test]
async fn export_packs_archive_and_drops_staging() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(Arc::new(RecordingMounter::default()));

    let outcome = pipeline
        .export(&request(r"\\nas01\finance\reports", None))
        .await
        .unwrap();
    let ExportOutcome::Ready(ready) = outcome else {
        panic!("expected an archive");
    };

    assert_eq!(ready.files_found, 2);
    assert_eq!(ready.archive.entries(), 2);
    assert!(ready.staging.is_released());
    assert!(ready.archive.path().exists());
    assert_eq!(fx.scratch_entries(), 1);

    drop(ready);
    assert_eq!(fx.scratch_entries(), 0);
}

#[tokio::test]
async fn empty_directory_yields_empty_outcome() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(Arc::new(RecordingMounter::default()));

    let outcome = pipeline
        .export(&request(r"\\nas01\finance\empty", None))
        .await
        .unwrap();

    assert!(matches!(outcome, ExportOutcome::Empty(_)));
    assert_eq!(fx.scratch_entries(), 0);
}

#[tokio::test]
async fn missing_root_is_a_locate_error() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(Arc::new(RecordingMounter::default()));

    let err = pipeline
        .list(&request(r"\\nas01\finance\missing", None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExportError::Locate(LocateError::PathNotFound(_))
    ));
}

#[tokio::test]
async fn credentials_mount_the_share_and_always_release() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter::default());
    let pipeline = fx.pipeline(mounter.clone());

    let creds = Some(Credentials::new("svc", "pw"));
    pipeline
        .list(&request(r"\\nas01\finance\reports", creds.clone()))
        .await
        .unwrap();
    pipeline
        .list(&request(r"\\nas01\finance\missing", creds))
        .await
        .unwrap_err();

    let calls = mounter.calls.lock().unwrap().clone();
    let acquire = format!(r"acquire \\nas01\finance {} svc", fx.mount);
    assert_eq!(
        calls,
        vec![
            acquire.clone(),
            r"release \\nas01\finance".to_string(),
            acquire,
            r"release \\nas01\finance".to_string(),
        ]
    );
}

#[tokio::test]
async fn default_credentials_apply_when_request_has_none() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter::default());
    let pipeline = fx
        .pipeline(mounter.clone())
        .with_default_credentials(Some(Credentials::new("env-user", "env-pw")));

    pipeline
        .list(&request(r"\\nas01\finance\reports", None))
        .await
        .unwrap();

    let calls = mounter.calls.lock().unwrap();
    assert!(calls[0].ends_with("env-user"));
}

#[tokio::test]
async fn mount_failure_stops_before_touching_files() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter {
        fail: true,
        ..Default::default()
    });
    let pipeline = fx.pipeline(mounter.clone());

    let err = pipeline
        .export(&request(
            r"\\nas01\finance\reports",
            Some(Credentials::new("svc", "bad")),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Mount(MountError::Failed { .. })));
    assert_eq!(mounter.calls.lock().unwrap().len(), 1);
    assert_eq!(fx.scratch_entries(), 0);
}

#[tokio::test]
async fn invalid_path_is_rejected_before_mounting() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter::default());
    let pipeline = fx.pipeline(mounter.clone());

    let err = pipeline
        .list(&request("   ", Some(Credentials::new("svc", "pw"))))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Path(_)));
    assert!(mounter.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn copy_to_mirrors_the_whole_tree_inside_a_session() {
    let fx = Fixture::new();
    fs::write(fx.mount.join("reports/notes.txt"), b"all files").unwrap();
    let mounter = Arc::new(RecordingMounter::default());
    let pipeline = fx.pipeline(mounter.clone());
    let out = tempdir().unwrap();
    let target = Utf8PathBuf::from_path_buf(out.path().join("copy")).unwrap();

    let report = pipeline
        .copy_to(
            &request(r"\\nas01\finance\reports", Some(Credentials::new("svc", "pw"))),
            &target,
        )
        .await
        .unwrap();

    assert_eq!(report.files_copied, 3);
    assert!(target.join("2024/q1.xlsx").exists());
    assert!(target.join("notes.txt").exists());
    assert_eq!(mounter.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn local_path_with_default_credentials_is_never_mounted() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter::default());
    let pipeline = fx
        .pipeline(mounter.clone())
        .with_default_credentials(Some(Credentials::new("svc", "pw")));

    let listing = pipeline
        .list(&request(fx.mount.join("reports").as_str(), None))
        .await
        .unwrap();

    assert_eq!(listing.files.len(), 2);
    assert!(mounter.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_request_still_releases_the_share() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let pipeline = fx.pipeline(mounter.clone());
    let req = request(r"\\nas01\finance\reports", Some(Credentials::new("svc", "pw")));

    let res = tokio::time::timeout(Duration::from_millis(10), pipeline.list(&req)).await;
    assert!(res.is_err(), "list should still be mounting");

    for _ in 0..100 {
        if mounter.calls.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let calls = mounter.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2, "unexpected calls: {calls:?}");
    assert!(calls[1].starts_with("release"));
}

#[tokio::test]
async fn overlapping_requests_share_one_mount() {
    let fx = Fixture::new();
    let mounter = Arc::new(RecordingMounter {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let pipeline = fx.pipeline(mounter.clone());
    let a = request(r"\\nas01\finance\reports", Some(Credentials::new("svc", "pw")));
    let b = request(r"\\nas01\finance\empty", Some(Credentials::new("svc", "pw")));

    let (ra, rb) = tokio::join!(pipeline.list(&a), pipeline.list(&b));
    assert_eq!(ra.unwrap().files.len(), 2);
    assert!(rb.unwrap().files.is_empty());

    let calls = mounter.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2, "unexpected calls: {calls:?}");
    assert!(calls[0].starts_with("acquire"));
    assert!(calls[1].starts_with("release"));

    // Once everyone is done the next request mounts again.
    pipeline.list(&a).await.unwrap();
    assert_eq!(mounter.calls.lock().unwrap().len(), 4);
}
