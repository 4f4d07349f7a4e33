use camino::Utf8PathBuf;
use nasx_cli::commands;
use nasx_core::{Credentials, ShareMap};
use nasx_pipeline::{ArchiveBuilder, ExportPipeline};
use nasx_server::AppState;
use std::fs;
use std::net::SocketAddr;
use tempfile::tempdir;

fn utf8(p: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(p.to_path_buf()).unwrap()
}

async fn start_service(mount: &Utf8PathBuf, scratch: &Utf8PathBuf) -> SocketAddr {
    let rule = format!(r"\\fileserver\ops={mount}");
    let pipeline = ExportPipeline::new(ShareMap::new(vec![rule.parse().unwrap()]))
        .with_archive_builder(ArchiveBuilder::new().with_temp_root(scratch.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        nasx_server::serve(listener, AppState::new(pipeline), std::future::pending())
            .await
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn list_then_download_through_the_client() {
    let share = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mount = utf8(share.path());
    fs::create_dir_all(mount.join("weekly/w01")).unwrap();
    fs::write(mount.join("weekly/w01/shifts.xlsx"), b"shifts").unwrap();
    fs::write(mount.join("weekly/roster.xlsx"), b"roster").unwrap();

    let addr = start_service(&mount, &utf8(scratch.path())).await;
    let client = commands::connect(&format!("http://{addr}")).unwrap();

    let health = commands::cmd_health(&client).await.unwrap();
    assert_eq!(health.status, "healthy");

    let list = commands::cmd_list(&client, "//fileserver/ops/weekly", None)
        .await
        .unwrap();
    assert_eq!(list.files_found, 2);

    let out_dir = utf8(out.path());
    let archive = commands::cmd_download(&client, r"\\fileserver\ops\weekly", None, &out_dir)
        .await
        .unwrap();
    let name = archive.path.file_name().unwrap();
    assert!(name.starts_with("nas_xlsx_files_") && name.ends_with(".zip"));
    assert_eq!(fs::metadata(&archive.path).unwrap().len(), archive.bytes);

    let zip = zip::ZipArchive::new(fs::File::open(&archive.path).unwrap()).unwrap();
    let mut names: Vec<_> = zip.file_names().map(str::to_owned).collect();
    names.sort();
    assert_eq!(names, vec!["roster.xlsx", "w01/shifts.xlsx"]);
}

#[tokio::test]
async fn server_errors_surface_with_their_message() {
    let share = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let mount = utf8(share.path());
    let addr = start_service(&mount, &utf8(scratch.path())).await;
    let client = commands::connect(&format!("http://{addr}")).unwrap();

    let err = commands::cmd_list(&client, r"\\fileserver\ops\nowhere", None)
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("HTTP 404"), "unexpected error: {msg}");
    assert!(msg.contains("Path not found"), "unexpected error: {msg}");

    let err = commands::cmd_download(&client, r"\\fileserver\ops", None, &mount)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No xlsx files found"));
}

#[tokio::test]
async fn diagnostics_round_trip() {
    let share = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let mount = utf8(share.path());
    let addr = start_service(&mount, &utf8(scratch.path())).await;
    let client = commands::connect(&format!("http://{addr}")).unwrap();

    let echoed = commands::cmd_test_json(&client, "{'nas_path': 'x'}".to_string())
        .await
        .unwrap();
    assert_eq!(echoed.received_data["nas_path"], "x");

    let probe = commands::cmd_test_path(&client, r"\\fileserver\ops\\")
        .await
        .unwrap();
    assert_eq!(probe.normalized_path, r"\\fileserver\ops");
    assert!(probe.path_exists);
}

#[tokio::test]
async fn copy_mirrors_local_tree() {
    let share = tempdir().unwrap();
    let out = tempdir().unwrap();
    let src = utf8(share.path());
    fs::create_dir_all(src.join("a/b")).unwrap();
    fs::write(src.join("a/b/deep.xlsx"), b"1").unwrap();
    fs::write(src.join("top.csv"), b"22").unwrap();

    let pipeline = ExportPipeline::new(ShareMap::default());
    let target = utf8(out.path()).join("mirror");
    let report = commands::cmd_copy(&pipeline, src.as_str(), &target, None)
        .await
        .unwrap();

    assert_eq!(report.files_copied, 2);
    assert_eq!(fs::read(target.join("a/b/deep.xlsx")).unwrap(), b"1");
    assert_eq!(fs::read(target.join("top.csv")).unwrap(), b"22");
}

#[tokio::test]
async fn copy_of_missing_path_fails() {
    let out = tempdir().unwrap();
    let missing = utf8(out.path()).join("does-not-exist");
    let pipeline = ExportPipeline::new(ShareMap::default());

    let err = commands::cmd_copy(
        &pipeline,
        missing.as_str(),
        &utf8(out.path()),
        Some(Credentials::new("u", "p")),
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("does not exist"));
}
