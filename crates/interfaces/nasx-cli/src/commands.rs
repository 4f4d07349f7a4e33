use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use nasx_core::api::{HealthResponse, ListResponse, TestJsonResponse, TestPathResponse};
use nasx_core::{Credentials, NasRequest};
use nasx_infra::{ClientError, DownloadedArchive, NasClient};
use nasx_pipeline::{CopyReport, ExportPipeline};
use std::time::Duration;

pub fn connect(server: &str) -> Result<NasClient> {
    let http = nasx_infra::default_http_client().context("Failed to build HTTP client")?;
    Ok(NasClient::new(http, server))
}

fn spinner(msg: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg);
    pb
}

/// Turn a client error into a readable message, preferring the server's own explanation.
fn describe(err: ClientError) -> anyhow::Error {
    match (err.status(), err.body()) {
        (Some(status), Some(body)) => {
            let kind = body["error"].as_str().unwrap_or("Error");
            let message = body["message"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("no details");
            anyhow!("{kind} (HTTP {status}): {message}")
        }
        _ => anyhow::Error::new(err),
    }
}

pub async fn cmd_health(client: &NasClient) -> Result<HealthResponse> {
    println!(":: Checking {}", client.base_url());
    let health = client.health().await.map_err(describe)?;
    println!("   Service: {}", health.service);
    println!("   Status:  {}", health.status);
    println!("   Time:    {}", health.timestamp);
    Ok(health)
}

pub async fn cmd_list(
    client: &NasClient,
    nas_path: &str,
    credentials: Option<&Credentials>,
) -> Result<ListResponse> {
    println!(":: Listing spreadsheets");
    println!("   Path: {}", nas_path);

    let list = client
        .list_xlsx(nas_path, credentials)
        .await
        .map_err(describe)?;

    let total: u64 = list.files.iter().map(|f| f.size).sum();
    for file in &list.files {
        println!(
            "   {:>10}  {}",
            format_size(file.size, DECIMAL),
            file.relative_path
        );
    }
    println!(
        "\n:: Found {} files ({})",
        list.files_found,
        format_size(total, DECIMAL)
    );
    Ok(list)
}

pub async fn cmd_download(
    client: &NasClient,
    nas_path: &str,
    credentials: Option<&Credentials>,
    out_dir: &Utf8Path,
) -> Result<DownloadedArchive> {
    println!(":: Downloading spreadsheets");
    println!("   Path:   {}", nas_path);
    println!("   Output: {}", out_dir);

    let pb = spinner("Waiting for archive...".to_string());
    let result = client.download_xlsx(nas_path, credentials, out_dir).await;
    pb.finish_and_clear();

    let archive = result.map_err(describe)?;
    println!(
        ":: Saved {} ({})",
        archive.path,
        format_size(archive.bytes, DECIMAL)
    );
    Ok(archive)
}

pub async fn cmd_test_json(client: &NasClient, body: String) -> Result<TestJsonResponse> {
    let resp = client.test_json(body).await.map_err(describe)?;
    println!(":: {}", resp.message);
    println!("{}", serde_json::to_string_pretty(&resp.received_data)?);
    Ok(resp)
}

pub async fn cmd_test_path(client: &NasClient, nas_path: &str) -> Result<TestPathResponse> {
    let resp = client.test_path(nas_path).await.map_err(describe)?;
    println!(":: Path check");
    println!("   Original:   {}", resp.original_path);
    println!("   Normalized: {}", resp.normalized_path);
    println!("   Resolved:   {}", resp.resolved_path);
    println!("   Exists:     {}", resp.path_exists);
    println!("   Directory:  {}", resp.is_directory);
    Ok(resp)
}

/// Copy a share directory into `target` without going through the service.
pub async fn cmd_copy(
    pipeline: &ExportPipeline,
    nas_path: &str,
    target: &Utf8Path,
    credentials: Option<Credentials>,
) -> Result<CopyReport> {
    println!(":: Copying files");
    println!("   From: {}", nas_path);
    println!("   To:   {}", target);
    if let Some(c) = &credentials {
        println!("   User: {}", c.username);
    }

    let request = NasRequest {
        nas_path: nas_path.to_string(),
        credentials,
    };
    let pb = spinner("Copying...".to_string());
    let result = pipeline.copy_to(&request, target).await;
    pb.finish_and_clear();

    let report = result.with_context(|| format!("Failed to copy {nas_path}"))?;
    println!(
        ":: Copy completed! Total {} files copied ({})",
        report.files_copied,
        format_size(report.bytes_copied, DECIMAL)
    );
    Ok(report)
}
