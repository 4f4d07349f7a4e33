use camino::{Utf8Path, Utf8PathBuf};
use futures::StreamExt;
use nasx_core::api::{HealthResponse, ListResponse, TestJsonResponse, TestPathResponse};
use nasx_core::Credentials;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: Value },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::Io(_) => None,
        }
    }

    /// JSON error body sent by the server, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ClientError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    pub path: Utf8PathBuf,
    pub bytes: u64,
}

pub fn default_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("nasx/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Typed client for the spreadsheet archive service.
#[derive(Debug, Clone)]
pub struct NasClient {
    client: Client,
    base_url: String,
}

impl NasClient {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request_body(nas_path: &str, credentials: Option<&Credentials>) -> Value {
        let mut body = json!({ "nas_path": nas_path });
        if let Some(c) = credentials {
            body["username"] = Value::from(c.username.as_str());
            body["password"] = Value::from(c.password.as_str());
        }
        body
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Self::json(resp).await
    }

    pub async fn list_xlsx(
        &self,
        nas_path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ListResponse, ClientError> {
        let resp = self
            .client
            .post(self.url("/list-xlsx"))
            .json(&Self::request_body(nas_path, credentials))
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn test_path(&self, nas_path: &str) -> Result<TestPathResponse, ClientError> {
        let resp = self
            .client
            .post(self.url("/test-path"))
            .json(&Self::request_body(nas_path, None))
            .send()
            .await?;
        Self::json(resp).await
    }

    /// Sends `raw_body` untouched so the server's lenient parser sees exactly what was typed.
    pub async fn test_json(&self, raw_body: impl Into<String>) -> Result<TestJsonResponse, ClientError> {
        let resp = self
            .client
            .post(self.url("/test-json"))
            .header(CONTENT_TYPE, "application/json")
            .body(raw_body.into())
            .send()
            .await?;
        Self::json(resp).await
    }

    /// Stream the archive for `nas_path` into `dir`, returning where it landed.
    pub async fn download_xlsx(
        &self,
        nas_path: &str,
        credentials: Option<&Credentials>,
        dir: &Utf8Path,
    ) -> Result<DownloadedArchive, ClientError> {
        let resp = self
            .client
            .post(self.url("/download-xlsx"))
            .json(&Self::request_body(nas_path, credentials))
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| {
                let ts = chrono::Local::now().format(nasx_config::ARCHIVE_TIMESTAMP_FORMAT);
                nasx_config::archive_file_name(&ts.to_string())
            });

        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(&filename);
        let tmp_path = target.with_extension("part");
        debug!("Downloading archive to {}", tmp_path);

        let mut file = File::create(&tmp_path).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        let result: Result<(), ClientError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(&tmp_path).await {
                warn!("Failed to remove partial download {}: {}", tmp_path, rm);
            }
            return Err(e);
        }
        drop(file);
        tokio::fs::rename(&tmp_path, &target).await?;

        info!("Downloaded {} ({} bytes)", target, written);
        Ok(DownloadedArchive {
            path: target,
            bytes: written,
        })
    }

    async fn check(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
        let resp = Self::check(resp).await?;
        Ok(resp.json::<T>().await?)
    }
}

/// `attachment; filename="x.zip"` -> `x.zip`, keeping only the final path component.
fn attachment_filename(header: &str) -> Option<String> {
    let raw = header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;
    let name = raw.trim_matches('"');
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
