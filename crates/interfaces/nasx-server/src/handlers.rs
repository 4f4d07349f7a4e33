use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Local};
use nasx_core::api::{
    DiagnosticFailure, FileInfo, HealthResponse, ListResponse, TestJsonResponse, TestPathResponse,
};
use nasx_core::{LenientPayload, NasRequest, Payload, PayloadError};
use nasx_pipeline::{ExportOutcome, ReadyExport};
use serde_json::Value;
use std::time::SystemTime;
use tokio::fs::File;
use tracing::{error, info};

use crate::error::ApiError;
use crate::flow::{RequestFlow, Stage};
use crate::state::AppState;
use crate::stream::archive_body;

pub(crate) fn timestamp() -> String {
    iso(Local::now())
}

fn iso(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Payload, PayloadError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    LenientPayload::parse(body, content_type)
}

fn parse_request(
    headers: &HeaderMap,
    body: &[u8],
    flow: &mut RequestFlow,
) -> Result<NasRequest, ApiError> {
    let payload = parse_body(headers, body)?;
    let request = NasRequest::from_payload(&payload)?;
    flow.advance(Stage::Parsed);
    Ok(request)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: timestamp(),
        service: nasx_config::SERVICE_NAME.to_string(),
    })
}

pub async fn list_xlsx(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ListResponse>, ApiError> {
    let mut flow = RequestFlow::start("/list-xlsx");
    list_inner(&state, &headers, &body, &mut flow)
        .await
        .inspect_err(|e| flow.fail(e))
}

async fn list_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    flow: &mut RequestFlow,
) -> Result<Json<ListResponse>, ApiError> {
    let request = parse_request(headers, body, flow)?;
    info!("Listing xlsx files from: {}", request.nas_path);

    let resolved = state.pipeline.resolve(&request.nas_path)?;
    flow.advance(Stage::Normalized);

    let listing = state.pipeline.list_at(&request, resolved).await?;
    flow.advance(Stage::Located);

    let files: Vec<FileInfo> = listing
        .files
        .into_iter()
        .map(|f| FileInfo {
            filename: f.filename,
            relative_path: f.relative_path.into_string(),
            size: f.size,
            modified_time: f.modified.map(|m: SystemTime| iso(m.into())),
        })
        .collect();

    Ok(Json(ListResponse {
        success: true,
        nas_path: request.nas_path,
        files_found: files.len(),
        files,
        timestamp: timestamp(),
    }))
}

pub async fn download_xlsx(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut flow = RequestFlow::start("/download-xlsx");
    let ready = match prepare_download(&state, &headers, &body, &mut flow).await {
        Ok(ready) => ready,
        Err(e) => {
            flow.fail(&e);
            return Err(e);
        }
    };

    let file = match File::open(ready.archive.path()).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open archive {}: {}", ready.archive.path(), e);
            flow.fail(&e);
            return Err(ApiError::internal());
        }
    };

    let filename = nasx_config::archive_file_name(
        &Local::now()
            .format(nasx_config::ARCHIVE_TIMESTAMP_FORMAT)
            .to_string(),
    );
    info!(
        "Successfully prepared {} xlsx files for download as {}",
        ready.files_found, filename
    );

    let response_headers = [
        (CONTENT_TYPE, "application/zip".to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (CONTENT_LENGTH, ready.archive.size().to_string()),
    ];
    let body = archive_body(file, ready, flow, state.chunk_timeout);
    Ok((response_headers, body).into_response())
}

async fn prepare_download(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    flow: &mut RequestFlow,
) -> Result<ReadyExport, ApiError> {
    let request = parse_request(headers, body, flow)?;
    info!("Starting xlsx download from: {}", request.nas_path);

    let resolved = state.pipeline.resolve(&request.nas_path)?;
    flow.advance(Stage::Normalized);

    match state.pipeline.export_at(&request, resolved).await? {
        ExportOutcome::Empty(_) => {
            flow.advance(Stage::Located);
            Err(ApiError::no_files(&request.nas_path))
        }
        ExportOutcome::Ready(ready) => {
            flow.advance(Stage::Located);
            flow.advance(Stage::Staged);
            flow.advance(Stage::Packed);
            Ok(ready)
        }
    }
}

pub async fn test_json(headers: HeaderMap, body: Bytes) -> Response {
    match parse_body(&headers, &body) {
        Ok(data) => Json(TestJsonResponse {
            success: true,
            message: "JSON parsed successfully".to_string(),
            received_data: Value::Object(data),
            timestamp: timestamp(),
        })
        .into_response(),
        Err(e) => diagnostic_failure(e.to_string(), None),
    }
}

pub async fn test_path(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_body(&headers, &body).and_then(|p| NasRequest::from_payload(&p)) {
        Ok(request) => request,
        Err(e) => {
            let kind = match e {
                PayloadError::Malformed { .. } => "MalformedPayload",
                PayloadError::MissingField(_) => "MissingField",
            };
            return diagnostic_failure(e.to_string(), Some(kind));
        }
    };

    let resolved = match state.pipeline.resolve(&request.nas_path) {
        Ok(resolved) => resolved,
        Err(e) => return diagnostic_failure(e.to_string(), Some("InvalidPath")),
    };
    let probe = state.pipeline.probe(&resolved).await;

    Json(TestPathResponse {
        success: true,
        original_path: request.nas_path,
        normalized_path: resolved.normalized.into_string(),
        resolved_path: resolved.root.into_string(),
        path_exists: probe.exists,
        is_directory: probe.is_directory,
        timestamp: timestamp(),
    })
    .into_response()
}

fn diagnostic_failure(error: String, error_type: Option<&str>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(DiagnosticFailure {
            success: false,
            error,
            error_type: error_type.map(str::to_string),
            timestamp: timestamp(),
        }),
    )
        .into_response()
}

pub async fn route_not_found() -> ApiError {
    ApiError::route_not_found()
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
