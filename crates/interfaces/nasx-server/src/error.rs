//! Mapping from pipeline failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nasx_core::api::ErrorBody;
use nasx_core::{PathError, PayloadError};
use nasx_pipeline::{ArchiveError, ExportError};
use nasx_scanner::LocateError;
use std::fmt;
use tracing::{error, warn};

const ACCESS_DENIED: &str = "Access denied to the specified path";
const UNEXPECTED: &str = "An unexpected error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    NotFound,
    NoFiles,
    Forbidden,
    RouteNotFound,
    MethodNotAllowed,
    BadGateway,
    Internal,
}

impl ApiErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorKind::NotFound | ApiErrorKind::NoFiles | ApiErrorKind::RouteNotFound => {
                StatusCode::NOT_FOUND
            }
            ApiErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
            ApiErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Category name placed in the `error` field of the body.
    pub fn name(self) -> &'static str {
        match self {
            ApiErrorKind::BadRequest => "Bad Request",
            ApiErrorKind::NotFound => "Path not found",
            ApiErrorKind::NoFiles => "No xlsx files found",
            ApiErrorKind::Forbidden => "Permission denied",
            ApiErrorKind::RouteNotFound => "Not Found",
            ApiErrorKind::MethodNotAllowed => "Method Not Allowed",
            ApiErrorKind::BadGateway => "Mount failed",
            ApiErrorKind::Internal => "Internal server error",
        }
    }
}

#[derive(Debug, Clone)]
#[must_use = "errors do nothing unless turned into a response"]
pub struct ApiError {
    kind: ApiErrorKind,
    message: String,
    files_found: Option<usize>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            files_found: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::BadRequest, message)
    }

    pub fn no_files(nas_path: &str) -> Self {
        Self {
            kind: ApiErrorKind::NoFiles,
            message: format!("No Excel files found in {nas_path}"),
            files_found: Some(0),
        }
    }

    pub fn forbidden() -> Self {
        Self::new(ApiErrorKind::Forbidden, ACCESS_DENIED)
    }

    pub fn internal() -> Self {
        Self::new(ApiErrorKind::Internal, UNEXPECTED)
    }

    pub fn route_not_found() -> Self {
        Self::new(
            ApiErrorKind::RouteNotFound,
            "The requested endpoint does not exist",
        )
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            ApiErrorKind::MethodNotAllowed,
            "The method is not allowed for the requested URL",
        )
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind.name().to_string(),
            message: self.message,
            files_found: self.files_found,
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        warn!("Bad request: {}", err);
        ApiError::bad_request(err.to_string())
    }
}

impl From<PathError> for ApiError {
    fn from(err: PathError) -> Self {
        warn!("Bad request: {}", err);
        ApiError::bad_request(err.to_string())
    }
}

impl From<LocateError> for ApiError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::PathNotFound(_) | LocateError::NotADirectory(_) => {
                error!("File not found: {}", err);
                ApiError::new(ApiErrorKind::NotFound, err.to_string())
            }
            LocateError::PermissionDenied(_) => {
                error!("Permission error: {}", err);
                ApiError::forbidden()
            }
            LocateError::Io { .. } => {
                error!("Unexpected error: {}", err);
                ApiError::internal()
            }
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        error!("Unexpected error: {}", err);
        ApiError::internal()
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Path(e) => e.into(),
            ExportError::Locate(e) => e.into(),
            ExportError::Archive(e) => e.into(),
            ExportError::Mount(e) => {
                error!("Mount error: {}", e);
                ApiError::new(ApiErrorKind::BadGateway, e.to_string())
            }
            ExportError::Transfer(e) => {
                error!("Unexpected error: {}", e);
                ApiError::internal()
            }
            ExportError::Task(e) => {
                error!("Unexpected error: {}", e);
                ApiError::internal()
            }
        }
    }
}
