//! JSON bodies exchanged between the service and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub filename: String,
    pub relative_path: String,
    pub size: u64,
    pub modified_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse {
    pub success: bool,
    pub nas_path: String,
    pub files_found: usize,
    pub files: Vec<FileInfo>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestJsonResponse {
    pub success: bool,
    pub message: String,
    pub received_data: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestPathResponse {
    pub success: bool,
    pub original_path: String,
    pub normalized_path: String,
    pub resolved_path: String,
    pub path_exists: bool,
    pub is_directory: bool,
    pub timestamp: String,
}

/// Body of every failed request on the listing and download endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_found: Option<usize>,
}

/// Body returned by the diagnostic endpoints when they fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticFailure {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub timestamp: String,
}
