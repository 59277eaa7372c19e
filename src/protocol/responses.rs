//! JSON response bodies

use serde::Serialize;
use serde_json::{Value, json};

use crate::stats::StarredFile;
use crate::storage::FileEntry;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// First stored file, kept for single-file clients.
    pub file: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub message: &'static str,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct MkdirResponse {
    pub message: &'static str,
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameResponse {
    pub message: &'static str,
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub message: &'static str,
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub path: String,
    pub count: usize,
    pub results: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarResponse {
    pub message: &'static str,
    pub file_path: String,
    pub starred: bool,
}

#[derive(Debug, Serialize)]
pub struct StarredResponse {
    pub starred: Vec<StarredFile>,
}

pub const SERVICE_NAME: &str = "beamdrop";

pub fn health() -> Value {
    json!({ "status": "healthy", "service": SERVICE_NAME })
}

pub fn readiness(ready: bool, checks: Value) -> Value {
    json!({
        "status": if ready { "ready" } else { "not ready" },
        "service": SERVICE_NAME,
        "checks": checks,
    })
}

pub fn upload_message(count: usize) -> String {
    if count == 1 {
        "File uploaded successfully".to_string()
    } else {
        format!("{count} files uploaded successfully")
    }
}
