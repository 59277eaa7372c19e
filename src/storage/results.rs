//! Storage result types
//!
//! Defines result structures returned by storage operations.

use std::path::PathBuf;

use serde::Serialize;
use tokio::fs::File;

/// A file or directory as presented to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: String,
    pub is_dir: bool,
    pub mod_time: String,
    pub path: String,
    pub is_starred: bool,
}

/// Result of a list operation
#[derive(Debug)]
pub enum Listing {
    /// The target was a regular file; its bytes are served instead.
    File(PathBuf),
    Directory(Vec<FileEntry>),
}

/// Result of a download preparation
#[derive(Debug)]
pub struct DownloadResult {
    pub file: File,
    pub file_name: String,
    pub size: u64,
}

/// Result of an upload
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub virtual_path: String,
    pub bytes_written: u64,
}

/// Result of a rename
#[derive(Debug, Clone)]
pub struct RenameResult {
    pub old_path: String,
    pub new_path: String,
}

/// Result of a star toggle
#[derive(Debug, Clone)]
pub struct StarResult {
    pub file_path: String,
    pub starred: bool,
}
