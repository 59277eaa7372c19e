//! File system helpers
//!
//! Formatting and client-path helpers shared by listing and search.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use humansize::{FormatSizeOptions, WINDOWS, format_size};

use crate::storage::results::FileEntry;

/// Human readable size, 1024 based with one decimal ("512 B", "1.5 KB").
pub fn format_file_size(bytes: u64) -> String {
    // The WINDOWS preset writes the kilo prefix as "kB".
    format_size(bytes, FormatSizeOptions::from(WINDOWS).decimal_places(1)).replacen("kB", "KB", 1)
}

/// Local modification time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_mod_time(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Join a client directory and a child name with `/`.
pub fn join_client_path(base: &str, name: &str) -> String {
    let base = base.trim().trim_end_matches(['/', '\\']);
    if base.is_empty() || base == "." {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Parent of a client path in posix terms; empty for top-level entries.
pub fn client_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Check that `name` is a single usable path segment.
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name cannot be empty".into());
    }
    if name.len() > 255 {
        return Err("Name is too long (max 255 characters)".into());
    }
    if name == "." || name == ".." {
        return Err(format!("'{name}' is not a valid name"));
    }
    for c in ['/', '\\', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain '{}'", c.escape_default()));
        }
    }
    Ok(())
}

/// Build the client-facing entry for a file system object.
pub fn file_entry(name: String, path: String, metadata: &Metadata, is_starred: bool) -> FileEntry {
    FileEntry {
        name,
        size: format_file_size(metadata.len()),
        is_dir: metadata.is_dir(),
        mod_time: metadata
            .modified()
            .map(format_mod_time)
            .unwrap_or_default(),
        path,
        is_starred,
    }
}
