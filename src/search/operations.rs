//! Search operations implementation

use std::path::Path;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::storage::FileEntry;
use crate::storage::filesystem::{file_entry, join_client_path};
use crate::storage::validation::normalize_segments;

/// Walk `root` recursively and collect every entry whose base name contains
/// `query`, ignoring case.
///
/// `client_root` is the client's spelling of `root`. It is normalized first,
/// so reported paths always use `/` separators. Unreadable entries are skipped, so the
/// search never fails as a whole. The root itself is never reported.
pub fn search_files(root: &Path, query: &str, client_root: &str) -> Vec<FileEntry> {
    let needle = query.to_lowercase();
    let client_root = normalize_segments(client_root)
        .map(|segments| segments.join("/"))
        .unwrap_or_else(|_| client_root.replace('\\', "/"));
    let mut results = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing path during search: {e}");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.to_lowercase().contains(&needle) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {e}", entry.path().display());
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        results.push(file_entry(
            name,
            join_client_path(&client_root, &relative),
            &metadata,
            false,
        ));
    }

    results.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        "Search for '{query}' under {} matched {} entries",
        root.display(),
        results.len()
    );
    results
}
