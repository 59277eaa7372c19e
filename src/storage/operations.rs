//! Storage operations
//!
//! File operations against the shared root: list, download, upload, move,
//! copy, rename, mkdir, write, search and star. Every client path goes through
//! [`SharedRoot::resolve`] before the file system is touched.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use futures_util::Stream;
use log::{debug, error, info, warn};
use tokio::fs::{self, File};

use crate::error::StorageError;
use crate::search::search_files;
use crate::stats::{StarredFile, StatsStore};
use crate::storage::filesystem::{
    client_parent, file_entry, join_client_path, validate_file_name,
};
use crate::storage::results::{
    DownloadResult, FileEntry, Listing, RenameResult, StarResult, UploadResult,
};
use crate::storage::validation::SharedRoot;
use crate::transfer::store_stream;

/// File operations engine bound to one shared root and one stats store.
#[derive(Clone)]
pub struct FileOperations {
    root: SharedRoot,
    stats: Arc<StatsStore>,
}

impl FileOperations {
    pub fn new(root: SharedRoot, stats: Arc<StatsStore>) -> Self {
        Self { root, stats }
    }

    pub fn root(&self) -> &SharedRoot {
        &self.root
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.stats
    }

    fn resolve(&self, requested: &str, what: &str) -> Result<PathBuf, StorageError> {
        self.root.resolve(requested).map_err(|e| {
            warn!("Rejected {what} '{requested}': {e}");
            StorageError::InvalidPath(format!("Invalid {what}"))
        })
    }

    /// List a directory, or hand back the path when the target is a file.
    pub async fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let target = self.resolve(path, "path")?;

        if let Ok(metadata) = fs::metadata(&target).await {
            if metadata.is_file() {
                debug!("List target {path} is a file, serving contents");
                return Ok(Listing::File(target));
            }
        }

        let mut dir = fs::read_dir(&target)
            .await
            .map_err(|e| StorageError::failed(format!("Failed to read directory '{path}'"), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StorageError::failed(format!("Failed to read directory '{path}'"), e))?
        {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping {}: {e}", entry.path().display());
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let client_path = join_client_path(path, &name);
            let starred = self.stats.is_starred(&client_path);
            entries.push(file_entry(name, client_path, &metadata, starred));
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        debug!("Listed '{path}' - {} entries", entries.len());
        Ok(Listing::Directory(entries))
    }

    /// Open a file for download. The caller counts the download once the
    /// body has been streamed completely.
    pub async fn download(&self, file: &str) -> Result<DownloadResult, StorageError> {
        if file.trim().is_empty() {
            return Err(StorageError::BadRequest("File name is required".into()));
        }
        let path = self.resolve(file, "file path")?;

        let handle = File::open(&path).await.map_err(|e| {
            error!("Failed to open file {}: {e}", path.display());
            StorageError::NotFound("File not found".into())
        })?;
        let metadata = handle
            .metadata()
            .await
            .map_err(|e| StorageError::failed("Failed to read file metadata", e))?;
        if metadata.is_dir() {
            return Err(StorageError::NotFound("File not found".into()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Serving download for file: {file}");
        Ok(DownloadResult {
            file: handle,
            file_name,
            size: metadata.len(),
        })
    }

    /// Store an uploaded byte stream as `dir/<base name of file_name>`.
    pub async fn upload<S, E>(
        &self,
        dir: &str,
        file_name: &str,
        stream: S,
    ) -> Result<UploadResult, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let base_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        validate_file_name(&base_name).map_err(StorageError::BadRequest)?;

        let virtual_path = join_client_path(dir, &base_name);
        let target = self.resolve(&virtual_path, "upload path")?;

        let bytes_written = store_stream(&target, stream)
            .await
            .map_err(|e| StorageError::failed("Failed to save file", e))?;

        self.stats.increment_uploads();
        info!("File uploaded successfully: {virtual_path} ({bytes_written} bytes)");
        Ok(UploadResult {
            virtual_path,
            bytes_written,
        })
    }

    pub async fn move_path(&self, source: &str, target: &str) -> Result<(), StorageError> {
        let source_path = self.resolve(source, "source path")?;
        let target_path = self.resolve(target, "target path")?;
        self.reject_root(&source_path, "move")?;

        if !exists(&source_path).await {
            return Err(StorageError::NotFound("Source file not found".into()));
        }

        fs::rename(&source_path, &target_path).await.map_err(|e| {
            error!(
                "Failed to move {} to {}: {e}",
                source_path.display(),
                target_path.display()
            );
            StorageError::failed("Failed to move file", e)
        })?;

        info!("File moved from {source} to {target}");
        Ok(())
    }

    /// Copy a file. A failure part way through leaves the partial target in
    /// place.
    pub async fn copy(&self, source: &str, target: &str) -> Result<u64, StorageError> {
        let source_path = self.resolve(source, "source path")?;
        let target_path = self.resolve(target, "target path")?;

        // Creating the target would truncate the source before it is read.
        if same_file(&source_path, &target_path).await {
            return Err(StorageError::BadRequest(
                "Source and target are the same file".into(),
            ));
        }

        let mut source_file = File::open(&source_path).await.map_err(|e| {
            error!("Failed to open source file {}: {e}", source_path.display());
            StorageError::NotFound("Source file not found".into())
        })?;
        let mut target_file = File::create(&target_path).await.map_err(|e| {
            error!("Failed to create target file {}: {e}", target_path.display());
            StorageError::failed("Failed to create target file", e)
        })?;

        let copied = tokio::io::copy(&mut source_file, &mut target_file)
            .await
            .map_err(|e| {
                StorageError::failed("Failed to copy file (partial target may remain)", e)
            })?;

        info!("File copied from {source} to {target} ({copied} bytes)");
        Ok(copied)
    }

    pub async fn mkdir(&self, dir_path: &str) -> Result<(), StorageError> {
        let target = self.resolve(dir_path, "directory path")?;

        if exists(&target).await {
            return Err(StorageError::AlreadyExists("Directory already exists".into()));
        }

        fs::create_dir_all(&target)
            .await
            .map_err(|e| StorageError::failed("Failed to create directory", e))?;

        info!("Directory created: {dir_path}");
        Ok(())
    }

    /// Rename `old_path` in place; the new name replaces its last segment.
    pub async fn rename(&self, old_path: &str, new_name: &str) -> Result<RenameResult, StorageError> {
        validate_file_name(new_name)
            .map_err(|e| StorageError::InvalidPath(format!("Invalid new name: {e}")))?;
        let old_full = self.resolve(old_path, "old path")?;
        self.reject_root(&old_full, "rename")?;

        if !exists(&old_full).await {
            return Err(StorageError::NotFound("File or directory not found".into()));
        }

        let new_path = join_client_path(client_parent(old_path), new_name);
        let new_full = self.resolve(&new_path, "new name")?;

        if exists(&new_full).await {
            return Err(StorageError::AlreadyExists("Target name already exists".into()));
        }

        fs::rename(&old_full, &new_full).await.map_err(|e| {
            error!(
                "Failed to rename {} to {}: {e}",
                old_full.display(),
                new_full.display()
            );
            StorageError::failed("Failed to rename", e)
        })?;

        info!("Renamed {old_path} to {new_path}");
        Ok(RenameResult {
            old_path: old_path.to_string(),
            new_path,
        })
    }

    /// Replace the whole body of `file_path`, creating parents as needed.
    pub async fn write(&self, file_path: &str, content: &str) -> Result<(), StorageError> {
        if file_path.trim().is_empty() {
            return Err(StorageError::BadRequest("File path is required".into()));
        }
        let target = self.resolve(file_path, "file path")?;
        self.reject_root(&target, "write")?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::failed("Failed to create parent directory", e))?;
        }

        fs::write(&target, content.as_bytes())
            .await
            .map_err(|e| StorageError::failed("Failed to write file", e))?;

        info!("File written successfully: {file_path}");
        Ok(())
    }

    /// Recursive name search below `path`.
    pub async fn search(&self, query: &str, path: &str) -> Result<Vec<FileEntry>, StorageError> {
        if query.trim().is_empty() {
            return Err(StorageError::BadRequest("Search query is required".into()));
        }
        let target = self.resolve(path, "search path")?;

        let (query_owned, path_owned) = (query.to_string(), path.to_string());
        let mut results =
            tokio::task::spawn_blocking(move || search_files(&target, &query_owned, &path_owned))
                .await
                .map_err(|e| StorageError::failed("Search failed", io::Error::other(e)))?;

        for entry in &mut results {
            entry.is_starred = self.stats.is_starred(&entry.path);
        }

        info!(
            "Search completed for query '{query}' in path '{path}', found {} results",
            results.len()
        );
        Ok(results)
    }

    /// Star or unstar `file_path`; without an explicit state the current one
    /// is flipped. Only starring needs the file to exist.
    pub async fn star(&self, file_path: &str, starred: Option<bool>) -> Result<StarResult, StorageError> {
        if file_path.trim().is_empty() {
            return Err(StorageError::BadRequest("File path is required".into()));
        }
        let target = self.resolve(file_path, "file path")?;
        let star = starred.unwrap_or_else(|| !self.stats.is_starred(file_path));

        if star {
            if !exists(&target).await {
                return Err(StorageError::NotFound("File not found".into()));
            }
            self.stats.star_file(file_path)?;
        } else {
            self.stats.unstar_file(file_path)?;
        }

        Ok(StarResult {
            file_path: file_path.to_string(),
            starred: star,
        })
    }

    pub fn starred(&self) -> Vec<StarredFile> {
        self.stats.starred_files()
    }

    fn reject_root(&self, resolved: &Path, action: &str) -> Result<(), StorageError> {
        if resolved == self.root.path() {
            return Err(StorageError::BadRequest(format!(
                "Cannot {action} the shared directory itself"
            )));
        }
        Ok(())
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(ma), Ok(mb)) = (fs::metadata(a).await, fs::metadata(b).await) {
            return ma.dev() == mb.dev() && ma.ino() == mb.ino();
        }
    }
    false
}

async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileOperations) {
        let dir = TempDir::new().unwrap();
        stdfs::create_dir_all(dir.path().join("docs")).unwrap();
        stdfs::write(dir.path().join("docs/a.txt"), b"alpha").unwrap();
        let root = SharedRoot::new(dir.path()).unwrap();
        let stats = Arc::new(StatsStore::in_memory());
        stats.initialize().unwrap();
        (dir, FileOperations::new(root, stats))
    }

    fn names(listing: Listing) -> Vec<String> {
        match listing {
            Listing::Directory(entries) => entries.into_iter().map(|e| e.path).collect(),
            Listing::File(path) => panic!("expected directory, got file {}", path.display()),
        }
    }

    #[tokio::test]
    async fn lists_direct_children_with_client_paths() {
        let (dir, ops) = setup();
        stdfs::create_dir_all(dir.path().join("docs/nested/deep")).unwrap();

        let paths = names(ops.list("docs").await.unwrap());
        assert_eq!(paths, vec!["docs/nested", "docs/a.txt"]);

        let root_paths = names(ops.list("").await.unwrap());
        assert_eq!(root_paths, vec!["docs"]);
    }

    #[tokio::test]
    async fn listing_a_file_returns_the_file() {
        let (_dir, ops) = setup();
        assert!(matches!(
            ops.list("docs/a.txt").await.unwrap(),
            Listing::File(_)
        ));
    }

    #[tokio::test]
    async fn listing_rejects_traversal() {
        let (_dir, ops) = setup();
        assert!(matches!(
            ops.list("../").await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn listing_a_missing_directory_fails() {
        let (_dir, ops) = setup();
        assert!(matches!(
            ops.list("missing").await.unwrap_err(),
            StorageError::OperationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn move_then_list() {
        let (_dir, ops) = setup();
        ops.mkdir("archive").await.unwrap();
        ops.move_path("docs/a.txt", "archive/a.txt").await.unwrap();

        assert_eq!(names(ops.list("archive").await.unwrap()), vec!["archive/a.txt"]);
        assert!(names(ops.list("docs").await.unwrap()).is_empty());

        assert!(matches!(
            ops.move_path("docs/a.txt", "x.txt").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn move_refuses_escape_before_touching_disk() {
        let (dir, ops) = setup();
        assert!(matches!(
            ops.move_path("docs/a.txt", "../stolen.txt").await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
        assert!(dir.path().join("docs/a.txt").exists());
    }

    #[tokio::test]
    async fn copy_duplicates_contents() {
        let (dir, ops) = setup();
        assert_eq!(ops.copy("docs/a.txt", "b.txt").await.unwrap(), 5);
        assert_eq!(stdfs::read(dir.path().join("b.txt")).unwrap(), b"alpha");
        assert!(matches!(
            ops.copy("nope.txt", "c.txt").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            ops.copy("docs/a.txt", "missing-dir/c.txt").await.unwrap_err(),
            StorageError::OperationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn copy_onto_itself_keeps_contents() {
        let (dir, ops) = setup();
        assert!(matches!(
            ops.copy("docs/a.txt", "./docs/a.txt").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
        assert_eq!(stdfs::read(dir.path().join("docs/a.txt")).unwrap(), b"alpha");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copy_onto_hard_link_is_rejected() {
        let (dir, ops) = setup();
        stdfs::hard_link(dir.path().join("docs/a.txt"), dir.path().join("link.txt")).unwrap();
        assert!(matches!(
            ops.copy("docs/a.txt", "link.txt").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
        assert_eq!(stdfs::read(dir.path().join("link.txt")).unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn mkdir_is_not_idempotent() {
        let (dir, ops) = setup();
        ops.mkdir("one/two/three").await.unwrap();
        assert!(dir.path().join("one/two/three").is_dir());
        assert!(matches!(
            ops.mkdir("one/two/three").await.unwrap_err(),
            StorageError::AlreadyExists(_)
        ));
        assert!(matches!(
            ops.mkdir("docs/a.txt").await.unwrap_err(),
            StorageError::AlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn rename_within_parent() {
        let (dir, ops) = setup();
        let result = ops.rename("docs/a.txt", "renamed.txt").await.unwrap();
        assert_eq!(result.new_path, "docs/renamed.txt");
        assert!(dir.path().join("docs/renamed.txt").exists());

        stdfs::write(dir.path().join("docs/other.txt"), b"o").unwrap();
        assert!(matches!(
            ops.rename("docs/renamed.txt", "other.txt").await.unwrap_err(),
            StorageError::AlreadyExists(_)
        ));
        assert!(matches!(
            ops.rename("docs/ghost.txt", "x.txt").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            ops.rename("docs/renamed.txt", "../escape.txt").await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn rename_top_level_entry() {
        let (dir, ops) = setup();
        let result = ops.rename("docs", "papers").await.unwrap();
        assert_eq!(result.new_path, "papers");
        assert!(dir.path().join("papers/a.txt").exists());
    }

    #[tokio::test]
    async fn write_creates_parents_and_overwrites() {
        let (dir, ops) = setup();
        ops.write("notes/today/todo.md", "first").await.unwrap();
        ops.write("notes/today/todo.md", "second").await.unwrap();
        assert_eq!(
            stdfs::read_to_string(dir.path().join("notes/today/todo.md")).unwrap(),
            "second"
        );
        assert!(matches!(
            ops.write("", "x").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
        assert!(matches!(
            ops.write("../../evil", "x").await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn upload_counts_and_confines() {
        let (dir, ops) = setup();
        let body = || stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"data"))]);

        let result = ops.upload("docs", "photo.jpg", body()).await.unwrap();
        assert_eq!(result.virtual_path, "docs/photo.jpg");
        assert_eq!(result.bytes_written, 4);

        // Only the base name of a client file name is kept.
        let result = ops.upload("", "../../etc/passwd", body()).await.unwrap();
        assert_eq!(result.virtual_path, "passwd");
        assert!(dir.path().join("passwd").exists());

        assert!(matches!(
            ops.upload("../outside", "x.bin", body()).await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
        assert_eq!(ops.stats().get_stats().unwrap().uploads, 2);
    }

    #[tokio::test]
    async fn download_errors() {
        let (_dir, ops) = setup();
        assert!(matches!(
            ops.download("").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
        assert!(matches!(
            ops.download("missing.txt").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            ops.download("docs").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            ops.download("../../etc/passwd").await.unwrap_err(),
            StorageError::InvalidPath(_)
        ));
        let ok = ops.download("docs/a.txt").await.unwrap();
        assert_eq!(ok.size, 5);
        assert_eq!(ok.file_name, "a.txt");
    }

    #[tokio::test]
    async fn search_reports_starred_flag() {
        let (dir, ops) = setup();
        stdfs::create_dir_all(dir.path().join("a/b")).unwrap();
        stdfs::write(dir.path().join("a/report.txt"), b"1").unwrap();
        stdfs::write(dir.path().join("a/b/Report2.doc"), b"2").unwrap();
        stdfs::write(dir.path().join("a/x.txt"), b"3").unwrap();
        ops.star("a/report.txt", Some(true)).await.unwrap();

        let results = ops.search("report", "a").await.unwrap();
        assert_eq!(results.len(), 2);
        let starred: Vec<_> = results.iter().filter(|r| r.is_starred).collect();
        assert_eq!(starred.len(), 1);
        assert_eq!(starred[0].path, "a/report.txt");

        assert!(matches!(
            ops.search("  ", "").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn star_toggle_and_unstar() {
        let (_dir, ops) = setup();
        assert!(ops.star("docs/a.txt", None).await.unwrap().starred);
        assert_eq!(ops.starred().len(), 1);
        assert!(!ops.star("docs/a.txt", None).await.unwrap().starred);
        assert!(ops.starred().is_empty());

        // Unstarring something never starred is fine, even if it is gone.
        assert!(!ops.star("gone.txt", Some(false)).await.unwrap().starred);
        assert!(matches!(
            ops.star("gone.txt", Some(true)).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn root_cannot_be_moved_or_renamed() {
        let (_dir, ops) = setup();
        assert!(matches!(
            ops.move_path("", "elsewhere").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
        assert!(matches!(
            ops.rename(".", "x").await.unwrap_err(),
            StorageError::BadRequest(_)
        ));
    }
}
