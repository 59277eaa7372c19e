//! Stats store
//!
//! Durable server counters and the starred-file set. The whole document lives
//! behind one lock, so concurrent increments are never lost. Each mutation
//! takes a numbered snapshot under that lock. Counter snapshots are written
//! on the blocking pool; a snapshot older than the one on disk is dropped.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Singleton counters row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub downloads: u64,
    pub requests: u64,
    pub uploads: u64,
    pub start_time: DateTime<Utc>,
}

impl ServerStats {
    fn fresh() -> Self {
        Self {
            downloads: 0,
            requests: 0,
            uploads: 0,
            start_time: Utc::now(),
        }
    }
}

/// A starred path, keyed by the client string it was starred with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StarredFile {
    pub id: u64,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// Counter selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Downloads,
    Uploads,
    Requests,
}

impl FromStr for StatField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloads" => Ok(StatField::Downloads),
            "uploads" => Ok(StatField::Uploads),
            "requests" => Ok(StatField::Requests),
            other => Err(format!("unknown stats field: {other}")),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    server_stats: Option<ServerStats>,
    #[serde(default)]
    starred_files: Vec<StarredFile>,
    #[serde(default)]
    next_starred_id: u64,
    #[serde(skip)]
    version: u64,
}

/// Owns the document file. Writers are serialized and never move it backwards.
struct Persister {
    path: PathBuf,
    written: Mutex<u64>,
}

impl Persister {
    /// Write the snapshot to a temporary sibling, then rename it into place.
    fn write(&self, version: u64, bytes: &[u8]) -> Result<(), StatsError> {
        let mut written = self.written.lock();
        if version <= *written {
            return Ok(());
        }
        let io_err = |source| StatsError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;
        *written = version;
        Ok(())
    }
}

struct PendingWrite {
    persister: Arc<Persister>,
    version: u64,
    bytes: Vec<u8>,
}

impl PendingWrite {
    fn run(self) -> Result<(), StatsError> {
        self.persister.write(self.version, &self.bytes)
    }

    /// Hand the write to the blocking pool when inside a runtime.
    fn spawn(self, what: StatField) {
        let write = move || {
            if let Err(e) = self.run() {
                error!("Failed to persist {what:?} increment: {e}");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

pub struct StatsStore {
    document: Mutex<StoreDocument>,
    persister: Option<Arc<Persister>>,
}

impl StatsStore {
    /// Open the store document at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StatsError> {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Creating stats store at {}", path.display());
                StoreDocument::default()
            }
            Err(source) => {
                return Err(StatsError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        info!("Opened stats store at {}", path.display());

        Ok(Self {
            document: Mutex::new(document),
            persister: Some(Arc::new(Persister {
                path,
                written: Mutex::new(0),
            })),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            document: Mutex::new(StoreDocument::default()),
            persister: None,
        }
    }

    /// Create the counters row if it is absent. Run once at startup.
    pub fn initialize(&self) -> Result<ServerStats, StatsError> {
        let mut doc = self.document.lock();
        if let Some(stats) = &doc.server_stats {
            return Ok(stats.clone());
        }
        let stats = ServerStats::fresh();
        doc.server_stats = Some(stats.clone());
        let pending = self.snapshot(&mut doc)?;
        drop(doc);
        write_now(pending)?;
        info!("Initialized server stats (start time {})", stats.start_time);
        Ok(stats)
    }

    pub fn get_stats(&self) -> Result<ServerStats, StatsError> {
        self.document
            .lock()
            .server_stats
            .clone()
            .ok_or(StatsError::MissingRow)
    }

    pub fn increment_downloads(&self) {
        self.increment_field(StatField::Downloads);
    }

    pub fn increment_uploads(&self) {
        self.increment_field(StatField::Uploads);
    }

    pub fn increment_requests(&self) {
        self.increment_field(StatField::Requests);
    }

    /// Increment a counter by name; unknown names are logged and ignored.
    pub fn increment(&self, field: &str) {
        match field.parse::<StatField>() {
            Ok(field) => self.increment_field(field),
            Err(e) => warn!("Ignoring increment: {e}"),
        }
    }

    fn increment_field(&self, field: StatField) {
        let pending = {
            let mut doc = self.document.lock();
            let Some(stats) = doc.server_stats.as_mut() else {
                warn!("Server stats row missing, dropping {field:?} increment");
                return;
            };
            match field {
                StatField::Downloads => stats.downloads += 1,
                StatField::Uploads => stats.uploads += 1,
                StatField::Requests => stats.requests += 1,
            }
            self.snapshot(&mut doc)
        };
        match pending {
            Ok(Some(write)) => write.spawn(field),
            Ok(None) => {}
            Err(e) => error!("Failed to serialize stats after {field:?} increment: {e}"),
        }
    }

    /// Zero every counter and restart the clock, creating the row if needed.
    pub fn reset_stats(&self) -> Result<ServerStats, StatsError> {
        let mut doc = self.document.lock();
        let stats = ServerStats::fresh();
        doc.server_stats = Some(stats.clone());
        let pending = self.snapshot(&mut doc)?;
        drop(doc);
        write_now(pending)?;
        info!("Server stats reset");
        Ok(stats)
    }

    /// Star `file_path`. Returns false when it was already starred.
    pub fn star_file(&self, file_path: &str) -> Result<bool, StatsError> {
        let mut doc = self.document.lock();
        if doc.starred_files.iter().any(|s| s.file_path == file_path) {
            debug!("File already starred: {file_path}");
            return Ok(false);
        }
        doc.next_starred_id += 1;
        let starred = StarredFile {
            id: doc.next_starred_id,
            file_path: file_path.to_string(),
            created_at: Utc::now(),
        };
        doc.starred_files.push(starred);
        let pending = self.snapshot(&mut doc)?;
        drop(doc);
        write_now(pending)?;
        info!("File starred: {file_path}");
        Ok(true)
    }

    /// Unstar `file_path`. Returns false when it was not starred.
    pub fn unstar_file(&self, file_path: &str) -> Result<bool, StatsError> {
        let mut doc = self.document.lock();
        let before = doc.starred_files.len();
        doc.starred_files.retain(|s| s.file_path != file_path);
        if doc.starred_files.len() == before {
            debug!("File was not starred: {file_path}");
            return Ok(false);
        }
        let pending = self.snapshot(&mut doc)?;
        drop(doc);
        write_now(pending)?;
        info!("File unstarred: {file_path}");
        Ok(true)
    }

    pub fn is_starred(&self, file_path: &str) -> bool {
        self.document
            .lock()
            .starred_files
            .iter()
            .any(|s| s.file_path == file_path)
    }

    /// Starred files, newest first.
    pub fn starred_files(&self) -> Vec<StarredFile> {
        let mut files = self.document.lock().starred_files.clone();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        files
    }

    /// Write the current document now, waiting for the disk.
    pub fn flush(&self) -> Result<(), StatsError> {
        let pending = self.snapshot(&mut self.document.lock())?;
        write_now(pending)
    }

    /// Number the current state and serialize it. `None` for in-memory stores.
    fn snapshot(&self, doc: &mut StoreDocument) -> Result<Option<PendingWrite>, StatsError> {
        let Some(persister) = &self.persister else {
            return Ok(None);
        };
        doc.version += 1;
        Ok(Some(PendingWrite {
            persister: Arc::clone(persister),
            version: doc.version,
            bytes: serde_json::to_vec_pretty(&*doc)?,
        }))
    }
}

fn write_now(pending: Option<PendingWrite>) -> Result<(), StatsError> {
    pending.map_or(Ok(()), PendingWrite::run)
}
