//! Module `file_ops`
//!
//! Moves file bytes between client streams and the shared root. Uploads land
//! in a temporary sibling first and are renamed over the target only once the
//! whole body has been written.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use log::{error, info};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::transfer::stream::CompletionStream;

/// Chunk size used when streaming files out to clients.
pub const BUFFER_SIZE: usize = 64 * 1024;

const TEMP_SUFFIX: &str = ".upload.tmp";

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// A fresh sibling of `target` for each call, so concurrent uploads to the
/// same name never share a temporary file.
fn temp_path_for(target: &Path) -> PathBuf {
    let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.{seq}{TEMP_SUFFIX}", std::process::id()));
    target.with_file_name(name)
}

/// Write a client byte stream to `target`, creating or overwriting it.
///
/// Returns the number of bytes written. On any failure the temporary file is
/// removed and `target` is left as it was. Concurrent uploads to one target
/// each publish a complete body; the last rename wins.
pub async fn store_stream<S, E>(target: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let temp_path = temp_path_for(target);
    info!(
        "Starting file upload: {} -> {}",
        temp_path.display(),
        target.display()
    );

    let result = write_temp(&temp_path, stream).await;
    let total = match result {
        Ok(total) => total,
        Err(e) => {
            error!("Upload to {} failed: {e}", temp_path.display());
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&temp_path, target).await {
        error!(
            "Failed to rename {} to {}: {e}",
            temp_path.display(),
            target.display()
        );
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    info!(
        "File upload completed: {} ({total} bytes)",
        target.display()
    );
    Ok(total)
}

async fn write_temp<S, E>(temp_path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await?;
    let mut stream = std::pin::pin!(stream);
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| io::Error::other(format!("upload stream aborted: {e}")))?;
        temp_file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    temp_file.flush().await?;
    temp_file.sync_all().await?;
    Ok(total)
}

/// Stream a file to a client, running `on_complete` once every byte was read.
pub fn download_stream<F>(file: File, on_complete: F) -> CompletionStream<ReaderStream<File>>
where
    F: FnOnce() + Send + 'static,
{
    CompletionStream::new(ReaderStream::with_capacity(file, BUFFER_SIZE), on_complete)
}
