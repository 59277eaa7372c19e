//! HTTP handlers
//!
//! Thin adapters between axum extractors and [`FileOperations`]. Each handler
//! parses its input, calls one engine operation and renders the result or
//! the error as JSON.
//!
//! [`FileOperations`]: crate::storage::FileOperations

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde_json::json;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, StorageError};
use crate::protocol::requests::{
    DownloadQuery, JsonBody, MkdirPayload, PathQuery, QueryParams, RenamePayload, SearchQuery,
    StarPayload, TransferPayload, WritePayload,
};
use crate::protocol::responses::{
    self, MkdirResponse, RenameResponse, SearchResponse, StarResponse, StarredResponse,
    TransferResponse, UploadResponse, WriteResponse,
};
use crate::server::AppState;
use crate::stats::ServerStats;
use crate::storage::{DownloadResult, Listing};
use crate::transfer::{BUFFER_SIZE, download_stream};

type ApiResult<T> = Result<T, ApiError>;

/// `GET /files?path=` lists a directory, or returns a file's bytes when the
/// path names a file.
pub async fn list_files(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PathQuery>,
) -> ApiResult<Response> {
    match state.ops.list(&query.path).await? {
        Listing::Directory(entries) => Ok(Json(entries).into_response()),
        Listing::File(path) => {
            let file = File::open(&path)
                .await
                .map_err(|e| StorageError::failed("Failed to open file", e))?;
            let body = Body::from_stream(ReaderStream::with_capacity(file, BUFFER_SIZE));
            Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response())
        }
    }
}

/// `GET /download?file=` streams a file as an attachment. The download
/// counter moves only once the last chunk has been handed to the client.
/// No Content-Length is set: hyper stops polling a sized body at its last
/// byte and the end of the stream would never be observed.
pub async fn download(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<DownloadQuery>,
) -> ApiResult<Response> {
    let DownloadResult {
        file,
        file_name,
        size,
    } = state.ops.download(&query.file).await?;

    let stats = Arc::clone(state.stats());
    let body = Body::from_stream(download_stream(file, move || stats.increment_downloads()));

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name.replace('"', "_")),
        ),
    ];
    debug!("Streaming {file_name} ({size} bytes)");
    Ok((headers, body).into_response())
}

/// `POST /upload` accepts one `file` field or repeated `files` fields. The
/// target directory comes from `?path=` or from a `path` field sent before
/// the files.
pub async fn upload(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut dir = query.path;
    let mut stored = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "path" => {
                let value = field.text().await?;
                if stored.is_empty() {
                    dir = value;
                } else {
                    warn!("Ignoring 'path' field sent after {} file(s)", stored.len());
                }
            }
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let result = state.ops.upload(&dir, &file_name, field).await?;
                stored.push(result.virtual_path);
            }
            other => debug!("Ignoring multipart field '{other}'"),
        }
    }

    let Some(first) = stored.first().cloned() else {
        return Err(ApiError::bad_request("No file provided"));
    };
    Ok(Json(UploadResponse {
        message: responses::upload_message(stored.len()),
        file: first,
        files: stored,
    }))
}

pub async fn move_file(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TransferPayload>,
) -> ApiResult<Json<TransferResponse>> {
    state
        .ops
        .move_path(&payload.source_path, &payload.target_path)
        .await?;
    Ok(Json(TransferResponse {
        message: "File moved successfully",
        from: payload.source_path,
        to: payload.target_path,
    }))
}

pub async fn copy_file(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TransferPayload>,
) -> ApiResult<Json<TransferResponse>> {
    state
        .ops
        .copy(&payload.source_path, &payload.target_path)
        .await?;
    Ok(Json(TransferResponse {
        message: "File copied successfully",
        from: payload.source_path,
        to: payload.target_path,
    }))
}

pub async fn mkdir(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<MkdirPayload>,
) -> ApiResult<Json<MkdirResponse>> {
    state.ops.mkdir(&payload.dir_path).await?;
    Ok(Json(MkdirResponse {
        message: "Directory created successfully",
        path: payload.dir_path,
    }))
}

pub async fn rename(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RenamePayload>,
) -> ApiResult<Json<RenameResponse>> {
    let result = state
        .ops
        .rename(&payload.old_path, &payload.new_name)
        .await?;
    Ok(Json(RenameResponse {
        message: "Renamed successfully",
        old_path: result.old_path,
        new_path: result.new_path,
    }))
}

pub async fn write_file(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<WritePayload>,
) -> ApiResult<Json<WriteResponse>> {
    state.ops.write(&payload.file_path, &payload.content).await?;
    Ok(Json(WriteResponse {
        message: "File written successfully",
        file_path: payload.file_path,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let results = state.ops.search(&query.q, &query.path).await?;
    Ok(Json(SearchResponse {
        query: query.q,
        path: query.path,
        count: results.len(),
        results,
    }))
}

pub async fn star(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<StarPayload>,
) -> ApiResult<Json<StarResponse>> {
    let result = state.ops.star(&payload.file_path, payload.starred).await?;
    let message = if result.starred {
        "File starred"
    } else {
        "File unstarred"
    };
    info!("{message}: {}", result.file_path);
    Ok(Json(StarResponse {
        message,
        file_path: result.file_path,
        starred: result.starred,
    }))
}

pub async fn starred(State(state): State<AppState>) -> Json<StarredResponse> {
    Json(StarredResponse {
        starred: state.ops.starred(),
    })
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<ServerStats>> {
    state.stats().get_stats().map(Json).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to get server stats: {e}"),
        )
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(responses::health())
}

/// Ready when the stats store answers and the shared directory is readable.
pub async fn ready(State(state): State<AppState>) -> Response {
    let database = match state.stats().get_stats() {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    };
    let shared_directory = match fs::read_dir(state.ops.root().path()).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: not readable - {e}"),
    };

    let ready = database == "ok" && shared_directory == "ok";
    let checks = json!({ "database": database, "shared_directory": shared_directory });
    if !ready {
        warn!("Readiness check failed: {checks}");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(responses::readiness(ready, checks))).into_response()
}

/// `GET /ws/stats` upgrades to the live stats stream.
pub async fn stats_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("Stats stream client connected");
        let (sink, stream) = socket.split();
        let reason = state.broadcaster.run(sink, stream).await;
        info!("Stats stream client disconnected ({reason:?})");
    })
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
