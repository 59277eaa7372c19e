use std::fs;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{ApiError, ServerError};
use crate::middleware::track_request;
use crate::protocol::handlers;
use crate::server::AppState;
use crate::stats::{StatsBroadcaster, StatsStore};
use crate::storage::{FileOperations, SharedRoot};
use crate::utils::{bind_first_available, local_ip};

/// Build the application router over `state`.
///
/// `body_limit` caps request bodies (uploads included); `None` lifts the cap.
pub fn router(state: AppState, body_limit: Option<usize>) -> Router {
    let limit = match body_limit {
        Some(bytes) => DefaultBodyLimit::max(bytes),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/stats", get(handlers::stats))
        .route("/ws/stats", get(handlers::stats_socket))
        .route("/files", get(handlers::list_files))
        .route("/download", get(handlers::download))
        .route("/upload", post(handlers::upload))
        .route("/move", post(handlers::move_file))
        .route("/copy", post(handlers::copy_file))
        .route("/mkdir", post(handlers::mkdir))
        .route("/rename", post(handlers::rename))
        .route("/write", post(handlers::write_file))
        .route("/search", get(handlers::search))
        .route("/star", post(handlers::star))
        .route("/starred", get(handlers::starred))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(|| async { ApiError::new(StatusCode::NOT_FOUND, "Not found") })
        .layer(limit)
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

pub struct Server {
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
}

impl Server {
    /// Open the shared root and the stats store. Nothing is bound yet.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let root = SharedRoot::new(config.shared_dir_path()).map_err(|source| {
            ServerError::SharedDir {
                path: config.shared_dir.clone(),
                source,
            }
        })?;

        let stats_path = config.stats_path();
        if let Some(parent) = stats_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stats = Arc::new(StatsStore::open(&stats_path)?);
        stats.initialize()?;

        let shutdown = CancellationToken::new();
        let broadcaster = StatsBroadcaster::new(
            Arc::clone(&stats),
            root.path().to_path_buf(),
            config.broadcast_settings(),
            shutdown.clone(),
        );
        let state = AppState::new(FileOperations::new(root, stats), broadcaster);

        Ok(Self {
            config,
            state,
            shutdown,
        })
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        bind_first_available(&self.config.bind_address, &self.config.candidate_ports()).await
    }

    /// Serve on `listener` until Ctrl-C, SIGTERM or the shutdown token fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        info!("Sharing {}", self.state.ops.root().path().display());
        info!("Server started at http://{}:{}", local_ip(), addr.port());
        if self.config.password_enabled() {
            warn!("Password is enabled but requests are not checked against it");
        }

        tokio::spawn(watch_signals(self.shutdown.clone()));

        let stats = Arc::clone(self.state.stats());
        let app = router(self.state, self.config.max_upload_bytes());
        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        if let Err(e) = stats.flush() {
            error!("Failed to write final stats: {e}");
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
