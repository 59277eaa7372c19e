//! Request logging middleware
//!
//! Counts every inbound request in the stats store and logs it once the
//! response is ready.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use log::{debug, info};

use crate::server::AppState;

pub async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.stats().increment_requests();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    debug!("--> {method} {path}");

    let response = next.run(request).await;

    info!(
        "{method} {path} {} ({:.1?})",
        response.status().as_u16(),
        started.elapsed()
    );
    response
}
