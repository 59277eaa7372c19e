//! Stats broadcaster
//!
//! Drives one streaming client through `Connecting -> Streaming -> Closed`.
//! While streaming, three events are raced: the refresh timer (send a fresh
//! snapshot), the ping timer (send a liveness probe) and the reader task
//! finishing (client closed, protocol error, or no frame within the read
//! deadline). Any failed send closes the stream.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error};
use serde::Serialize;
use serde_json::json;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::StatsError;
use crate::stats::store::{ServerStats, StatsStore};
use crate::stats::system::{self, SystemStats};

/// Counters plus host figures, as pushed to streaming clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedStats {
    #[serde(flatten)]
    pub stats: ServerStats,
    pub system: SystemStats,
}

#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    pub refresh_interval: Duration,
    pub ping_interval: Duration,
    pub read_deadline: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Closed,
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    ClientGone,
    ProtocolError,
    ReadTimeout,
    SendFailed,
    StoreUnavailable,
    Shutdown,
}

#[derive(Clone)]
pub struct StatsBroadcaster {
    stats: Arc<StatsStore>,
    shared_dir: PathBuf,
    settings: BroadcastSettings,
    shutdown: CancellationToken,
}

impl StatsBroadcaster {
    pub fn new(
        stats: Arc<StatsStore>,
        shared_dir: PathBuf,
        settings: BroadcastSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stats,
            shared_dir,
            settings,
            shutdown,
        }
    }

    pub fn snapshot(&self) -> Result<ExtendedStats, StatsError> {
        Ok(ExtendedStats {
            stats: self.stats.get_stats()?,
            system: system::collect(&self.shared_dir),
        })
    }

    /// Serve one client until the stream closes.
    pub async fn run<W, R, E>(&self, sink: W, frames: R) -> CloseReason
    where
        W: Sink<Message>,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut sink = std::pin::pin!(sink);
        let mut state = StreamState::Connecting;
        debug!("Stats stream {state:?}");

        let initial = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to retrieve initial stats: {e}");
                let _ = send_json(&mut sink, &json!({ "error": "Failed to retrieve stats" })).await;
                let _ = sink.close().await;
                return CloseReason::StoreUnavailable;
            }
        };
        if let Err(e) = send_json(&mut sink, &initial).await {
            debug!("Stats stream closed during initial send: {e}");
            return CloseReason::SendFailed;
        }

        state = advance(state, StreamState::Streaming);

        let mut reader = tokio::spawn(read_frames(frames, self.settings.read_deadline));

        let start = Instant::now();
        let mut refresh = interval_at(
            start + self.settings.refresh_interval,
            self.settings.refresh_interval,
        );
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping = interval_at(start + self.settings.ping_interval, self.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,

                finished = &mut reader => {
                    break finished.unwrap_or(CloseReason::ProtocolError);
                }

                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                        debug!("Failed to send ping, connection may be closed: {e}");
                        break CloseReason::SendFailed;
                    }
                }

                _ = refresh.tick() => {
                    let sent = match self.snapshot() {
                        Ok(snapshot) => {
                            debug!(
                                "Sending stats: downloads={}, uploads={}, requests={}, memory={:.1}%, disk={:.1}%",
                                snapshot.stats.downloads,
                                snapshot.stats.uploads,
                                snapshot.stats.requests,
                                snapshot.system.memory.percent,
                                snapshot.system.disk.percent
                            );
                            send_json(&mut sink, &snapshot).await
                        }
                        Err(e) => {
                            error!("Failed to retrieve stats: {e}");
                            send_json(&mut sink, &json!({ "error": "Failed to retrieve stats" })).await
                        }
                    };
                    if let Err(e) = sent {
                        debug!("Stats stream closed during send: {e}");
                        break CloseReason::SendFailed;
                    }
                }
            }
        };

        reader.abort();
        let _ = sink.close().await;
        advance(state, StreamState::Closed);
        debug!("Stats stream ended: {reason:?}");
        reason
    }
}

fn advance(from: StreamState, to: StreamState) -> StreamState {
    debug!("Stats stream {from:?} -> {to:?}");
    to
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    T: Serialize,
{
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Consume inbound frames until the client leaves. Every frame, pongs
/// included, pushes the read deadline forward.
async fn read_frames<R, E>(frames: R, deadline: Duration) -> CloseReason
where
    R: Stream<Item = Result<Message, E>>,
    E: Display,
{
    let mut frames = std::pin::pin!(frames);
    loop {
        match timeout(deadline, frames.next()).await {
            Err(_) => {
                debug!("No frame from stats client within {deadline:?}");
                return CloseReason::ReadTimeout;
            }
            Ok(None) => return CloseReason::ClientGone,
            Ok(Some(Err(e))) => {
                debug!("Stats stream read error: {e}");
                return CloseReason::ProtocolError;
            }
            Ok(Some(Ok(Message::Close(_)))) => return CloseReason::ClientClosed,
            Ok(Some(Ok(_))) => continue,
        }
    }
}
