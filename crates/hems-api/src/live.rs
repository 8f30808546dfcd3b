//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live feed WebSocket sessions."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! A session moves from connecting (HTTP upgrade) to streaming and ends in
//! closed. While streaming it owns one [`LiveFeed`], advances it once per
//! tick and pushes the reading before the next tick may run.

use std::future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use hems_common::LiveFeedConfig;
use hems_metrics::ServiceMetrics;
use hems_sim::LiveFeed;
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::ApiState;

/// Why a streaming session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Close frame, read error or end of the inbound stream.
    ClientClosed,
    /// The push failed; the client is gone.
    SendFailed,
    /// The push did not complete within the send timeout.
    SendTimedOut,
    /// The configured maximum session duration elapsed.
    MaxDuration,
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::ClientClosed => "client_closed",
            SessionEnd::SendFailed => "send_failed",
            SessionEnd::SendTimedOut => "send_timed_out",
            SessionEnd::MaxDuration => "max_duration",
            SessionEnd::Shutdown => "shutdown",
        }
    }

    /// Whether the transport may still accept a close frame.
    fn transport_usable(&self) -> bool {
        matches!(self, SessionEnd::MaxDuration | SessionEnd::Shutdown)
    }
}

pub(crate) async fn live_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    let session = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    ws.on_failed_upgrade(move |err| {
        warn!(session, error = %err, "live feed upgrade failed");
    })
    .on_upgrade(move |socket| {
        run_session(socket, state).instrument(info_span!("live_session", session))
    })
}

async fn run_session(socket: WebSocket, state: Arc<ApiState>) {
    let (sink, inbound) = socket.split();
    let feed = LiveFeed::seed(
        state.rng.clone(),
        state.live.initial,
        state.live.increment,
        Utc::now(),
    );
    let mut active = ActiveSession::open(&state.metrics);
    info!("live session streaming");

    let end = stream_readings(
        sink,
        inbound,
        feed,
        &state.live,
        state.subscribe_shutdown(),
        &state.metrics,
    )
    .await;

    active.reason = end.as_str();
    info!(reason = end.as_str(), "live session closed");
}

/// Keeps the active-session gauge honest on every exit path.
struct ActiveSession<'a> {
    metrics: &'a ServiceMetrics,
    reason: &'static str,
}

impl<'a> ActiveSession<'a> {
    fn open(metrics: &'a ServiceMetrics) -> Self {
        metrics.live_session_opened();
        Self {
            metrics,
            reason: "aborted",
        }
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.metrics.live_session_closed(self.reason);
    }
}

/// Drive one session until it ends.
///
/// The first reading goes out immediately, then one per `tick_interval`.
/// Inbound text/binary frames are ignored; the transport closing is the only
/// client-side stop signal. Both halves are dropped before returning.
pub async fn stream_readings<S, R, E>(
    mut sink: S,
    mut inbound: R,
    mut feed: LiveFeed,
    settings: &LiveFeedConfig,
    mut shutdown: watch::Receiver<bool>,
    metrics: &ServiceMetrics,
) -> SessionEnd
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let mut ticker = interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let limit = settings.max_session;
    let expiry = async move {
        match limit {
            Some(limit) => sleep(limit).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);

    let mut sent: u64 = 0;
    let end = loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break SessionEnd::Shutdown,
            _ = &mut expiry => break SessionEnd::MaxDuration,
            message = inbound.next() => match message {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break SessionEnd::ClientClosed,
                Some(Ok(_)) => continue,
            },
            _ = ticker.tick() => {
                let reading = feed.advance(Utc::now());
                let payload = match serde_json::to_string(&reading) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to serialise live reading");
                        continue;
                    }
                };
                match timeout(settings.send_timeout, sink.send(Message::Text(payload))).await {
                    Ok(Ok(())) => {
                        sent += 1;
                        metrics.live_reading_sent();
                    }
                    Ok(Err(_)) => break SessionEnd::SendFailed,
                    Err(_) => break SessionEnd::SendTimedOut,
                }
            }
        }
    };

    if end.transport_usable() {
        let _ = timeout(settings.send_timeout, sink.close()).await;
    }
    debug!(sent, reason = end.as_str(), "live stream finished");
    end
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
