//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Client-facing REST and live WebSocket surface."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! HTTP surface of the HEMS telemetry mock.
//!
//! Every handler reads from one explicitly constructed [`ApiState`]; there is
//! no global mutable state. [`spawn_api_server`] binds the router and returns
//! an [`ApiServer`] whose shutdown also stops every live session.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Json, Router};
use hems_common::{AccountConfig, AppConfig, HistoryConfig, LiveFeedConfig};
use hems_metrics::ServiceMetrics;
use hems_sim::{RangeValidator, SeriesGenerator, SeriesKind, SharedRng};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub mod account;
pub mod catalog;
pub mod challenge;
pub mod error;
mod history;
pub mod live;

pub use account::{ProfileStore, UserProfile};
pub use catalog::{Catalog, Challenge, Hint, HitlistEntry};
pub use challenge::{ChallengeError, ChallengeState};
pub use error::ApiError;
pub use live::SessionEnd;

/// Shared API state exposed to handlers.
pub struct ApiState {
    catalog: Catalog,
    challenges: ChallengeState,
    profile: ProfileStore,
    validator: RangeValidator,
    generator: SeriesGenerator,
    rng: SharedRng,
    history: HistoryConfig,
    live: LiveFeedConfig,
    account: AccountConfig,
    metrics: ServiceMetrics,
    next_session_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl ApiState {
    pub fn new(config: &AppConfig, metrics: ServiceMetrics) -> Self {
        Self::with_catalog(config, Catalog::default(), metrics)
    }

    pub fn with_catalog(config: &AppConfig, catalog: Catalog, metrics: ServiceMetrics) -> Self {
        let rng = SharedRng::new(config.random_seed);
        let (shutdown, _) = watch::channel(false);
        Self {
            challenges: ChallengeState::new(catalog.challenges.clone()),
            catalog,
            profile: ProfileStore::new(UserProfile::from(&config.account.profile)),
            validator: RangeValidator::new(config.history.max_points),
            generator: SeriesGenerator::new(rng.clone()),
            rng,
            history: config.history.clone(),
            live: config.live.clone(),
            account: config.account.clone(),
            metrics,
            next_session_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub fn challenges(&self) -> &ChallengeState {
        &self.challenges
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    /// Clear the active challenge and restore the seed profile.
    pub fn reset(&self) {
        self.challenges.reset();
        self.profile.reset();
    }

    /// Ask the server and every live session to stop.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn step_scale(&self, kind: SeriesKind) -> f64 {
        match kind {
            SeriesKind::Individual => self.history.individual_step_scale,
            SeriesKind::Group => self.history.group_step_scale,
        }
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    state: Arc<ApiState>,
    task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("history", &self.history)
            .field("live", &self.live)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    /// Stop accepting connections, end live sessions and wait for the server task.
    pub async fn shutdown(self) -> Result<()> {
        self.state.begin_shutdown();
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the router serving every endpoint of the mock.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/hints", get(get_hints))
        .route("/hitlist", get(get_hitlist))
        .route("/challanges", get(challenge::list_challenges))
        .route("/challanges/start/:id", get(challenge::start_challenge))
        .route("/challanges/status", get(challenge::challenge_status))
        .route(
            "/individual-consumption-history/begin/:begin/end/:end/tics/:tics",
            get(history::individual_history),
        )
        .route(
            "/group-consumption-history/begin/:begin/end/:end/tics/:tics",
            get(history::group_history),
        )
        .route(
            "/profile",
            get(account::get_profile).post(account::post_profile),
        )
        .route("/password", post(account::reset_password))
        .route("/update-password", post(account::update_password))
        .route("/live", get(live::live_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve [`router`] until [`ApiServer::shutdown`].
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let app = router(state.clone());
    let mut shutdown = state.subscribe_shutdown();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        info!(address = %local_addr, "api server stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        state,
        task,
    })
}

async fn get_hints(
    axum::extract::State(state): axum::extract::State<Arc<ApiState>>,
) -> Json<Vec<Hint>> {
    Json(state.catalog.hints.clone())
}

async fn get_hitlist(
    axum::extract::State(state): axum::extract::State<Arc<ApiState>>,
) -> Json<Vec<HitlistEntry>> {
    Json(state.catalog.hitlist.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn start() -> ApiServer {
        let config = AppConfig {
            random_seed: Some(7),
            ..AppConfig::default()
        };
        let state = Arc::new(ApiState::new(&config, ServiceMetrics::unregistered()));
        spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).unwrap()
    }

    async fn get_json(server: &ApiServer, path: &str) -> (reqwest::StatusCode, Value) {
        let response = reqwest::get(format!("http://{}{}", server.addr(), path))
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn five_hour_range_yields_five_points() {
        let server = start().await;
        let (status, body) = get_json(
            &server,
            "/individual-consumption-history/begin/2020-01-01T00:00:00Z/end/2020-01-01T05:00:00Z/tics/3600",
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::OK);
        let values = body.as_array().unwrap();
        assert_eq!(values.len(), 5);
        for pair in values.windows(2) {
            assert!(pair[1].as_f64().unwrap() >= pair[0].as_f64().unwrap());
        }
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn zero_tics_is_reported_in_body() {
        let server = start().await;
        let (status, body) = get_json(
            &server,
            "/group-consumption-history/begin/2020-01-01T00:00:00Z/end/2020-01-01T05:00:00Z/tics/0",
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["errorName"], "Invalid values for tics");
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_challenge_keeps_status_ok() {
        let server = start().await;
        let (status, body) = get_json(&server, "/challanges/start/99").await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["errorName"], "Unknown id");

        let (_, status_body) = get_json(&server, "/challanges/status").await;
        assert_eq!(status_body["id"], 0);
        assert_eq!(status_body["name"], "");
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn lookup_endpoints_serve_catalog() {
        let server = start().await;
        let (_, hints) = get_json(&server, "/hints").await;
        assert_eq!(hints.as_array().unwrap().len(), Catalog::default().hints.len());
        let (_, hitlist) = get_json(&server, "/hitlist").await;
        assert_eq!(hitlist[0]["position"], 1);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn password_reset_requires_token() {
        let server = start().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/password", server.addr()))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("password=longenough&token=wrong")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["errorName"], "Unknown token");

        let response = client
            .post(format!("http://{}/password", server.addr()))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("password=longenough&token=expected")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        server.shutdown().await.unwrap();
    }

    #[test]
    fn reset_restores_initial_state() {
        let state = ApiState::new(&AppConfig::default(), ServiceMetrics::unregistered());
        state.challenges().start("1").unwrap();
        state.reset();
        assert!(state.challenges().status().is_none());
        assert!(!state.is_shutting_down());
        state.begin_shutdown();
        assert!(state.is_shutting_down());
    }
}
