//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across crates.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: IntGaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "hems_mockd_starts_total",
            "Total number of times the mock daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "hems_mockd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = IntGaugeVec::new(
            Opts::new(
                "hems_mockd_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1);
    }
}

/// Request and session counters for the mock API.
#[derive(Clone, Debug)]
pub struct ServiceMetrics {
    history_requests: IntCounterVec,
    history_points: IntCounterVec,
    live_sessions_active: IntGauge,
    live_sessions_closed: IntCounterVec,
    live_readings: IntCounter,
    challenge_starts: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let history_requests = IntCounterVec::new(
            Opts::new(
                "hems_history_requests_total",
                "History requests by series and outcome",
            ),
            &["series", "outcome"],
        )?;
        registry.register(Box::new(history_requests.clone()))?;

        let history_points = IntCounterVec::new(
            Opts::new(
                "hems_history_points_total",
                "Synthetic history points returned by series",
            ),
            &["series"],
        )?;
        registry.register(Box::new(history_points.clone()))?;

        let live_sessions_active = IntGauge::with_opts(Opts::new(
            "hems_live_sessions_active",
            "Live feed sessions currently streaming",
        ))?;
        registry.register(Box::new(live_sessions_active.clone()))?;

        let live_sessions_closed = IntCounterVec::new(
            Opts::new(
                "hems_live_sessions_closed_total",
                "Live feed sessions closed by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(live_sessions_closed.clone()))?;

        let live_readings = IntCounter::with_opts(Opts::new(
            "hems_live_readings_total",
            "Live readings pushed to clients",
        ))?;
        registry.register(Box::new(live_readings.clone()))?;

        let challenge_starts = IntCounterVec::new(
            Opts::new(
                "hems_challenge_starts_total",
                "Challenge start requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(challenge_starts.clone()))?;

        Ok(Self {
            history_requests,
            history_points,
            live_sessions_active,
            live_sessions_closed,
            live_readings,
            challenge_starts,
        })
    }

    /// Metrics bound to a private registry, for tests and embedding.
    pub fn unregistered() -> Self {
        Self::new(&Registry::new()).expect("fresh registry accepts service metrics")
    }

    pub fn record_history(&self, series: &str, outcome: &str, points: usize) {
        self.history_requests
            .with_label_values(&[series, outcome])
            .inc();
        if points > 0 {
            self.history_points
                .with_label_values(&[series])
                .inc_by(points as u64);
        }
    }

    pub fn live_session_opened(&self) {
        self.live_sessions_active.inc();
    }

    pub fn live_session_closed(&self, reason: &str) {
        self.live_sessions_active.dec();
        self.live_sessions_closed.with_label_values(&[reason]).inc();
    }

    pub fn live_reading_sent(&self) {
        self.live_readings.inc();
    }

    pub fn record_challenge_start(&self, outcome: &str) {
        self.challenge_starts.with_label_values(&[outcome]).inc();
    }

    pub fn live_sessions_active(&self) -> i64 {
        self.live_sessions_active.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_metrics_register_once_per_registry() {
        let registry = Registry::new();
        let _metrics = ServiceMetrics::new(&registry).unwrap();
        assert!(ServiceMetrics::new(&registry).is_err());
    }

    #[test]
    fn live_session_gauge_tracks_open_sessions() {
        let metrics = ServiceMetrics::unregistered();
        metrics.live_session_opened();
        metrics.live_session_opened();
        metrics.live_session_closed("client_closed");
        assert_eq!(metrics.live_sessions_active(), 1);
    }

    #[test]
    fn history_points_accumulate_per_series() {
        let registry = Registry::new();
        let metrics = ServiceMetrics::new(&registry).unwrap();
        metrics.record_history("group", "ok", 5);
        metrics.record_history("group", "too_many_points", 0);

        let text = TextEncoder::new().encode_to_string(&registry.gather()).unwrap();
        assert!(text.contains("hems_history_points_total{series=\"group\"} 5"));
        assert!(text.contains("outcome=\"too_many_points\""));
    }

    #[tokio::test]
    async fn exporter_serves_registered_metrics() {
        let registry = new_registry();
        let daemon = DaemonMetrics::new(&registry).unwrap();
        daemon.inc_start();
        daemon.set_build_info("0.1.0", "debug");

        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap()).unwrap();
        let response = reqwest::get(format!("http://{}/metrics", server.addr()))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("hems_mockd_starts_total 1"));
        assert!(body.contains("hems_mockd_build_info"));
        server.shutdown().await.unwrap();
    }
}
