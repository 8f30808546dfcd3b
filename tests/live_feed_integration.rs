//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "End-to-end checks of live feed WebSocket sessions."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use hems_api::{spawn_api_server, ApiServer, ApiState};
use hems_common::{AppConfig, LiveFeedConfig};
use hems_metrics::ServiceMetrics;
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn fast_config() -> AppConfig {
    AppConfig {
        random_seed: Some(11),
        live: LiveFeedConfig {
            tick_interval: Duration::from_millis(20),
            ..LiveFeedConfig::default()
        },
        ..AppConfig::default()
    }
}

fn start(config: &AppConfig) -> ApiServer {
    let state = Arc::new(ApiState::new(config, ServiceMetrics::unregistered()));
    spawn_api_server(state, "127.0.0.1:0".parse().unwrap()).expect("api server binds")
}

fn field(reading: &Value, name: &str) -> u64 {
    reading[name]
        .as_u64()
        .unwrap_or_else(|| panic!("{name} missing in {reading}"))
}

#[tokio::test]
async fn session_pushes_monotonic_readings() {
    let server = start(&fast_config());
    let (mut socket, _) = connect_async(format!("ws://{}/live", server.addr()))
        .await
        .expect("websocket handshake");

    let mut readings = Vec::new();
    while readings.len() < 5 {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("reading before timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = message {
            readings.push(serde_json::from_str::<Value>(&text).unwrap());
        }
    }

    for reading in &readings {
        assert!(field(reading, "selfSufficiency") < 100);
        assert!(reading["date"].is_string());
    }
    for pair in readings.windows(2) {
        let earlier: DateTime<Utc> = pair[0]["date"].as_str().unwrap().parse().unwrap();
        let later: DateTime<Utc> = pair[1]["date"].as_str().unwrap().parse().unwrap();
        assert!(later > earlier);
        for name in ["userConsumption", "groupConsumption", "groupProduction"] {
            assert!(field(&pair[1], name) >= field(&pair[0], name), "{name} decreased");
        }
    }

    socket.close(None).await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn sessions_do_not_share_counters() {
    let server = start(&fast_config());
    let url = format!("ws://{}/live", server.addr());
    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    for socket in [&mut first, &mut second] {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reading: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        // A fresh feed starts below initial + one increment.
        assert!(field(&reading, "userConsumption") < 20);
        assert!(field(&reading, "groupConsumption") < 200);
    }

    first.close(None).await.unwrap();
    second.close(None).await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_shutdown_closes_live_sessions() {
    let server = start(&fast_config());
    let (mut socket, _) = connect_async(format!("ws://{}/live", server.addr()))
        .await
        .unwrap();
    let first = timeout(Duration::from_secs(2), socket.next()).await.unwrap();
    assert!(matches!(first, Some(Ok(Message::Text(_)))));

    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown completes")
        .unwrap();

    let drained = timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "socket still open after shutdown");
}
