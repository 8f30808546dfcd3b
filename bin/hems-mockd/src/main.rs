//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the HEMS mock daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hems_api::{spawn_api_server, ApiState};
use hems_common::{init_tracing, AppConfig, LogFormat};
use hems_metrics::{new_registry, spawn_http_server, DaemonMetrics, ServiceMetrics};
use tokio::signal;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "configs/hems.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("hems-mockd ", env!("CARGO_PKG_VERSION")),
    about = "Home energy management telemetry mock",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, value_name = "FORMAT", help = "Override log format (json|pretty)")]
    log_format: Option<LogFormat>,

    #[arg(long, help = "Seed the random source for reproducible series")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the REST and live feed endpoints")]
    Run,
    #[command(about = "Print the effective configuration as TOML and exit")]
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let load_started = Instant::now();
    let loaded = AppConfig::load_or_default(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH])?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if cli.seed.is_some() {
        config.random_seed = cli.seed;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Run => {
            init_tracing("hems-mockd", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; running with defaults"),
            }
            run_daemon(config, load_duration.as_secs_f64()).await
        }
    }
}

async fn run_daemon(config: AppConfig, config_load_seconds: f64) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(&registry)?;
    daemon_metrics.inc_start();
    daemon_metrics.observe_config_load(config_load_seconds);
    daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), build_profile());
    let service_metrics = ServiceMetrics::new(&registry)?;

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let state = Arc::new(ApiState::new(&config, service_metrics));
    let api_server = spawn_api_server(state, config.api.listen)?;
    info!(
        address = %api_server.addr(),
        max_points = config.history.max_points,
        tick_ms = config.live.tick_interval.as_millis() as u64,
        "mock daemon running; waiting for termination signal"
    );

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    api_server.shutdown().await?;
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    info!("shutdown complete");
    Ok(())
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}
