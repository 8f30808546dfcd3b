//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the mock service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use crate::MAX_VALUES_HISTORY;

/// Largest accepted `history.max_points`; bounds the allocation of one response.
pub const MAX_POINTS_CEILING: u64 = 1_000_000;

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8088".parse().expect("valid default api address")
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_max_points() -> u64 {
    MAX_VALUES_HISTORY
}

fn default_individual_step_scale() -> f64 {
    10.0
}

fn default_group_step_scale() -> f64 {
    100.0
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_bounds() -> ReadingBounds {
    ReadingBounds {
        user_consumption: 10,
        group_consumption: 100,
        group_production: 10,
    }
}

fn default_increment_bounds() -> ReadingBounds {
    ReadingBounds {
        user_consumption: 10,
        group_consumption: 100,
        group_production: 100,
    }
}

fn default_reset_token() -> String {
    "expected".to_owned()
}

fn default_password_min_length() -> usize {
    8
}

/// Primary configuration object for the mock service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seed for the shared random source. Entropy is used when unset.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub live: LiveFeedConfig,
    #[serde(default)]
    pub account: AccountConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "HEMS_CONFIG";

    /// Resolve the configuration: `HEMS_CONFIG`, then `explicit`, then the
    /// first existing candidate.
    ///
    /// Falls back to [`AppConfig::default`] when none of the candidates exist.
    /// Paths named by `HEMS_CONFIG` or `explicit` must exist.
    pub fn load_or_default<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.history.validate()?;
        self.live.validate()?;
        self.account.validate()?;
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise configuration")
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

/// Limits and magnitudes for the consumption history endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_points")]
    pub max_points: u64,
    #[serde(default = "default_individual_step_scale")]
    pub individual_step_scale: f64,
    #[serde(default = "default_group_step_scale")]
    pub group_step_scale: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            individual_step_scale: default_individual_step_scale(),
            group_step_scale: default_group_step_scale(),
        }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_points == 0 || self.max_points > MAX_POINTS_CEILING {
            return Err(anyhow!(
                "history.max_points must be between 1 and {}, got {}",
                MAX_POINTS_CEILING,
                self.max_points
            ));
        }
        for (name, scale) in [
            ("individual_step_scale", self.individual_step_scale),
            ("group_step_scale", self.group_step_scale),
        ] {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(anyhow!(
                    "history.{} must be a positive finite number, got {}",
                    name,
                    scale
                ));
            }
        }
        Ok(())
    }
}

/// Exclusive upper bounds for the random counters of a live reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingBounds {
    pub user_consumption: u64,
    pub group_consumption: u64,
    pub group_production: u64,
}

impl ReadingBounds {
    fn validate(&self, section: &str) -> Result<()> {
        for (name, bound) in [
            ("user_consumption", self.user_consumption),
            ("group_consumption", self.group_consumption),
            ("group_production", self.group_production),
        ] {
            if bound == 0 {
                return Err(anyhow!("live.{}.{} must be at least 1", section, name));
            }
        }
        Ok(())
    }
}

/// Cadence, limits and magnitudes for live feed sessions.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFeedConfig {
    #[serde(default = "default_tick_interval", rename = "tick_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    #[serde(default = "default_send_timeout", rename = "send_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub send_timeout: Duration,
    /// Hard cap on a session's lifetime. Sessions run until disconnect when unset.
    #[serde(default, rename = "max_session_secs")]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub max_session: Option<Duration>,
    #[serde(default = "default_initial_bounds")]
    pub initial: ReadingBounds,
    #[serde(default = "default_increment_bounds")]
    pub increment: ReadingBounds,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            send_timeout: default_send_timeout(),
            max_session: None,
            initial: default_initial_bounds(),
            increment: default_increment_bounds(),
        }
    }
}

impl LiveFeedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("live.tick_interval_ms must be greater than zero"));
        }
        if self.send_timeout.is_zero() {
            return Err(anyhow!("live.send_timeout_ms must be greater than zero"));
        }
        if matches!(self.max_session, Some(limit) if limit.is_zero()) {
            return Err(anyhow!("live.max_session_secs must be greater than zero"));
        }
        self.initial.validate("initial")?;
        self.increment.validate("increment")?;
        Ok(())
    }
}

/// Seed profile served by `/profile` until a client replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub nick: String,
    pub flat_size: f64,
    pub flat_population: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            nick: "DarkNight".to_owned(),
            flat_size: 120.0,
            flat_population: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_reset_token")]
    pub reset_token: String,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            reset_token: default_reset_token(),
            password_min_length: default_password_min_length(),
            profile: ProfileConfig::default(),
        }
    }
}

impl AccountConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reset_token.trim().is_empty() {
            return Err(anyhow!("account.reset_token must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.api.listen.port(), 8088);
        assert_eq!(config.history.max_points, 10_000);
        assert_eq!(config.history.individual_step_scale, 10.0);
        assert_eq!(config.history.group_step_scale, 100.0);
        assert_eq!(config.live.tick_interval, Duration::from_secs(1));
        assert!(config.live.max_session.is_none());
        assert_eq!(config.live.increment.user_consumption, 10);
        assert_eq!(config.account.reset_token, "expected");
        assert!(config.random_seed.is_none());
    }

    #[test]
    fn durations_parse_from_unit_suffixed_keys() {
        let config: AppConfig = r#"
            random_seed = 7

            [live]
            tick_interval_ms = 250
            send_timeout_ms = 100
            max_session_secs = 30
        "#
        .parse()
        .unwrap();
        assert_eq!(config.live.tick_interval, Duration::from_millis(250));
        assert_eq!(config.live.send_timeout, Duration::from_millis(100));
        assert_eq!(config.live.max_session, Some(Duration::from_secs(30)));
        assert_eq!(config.random_seed, Some(7));
    }

    #[test]
    fn rejects_non_positive_step_scale() {
        let err = "[history]\ngroup_step_scale = 0.0"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("group_step_scale"));
    }

    #[test]
    fn rejects_zero_increment_bound() {
        let err = r#"
            [live.increment]
            user_consumption = 0
            group_consumption = 100
            group_production = 100
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("user_consumption"));
    }

    #[test]
    fn rejects_zero_tick_interval() {
        assert!("[live]\ntick_interval_ms = 0".parse::<AppConfig>().is_err());
    }

    #[test]
    fn loads_first_existing_candidate() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nlisten = \"127.0.0.1:9000\"").unwrap();
        let missing = PathBuf::from("definitely/not/here.toml");

        let loaded =
            AppConfig::load_or_default(None, &[missing, file.path().to_path_buf()]).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
        assert_eq!(loaded.config.api.listen.port(), 9000);
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() {
        let loaded = AppConfig::load_or_default(None, &["definitely/not/here.toml"]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.metrics.listen.port(), 9898);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let mut fallback = NamedTempFile::new().unwrap();
        writeln!(fallback, "[api]\nlisten = \"127.0.0.1:9000\"").unwrap();

        let err = AppConfig::load_or_default(
            Some(Path::new("typo/hems.toml")),
            &[fallback.path().to_path_buf()],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("typo/hems.toml"));
    }

    #[test]
    fn explicit_path_wins_over_candidates() {
        let mut explicit = NamedTempFile::new().unwrap();
        writeln!(explicit, "[api]\nlisten = \"127.0.0.1:9100\"").unwrap();
        let mut fallback = NamedTempFile::new().unwrap();
        writeln!(fallback, "[api]\nlisten = \"127.0.0.1:9000\"").unwrap();

        let loaded =
            AppConfig::load_or_default(Some(explicit.path()), &[fallback.path().to_path_buf()])
                .unwrap();
        assert_eq!(loaded.source.as_deref(), Some(explicit.path()));
        assert_eq!(loaded.config.api.listen.port(), 9100);
    }

    #[test]
    fn rejects_max_points_above_ceiling() {
        let err = format!("[history]\nmax_points = {}", MAX_POINTS_CEILING + 1)
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("max_points"));
        assert!(format!("[history]\nmax_points = {MAX_POINTS_CEILING}")
            .parse::<AppConfig>()
            .is_ok());
    }

    #[test]
    fn effective_config_round_trips_through_toml() {
        let rendered = AppConfig::default().to_toml().unwrap();
        let parsed: AppConfig = rendered.parse().unwrap();
        assert_eq!(parsed.live.tick_interval, Duration::from_secs(1));
        assert_eq!(parsed.account.profile, ProfileConfig::default());
    }
}
