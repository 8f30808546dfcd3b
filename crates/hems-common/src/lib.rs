//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the mock service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the HEMS telemetry mock workspace.
//! This crate exposes configuration loading, logging initialisation and the
//! caller-facing error taxonomy consumed across the workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    AccountConfig, ApiConfig, AppConfig, HistoryConfig, LiveFeedConfig, LoadedAppConfig,
    LoggingConfig, MetricsConfig, ProfileConfig, ReadingBounds,
};
pub use error::{ErrorBody, ErrorKind};
pub use logging::{init_tracing, LogFormat};

/// Upper bound on points per history request when nothing else is configured.
pub const MAX_VALUES_HISTORY: u64 = 10_000;
