//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the mock service."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Caller-input failures reported in response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidDate,
    InvalidInterval,
    RangeOrder,
    TooManyPoints,
    UnknownId,
}

impl ErrorKind {
    /// Stable label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidDate => "invalid_date",
            ErrorKind::InvalidInterval => "invalid_interval",
            ErrorKind::RangeOrder => "range_order",
            ErrorKind::TooManyPoints => "too_many_points",
            ErrorKind::UnknownId => "unknown_id",
        }
    }
}

/// Error object embedded in response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "errorName")]
    pub name: String,
    #[serde(rename = "errorDescription")]
    pub description: String,
}

impl ErrorBody {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
