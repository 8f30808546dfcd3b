//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Validation of history request ranges into generation plans."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use hems_common::{ErrorKind, MAX_VALUES_HISTORY};
use thiserror::Error;

/// Which end of the requested range failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Begin,
    End,
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateField::Begin => f.write_str("begin"),
            DateField::End => f.write_str("end"),
        }
    }
}

/// Reasons a history request is rejected before any value is generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{raw} is not a valid RFC3339 date")]
    InvalidDate { field: DateField, raw: String },
    #[error("{raw} is not a valid integer.")]
    MalformedInterval { raw: String },
    #[error("tics must be a positive number of seconds, got {tics}.")]
    NonPositiveInterval { tics: i64 },
    #[error("End date must be after begin date.")]
    RangeOrder,
    #[error("Max tics allowed: {max}")]
    TooManyPoints { requested: u64, max: u64 },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::InvalidDate { .. } => ErrorKind::InvalidDate,
            ValidationError::MalformedInterval { .. }
            | ValidationError::NonPositiveInterval { .. } => ErrorKind::InvalidInterval,
            ValidationError::RangeOrder => ErrorKind::RangeOrder,
            ValidationError::TooManyPoints { .. } => ErrorKind::TooManyPoints,
        }
    }

    /// Short headline shown to the client next to the description.
    pub fn error_name(&self) -> &'static str {
        match self {
            ValidationError::InvalidDate {
                field: DateField::Begin,
                ..
            } => "Invalid begin date",
            ValidationError::InvalidDate {
                field: DateField::End,
                ..
            } => "Invalid end date",
            ValidationError::MalformedInterval { .. }
            | ValidationError::NonPositiveInterval { .. } => "Invalid values for tics",
            ValidationError::RangeOrder => "Invalid values for dates",
            ValidationError::TooManyPoints { .. } => "Too many values requested",
        }
    }
}

/// Validated, immutable description of one history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPlan {
    tic_seconds: u64,
    point_count: u64,
}

impl GenerationPlan {
    pub fn tic_seconds(&self) -> u64 {
        self.tic_seconds
    }

    /// Number of whole tics between begin and end.
    pub fn point_count(&self) -> u64 {
        self.point_count
    }
}

/// Turns raw `(begin, end, tics)` path parameters into a [`GenerationPlan`].
#[derive(Debug, Clone, Copy)]
pub struct RangeValidator {
    max_points: u64,
}

impl Default for RangeValidator {
    fn default() -> Self {
        Self::new(MAX_VALUES_HISTORY)
    }
}

impl RangeValidator {
    pub const fn new(max_points: u64) -> Self {
        Self { max_points }
    }

    /// Checks run in order: begin date, end date, range order, tic syntax,
    /// tic sign, point limit. An inverted range is reported before anything
    /// about the tic.
    pub fn validate(
        &self,
        begin_raw: &str,
        end_raw: &str,
        tic_raw: &str,
    ) -> Result<GenerationPlan, ValidationError> {
        let begin = parse_timestamp(DateField::Begin, begin_raw)?;
        let end = parse_timestamp(DateField::End, end_raw)?;
        if begin > end {
            return Err(ValidationError::RangeOrder);
        }

        let tics: i64 = tic_raw
            .parse()
            .map_err(|_| ValidationError::MalformedInterval {
                raw: tic_raw.to_owned(),
            })?;
        if tics <= 0 {
            return Err(ValidationError::NonPositiveInterval { tics });
        }
        let tic_seconds = tics as u64;

        // Whole seconds suffice: with an integral tic the fractional remainder
        // can never complete another tic.
        let span_seconds = (end - begin).num_seconds() as u64;
        let point_count = span_seconds / tic_seconds;
        if point_count > self.max_points {
            return Err(ValidationError::TooManyPoints {
                requested: point_count,
                max: self.max_points,
            });
        }

        Ok(GenerationPlan {
            tic_seconds,
            point_count,
        })
    }
}

fn parse_timestamp(field: DateField, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidDate {
            field,
            raw: raw.to_owned(),
        })
}
