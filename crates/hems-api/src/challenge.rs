//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active challenge slot and its endpoints."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::Uri;
use axum::Json;
use hems_common::ErrorKind;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Challenge;
use crate::error::ApiError;
use crate::ApiState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("{raw} is not a known challenge.")]
    UnknownId { raw: String },
}

impl ChallengeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChallengeError::UnknownId { .. } => ErrorKind::UnknownId,
        }
    }

    pub fn error_name(&self) -> &'static str {
        match self {
            ChallengeError::UnknownId { .. } => "Unknown id",
        }
    }
}

/// Single-slot holder of the challenge currently being tracked.
///
/// Last start wins. A rejected start leaves the slot untouched.
#[derive(Debug)]
pub struct ChallengeState {
    catalog: Vec<Challenge>,
    active: RwLock<Option<Challenge>>,
}

impl ChallengeState {
    pub fn new(catalog: Vec<Challenge>) -> Self {
        Self {
            catalog,
            active: RwLock::new(None),
        }
    }

    pub fn catalog(&self) -> &[Challenge] {
        &self.catalog
    }

    /// Activate the catalog entry at index `raw_id`.
    pub fn start(&self, raw_id: &str) -> Result<Challenge, ChallengeError> {
        let challenge = raw_id
            .parse::<usize>()
            .ok()
            .and_then(|index| self.catalog.get(index))
            .cloned()
            .ok_or_else(|| ChallengeError::UnknownId {
                raw: raw_id.to_owned(),
            })?;
        *self.active.write() = Some(challenge.clone());
        Ok(challenge)
    }

    pub fn status(&self) -> Option<Challenge> {
        self.active.read().clone()
    }

    pub fn reset(&self) {
        *self.active.write() = None;
    }
}

pub(crate) async fn list_challenges(State(state): State<Arc<ApiState>>) -> Json<Vec<Challenge>> {
    Json(state.challenges.catalog().to_vec())
}

pub(crate) async fn start_challenge(
    State(state): State<Arc<ApiState>>,
    uri: Uri,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Challenge>, ApiError> {
    // An undecodable id cannot name a catalog entry; echo it as sent.
    let id = match id {
        Ok(Path(id)) => id,
        Err(_) => uri.path().rsplit('/').next().unwrap_or_default().to_owned(),
    };
    match state.challenges.start(&id) {
        Ok(challenge) => {
            state.metrics.record_challenge_start("ok");
            info!(challenge_id = challenge.id, name = %challenge.name, "challenge started");
            Ok(Json(challenge))
        }
        Err(err) => {
            state.metrics.record_challenge_start(err.kind().as_str());
            debug!(raw_id = %id, error = %err, "challenge start rejected");
            Err(err.into())
        }
    }
}

/// Zero-valued challenge when none has been started.
pub(crate) async fn challenge_status(State(state): State<Arc<ApiState>>) -> Json<Challenge> {
    Json(state.challenges.status().unwrap_or_default())
}
