//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "User profile and password endpoints."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::State;
use axum::{Form, Json};
use hems_common::ProfileConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::ApiState;

/// Basic information about the current user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub nick: String,
    /// Serialised as `faltSize`, the key the client reads.
    #[serde(rename = "faltSize", alias = "flatSize")]
    pub flat_size: f64,
    #[serde(rename = "flatPopulation")]
    pub flat_population: u32,
}

impl From<&ProfileConfig> for UserProfile {
    fn from(config: &ProfileConfig) -> Self {
        Self {
            nick: config.nick.clone(),
            flat_size: config.flat_size,
            flat_population: config.flat_population,
        }
    }
}

/// Process-lifetime profile slot.
#[derive(Debug)]
pub struct ProfileStore {
    initial: UserProfile,
    current: RwLock<UserProfile>,
}

impl ProfileStore {
    pub fn new(initial: UserProfile) -> Self {
        Self {
            current: RwLock::new(initial.clone()),
            initial,
        }
    }

    pub fn get(&self) -> UserProfile {
        self.current.read().clone()
    }

    pub fn replace(&self, next: UserProfile) {
        *self.current.write() = next;
    }

    /// Restore the configured seed profile.
    pub fn reset(&self) {
        self.replace(self.initial.clone());
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PasswordForm {
    #[serde(default)]
    password: String,
    #[serde(default)]
    token: String,
}

pub(crate) async fn get_profile(State(state): State<Arc<ApiState>>) -> Json<UserProfile> {
    Json(state.profile.get())
}

pub(crate) async fn post_profile(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<UserProfile>, JsonRejection>,
) -> Result<Json<UserProfile>, ApiError> {
    let Json(profile) = payload.map_err(|rejection| {
        debug!(error = %rejection, "profile payload rejected");
        ApiError::bad_request("Can not parse profile.", "Maybe there are missing values?")
    })?;
    state.profile.replace(profile.clone());
    info!(nick = %profile.nick, "profile updated");
    Ok(Json(profile))
}

/// Password reset guarded by the configured token.
pub(crate) async fn reset_password(
    State(state): State<Arc<ApiState>>,
    form: Result<Form<PasswordForm>, FormRejection>,
) -> Result<Json<Value>, ApiError> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    if form.token != state.account.reset_token {
        return Err(ApiError::bad_request(
            "Unknown token",
            "Try again with a valid token.",
        ));
    }
    check_password_length(&form.password, state.account.password_min_length)?;
    info!("password reset accepted");
    Ok(Json(json!({})))
}

pub(crate) async fn update_password(
    State(state): State<Arc<ApiState>>,
    form: Result<Form<PasswordForm>, FormRejection>,
) -> Result<Json<Value>, ApiError> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    check_password_length(&form.password, state.account.password_min_length)?;
    info!("password update accepted");
    Ok(Json(json!({})))
}

fn check_password_length(password: &str, min_length: usize) -> Result<(), ApiError> {
    if password.chars().count() < min_length {
        return Err(ApiError::bad_request(
            "Password too short",
            format!("Try again with a password at least {min_length} chars long."),
        ));
    }
    Ok(())
}
