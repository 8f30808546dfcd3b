//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Mapping of domain errors onto response bodies."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hems_common::ErrorBody;
use hems_sim::ValidationError;

use crate::challenge::ChallengeError;

/// Error rendered as `{errorName, errorDescription}`.
///
/// History and challenge failures keep HTTP 200 with the error embedded in
/// the body, which is what the client parses. Profile and password failures
/// use 400.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn embedded(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ErrorBody::new(name, description),
        }
    }

    pub fn bad_request(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::new(name, description),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::embedded(err.error_name(), err.to_string())
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        Self::embedded(err.error_name(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
