//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Consumption history endpoints."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::Uri;
use axum::Json;
use hems_sim::SeriesKind;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::ApiState;

#[derive(Debug, Default, PartialEq, Deserialize)]
pub(crate) struct RangeParams {
    begin: String,
    end: String,
    tics: String,
}

impl RangeParams {
    /// Recover the parameters from `/{series}/begin/{b}/end/{e}/tics/{t}`
    /// when the router could not decode them.
    fn from_raw_path(path: &str) -> Self {
        let mut params = Self::default();
        let segments: Vec<&str> = path.split('/').skip(2).collect();
        for pair in segments.chunks(2) {
            if let [key, value] = pair {
                let value = decode_segment(value);
                match *key {
                    "begin" => params.begin = value,
                    "end" => params.end = value,
                    "tics" => params.tics = value,
                    _ => {}
                }
            }
        }
        params
    }
}

/// Percent-decode one path segment, keeping the raw text when the decoded
/// bytes are not UTF-8 so the validator rejects it like any other bad value.
fn decode_segment(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_owned())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn range_params(extracted: Result<Path<RangeParams>, PathRejection>, uri: &Uri) -> RangeParams {
    match extracted {
        Ok(Path(params)) => params,
        Err(rejection) => {
            debug!(error = %rejection, path = %uri.path(), "history path not decodable");
            RangeParams::from_raw_path(uri.path())
        }
    }
}

pub(crate) async fn individual_history(
    State(state): State<Arc<ApiState>>,
    uri: Uri,
    params: Result<Path<RangeParams>, PathRejection>,
) -> Result<Json<Vec<f64>>, ApiError> {
    history(&state, SeriesKind::Individual, &range_params(params, &uri))
}

pub(crate) async fn group_history(
    State(state): State<Arc<ApiState>>,
    uri: Uri,
    params: Result<Path<RangeParams>, PathRejection>,
) -> Result<Json<Vec<f64>>, ApiError> {
    history(&state, SeriesKind::Group, &range_params(params, &uri))
}

fn history(
    state: &ApiState,
    kind: SeriesKind,
    params: &RangeParams,
) -> Result<Json<Vec<f64>>, ApiError> {
    let series = kind.as_str();
    let plan = match state
        .validator
        .validate(&params.begin, &params.end, &params.tics)
    {
        Ok(plan) => plan,
        Err(err) => {
            state.metrics.record_history(series, err.kind().as_str(), 0);
            debug!(
                series,
                begin = %params.begin,
                end = %params.end,
                tics = %params.tics,
                error = %err,
                "history request rejected"
            );
            return Err(err.into());
        }
    };

    let values = state.generator.generate(&plan, state.step_scale(kind));
    state.metrics.record_history(series, "ok", values.len());
    debug!(
        series,
        points = values.len(),
        tic_seconds = plan.tic_seconds(),
        "history series generated"
    );
    Ok(Json(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_segment_handles_escapes() {
        assert_eq!(decode_segment("2020-01-01T00%3A00%3A00Z"), "2020-01-01T00:00:00Z");
        assert_eq!(decode_segment("%205"), " 5");
        assert_eq!(decode_segment("%FF"), "%FF");
        assert_eq!(decode_segment("100%"), "100%");
        assert_eq!(decode_segment("%zz1"), "%zz1");
    }

    #[test]
    fn raw_path_recovers_every_parameter() {
        let params = RangeParams::from_raw_path(
            "/group-consumption-history/begin/2020-01-01T00:00:00Z/end/%FF/tics/60",
        );
        assert_eq!(
            params,
            RangeParams {
                begin: "2020-01-01T00:00:00Z".into(),
                end: "%FF".into(),
                tics: "60".into(),
            }
        );
    }
}
