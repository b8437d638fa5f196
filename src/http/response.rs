//! Response composition.
//!
//! # Responsibilities
//! - Turn redirect and reject decisions into HTTP responses
//! - Merge gate headers into upstream responses
//! - Map upstream failures to 502/504
//!
//! # Design Decisions
//! - Gate headers overwrite same-named upstream headers
//! - Redirects are 307 so the method and body survive

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::gate::GateDecision;
use crate::security::headers::merge;

/// Build the response for a decision that ends at the gate.
///
/// A `PassThrough` here yields an empty 200 carrying the gate headers;
/// the server only calls this for the other two variants.
pub fn decision_response(decision: GateDecision) -> Response {
    match decision {
        GateDecision::PassThrough { headers } => {
            let mut response = StatusCode::OK.into_response();
            apply_headers(&mut response, &headers);
            response
        }
        GateDecision::Redirect { location, headers } => {
            let mut response = Response::builder()
                .status(StatusCode::TEMPORARY_REDIRECT)
                .body(Body::empty())
                .unwrap_or_default();
            match HeaderValue::from_str(&location) {
                Ok(value) => {
                    response.headers_mut().insert(header::LOCATION, value);
                }
                Err(e) => {
                    tracing::warn!(location = %location, error = %e, "Unencodable redirect target");
                }
            }
            apply_headers(&mut response, &headers);
            response
        }
        GateDecision::Reject {
            status,
            body,
            headers,
        } => {
            let mut response = match body {
                Some(body) => (status, Json(body)).into_response(),
                None => status.into_response(),
            };
            apply_headers(&mut response, &headers);
            response
        }
    }
}

/// Merge gate headers into an outgoing response.
pub fn apply_headers(response: &mut Response, headers: &HeaderMap) {
    merge(response.headers_mut(), headers);
}

/// Response for an upstream that failed or did not answer in time.
pub fn upstream_error(status: StatusCode) -> Response {
    let message = match status {
        StatusCode::GATEWAY_TIMEOUT => "Upstream timed out",
        _ => "Upstream request failed",
    };
    (status, Json(json!({ "error": message }))).into_response()
}
