//! Response resolution.
//!
//! Combines an endpoint with an optional script result into the final
//! status, headers, and JSON body.

use crate::routes::Endpoint;
use crate::script::{ScriptError, ScriptResult};
use axum::body::Body;
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

const APPLICATION_JSON: &str = "application/json";

/// Final response for a configured endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl ResolvedResponse {
    /// Response for a static endpoint.
    pub fn from_static(endpoint: &Endpoint) -> Self {
        Self {
            status: endpoint.status,
            headers: with_default_content_type(endpoint.headers.clone()),
            body: endpoint.definition.response.clone(),
        }
    }

    /// Response for a scripted endpoint after a successful evaluation.
    pub fn from_script(endpoint: &Endpoint, result: ScriptResult) -> Self {
        let mut headers = endpoint.headers.clone();
        for (name, value) in &result.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Dropping invalid header returned by script"),
            }
        }

        Self {
            status: result.status.unwrap_or(endpoint.status),
            headers: with_default_content_type(headers),
            body: result.body,
        }
    }
}

impl IntoResponse for ResolvedResponse {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.body) {
            Ok(bytes) => (self.status, self.headers, Body::from(bytes)).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to serialize response body");
                internal_error(self.headers, &e.to_string())
            }
        }
    }
}

/// 500 response for a failed script, keeping the endpoint's headers.
pub fn script_failure(endpoint: &Endpoint, err: &ScriptError) -> Response {
    internal_error(endpoint.headers.clone(), &err.to_string())
}

/// 405 response listing the explicitly configured methods.
pub fn method_not_allowed<'a>(allowed: impl Iterator<Item = &'a str>) -> Response {
    let allowed = allowed.collect::<Vec<_>>().join(", ");
    let mut response = (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    if !allowed.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            response.headers_mut().insert(ALLOW, value);
        }
    }
    response
}

fn internal_error(headers: HeaderMap, details: &str) -> Response {
    let body = serde_json::json!({
        "error": "Script execution failed",
        "details": details,
    });
    let mut headers = headers;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    (StatusCode::INTERNAL_SERVER_ERROR, headers, body.to_string()).into_response()
}

fn with_default_content_type(mut headers: HeaderMap) -> HeaderMap {
    headers
        .entry(CONTENT_TYPE)
        .or_insert_with(|| HeaderValue::from_static(APPLICATION_JSON));
    headers
}
