//! Per-request view handed to scripts.

use crate::matcher::decode_path;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::Request;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Snapshot of one inbound request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestSnapshot {
    /// Request method
    pub method: String,
    /// Percent-decoded request path
    pub path: String,
    /// Query parameters (first occurrence wins)
    pub query: HashMap<String, String>,
    /// Request headers with canonical names such as `Content-Type`
    /// (first occurrence wins)
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, the raw text when it is not JSON, or null when empty
    pub body: serde_json::Value,
    /// Path parameters bound by the route template
    pub params: HashMap<String, String>,
}

impl RequestSnapshot {
    /// Consume a request, reading at most `body_limit` bytes of its body.
    pub async fn capture(
        request: Request<Body>,
        params: HashMap<String, String>,
        body_limit: usize,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
                Default::default()
            }
        };
        Self::from_parts(&parts, &bytes, params)
    }

    /// Build a snapshot from request parts and an already-read body.
    pub fn from_parts(parts: &Parts, body: &[u8], params: HashMap<String, String>) -> Self {
        Self {
            method: parts.method.as_str().to_string(),
            path: decode_path(parts.uri.path()).into_owned(),
            query: parse_query_string(parts.uri.query().unwrap_or("")),
            headers: flatten_headers(&parts.headers),
            body: parse_body(body),
            params,
        }
    }
}

/// Flatten multi-valued headers to their first value, keyed by canonical name.
fn flatten_headers(headers: &axum::http::HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            flat.entry(canonical_header_name(name.as_str()))
                .or_insert_with(|| value.to_string());
        }
    }
    flat
}

/// `x-request-id` -> `X-Request-Id`: upper-case the first letter and every
/// letter following a `-`, lower-case the rest.
fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

fn parse_body(body: &[u8]) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux");
        assert_eq!(params.get("foo"), Some(&"bar".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));

        let params = parse_query_string("name=John%20Doe&tag=a+b");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(params.get("tag"), Some(&"a b".to_string()));
    }

    #[test]
    fn test_first_query_value_wins() {
        let params = parse_query_string("page=1&page=2&flag");
        assert_eq!(params.get("page"), Some(&"1".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_snapshot_from_parts() {
        let request = Request::builder()
            .method("POST")
            .uri("/users/7?verbose=true")
            .header("X-Trace", "abc")
            .header("x-trace", "def")
            .body(())
            .unwrap();
        let params = HashMap::from([("id".to_string(), "7".to_string())]);

        let snapshot = RequestSnapshot::from_parts(&parts(request), br#"{"name":"Ann"}"#, params);

        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.path, "/users/7");
        assert!(snapshot.headers.get("x-trace").is_none());
        assert_eq!(snapshot.query.get("verbose").map(String::as_str), Some("true"));
        assert_eq!(snapshot.headers.get("X-Trace").map(String::as_str), Some("abc"));
        assert_eq!(snapshot.body, json!({"name": "Ann"}));
        assert_eq!(snapshot.params.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_canonical_header_names() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-token"), "X-Token");
        assert_eq!(canonical_header_name("authorization"), "Authorization");
        assert_eq!(canonical_header_name("www-authenticate"), "Www-Authenticate");
        assert_eq!(canonical_header_name("x-b3-traceid"), "X-B3-Traceid");
    }

    #[test]
    fn test_snapshot_path_is_decoded() {
        let request = Request::builder()
            .uri("/search/a%20b?q=x%20y")
            .header("Authorization", "Bearer t")
            .body(())
            .unwrap();

        let snapshot = RequestSnapshot::from_parts(&parts(request), b"", HashMap::new());
        assert_eq!(snapshot.path, "/search/a b");
        assert_eq!(snapshot.query.get("q").map(String::as_str), Some("x y"));
        assert_eq!(
            snapshot.headers.get("Authorization").map(String::as_str),
            Some("Bearer t")
        );
    }

    #[test]
    fn test_body_fallbacks() {
        assert_eq!(parse_body(b""), serde_json::Value::Null);
        assert_eq!(parse_body(b"plain text"), json!("plain text"));
        assert_eq!(parse_body(b"42"), json!(42));
    }

    #[tokio::test]
    async fn test_capture_reads_body() {
        let request = Request::builder()
            .method("PUT")
            .uri("/items")
            .body(Body::from(r#"[1, 2, 3]"#))
            .unwrap();

        let snapshot = RequestSnapshot::capture(request, HashMap::new(), 1024).await;
        assert_eq!(snapshot.body, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_capture_oversized_body_is_absent() {
        let request = Request::builder()
            .method("PUT")
            .uri("/items")
            .body(Body::from("x".repeat(64)))
            .unwrap();

        let snapshot = RequestSnapshot::capture(request, HashMap::new(), 16).await;
        assert_eq!(snapshot.body, serde_json::Value::Null);
    }
}
