use std::time::Duration;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

use mirage_common::RelayConfig;
use mirage_protocol::SyntheticMessage;

use crate::error::ProxyError;
use crate::ingress::header_joined;

/// Marks a reply that was generated locally rather than fetched upstream.
pub const PROBE_MARKER_HEADER: &str = "x-mock-response";

/// User-agent fragment of the automated client that sends probes.
const PROBE_CLIENT_SIGNATURE: &str = "Go-http-client";

/// Exact fingerprint of an automated liveness probe.
///
/// Every check must hold; a real minimal request differs in at least one.
pub fn is_probe(body: Option<&Value>, headers: &HeaderMap) -> bool {
    let Some(body) = body.and_then(Value::as_object) else {
        return false;
    };
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return false;
    };

    let user_agent = header_joined(headers, "user-agent").unwrap_or_default();
    let has_api_key = header_joined(headers, "x-api-key").is_some_and(|value| !value.is_empty());
    let has_auth = header_joined(headers, "authorization").is_some_and(|value| !value.is_empty());
    if !user_agent.contains(PROBE_CLIENT_SIGNATURE) || !has_api_key || has_auth {
        return false;
    }

    let [only] = messages.as_slice() else {
        return false;
    };
    let says_hi = only
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|content| content.to_lowercase() == "hi");
    let empty_tools = body
        .get("tools")
        .and_then(Value::as_array)
        .is_some_and(|tools| tools.is_empty());

    says_hi
        && empty_tools
        && !body.contains_key("stream")
        && !body.contains_key("metadata")
        && !body.contains_key("system")
}

/// Uniform in `[min, max)`; a degenerate range yields `min`.
pub fn probe_delay(config: &RelayConfig) -> Duration {
    let (min, max) = (config.probe_delay_min_ms, config.probe_delay_max_ms);
    let millis = if max > min {
        rand::rng().random_range(min..max)
    } else {
        min
    };
    Duration::from_millis(millis)
}

/// `msg_` followed by 24 hex chars.
pub fn synthetic_message_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("msg_{}", &hex[..24])
}

pub fn synthetic_reply(model: Option<&str>) -> Response {
    let message = SyntheticMessage::greeting(synthetic_message_id(), model);
    let body = match serde_json::to_vec(&message) {
        Ok(body) => body,
        Err(err) => return ProxyError::internal(err.to_string()).into_response(),
    };
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::OK;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp.headers_mut()
        .insert(PROBE_MARKER_HEADER, HeaderValue::from_static("true"));
    resp
}
