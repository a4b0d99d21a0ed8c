use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Non-JSON text bodies are kept (for logging) only up to this many chars.
pub const TRUNCATED_BODY_CHARS: usize = 10_000;

const REDACTED_HEADERS: &[&str] = &["authorization", "x-api-key", "cookie"];

/// Inbound body, classified once at entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// GET/HEAD, or nothing was sent.
    Absent,
    Structured(Value),
    Truncated(String),
    Opaque,
}

impl RequestBody {
    pub fn classify(method: &Method, raw: &[u8]) -> Self {
        if *method == Method::GET || *method == Method::HEAD || raw.is_empty() {
            return RequestBody::Absent;
        }
        if let Ok(value) = serde_json::from_slice::<Value>(raw) {
            return RequestBody::Structured(value);
        }
        match std::str::from_utf8(raw) {
            Ok(text) => RequestBody::Truncated(text.chars().take(TRUNCATED_BODY_CHARS).collect()),
            Err(_) => RequestBody::Opaque,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            RequestBody::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.json().and_then(Value::as_object)
    }

    /// `"stream": true` in a JSON object body.
    pub fn wants_stream(&self) -> bool {
        self.as_object()
            .and_then(|body| body.get("stream"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn model(&self) -> Option<&str> {
        self.as_object()
            .and_then(|body| body.get("model"))
            .and_then(Value::as_str)
    }

    /// Log-safe rendition: message contents are replaced by `"*"`.
    pub fn summary(&self) -> Value {
        match self {
            RequestBody::Absent => Value::Null,
            RequestBody::Truncated(text) => Value::String(text.clone()),
            RequestBody::Opaque => Value::String("[binary]".to_string()),
            RequestBody::Structured(Value::Object(body)) => {
                let mut body = body.clone();
                if let Some(Value::Array(messages)) = body.get_mut("messages") {
                    for message in messages.iter_mut().filter_map(Value::as_object_mut) {
                        if message.contains_key("content") {
                            message.insert("content".to_string(), Value::String("*".to_string()));
                        }
                    }
                }
                Value::Object(body)
            }
            RequestBody::Structured(value) => value.clone(),
        }
    }
}

/// Everything the relay needs from one inbound request. Immutable once captured.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub started_at: Instant,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Forwarded upstream untouched.
    pub raw_body: Bytes,
    pub body: RequestBody,
}

impl InboundRequest {
    pub fn capture(method: Method, uri: Uri, headers: HeaderMap, raw_body: Bytes) -> Self {
        let body = RequestBody::classify(&method, &raw_body);
        Self {
            request_id: Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            method,
            uri,
            headers,
            raw_body,
            body,
        }
    }

    /// All values of `name` joined by `", "`, or `None` when absent.
    pub fn header(&self, name: &str) -> Option<String> {
        header_joined(&self.headers, name)
    }

    /// Hostname the caller addressed, without port.
    pub fn hostname(&self) -> Option<String> {
        let authority = self
            .uri
            .host()
            .map(str::to_string)
            .or_else(|| self.header("host"))?;
        Some(strip_port(&authority).to_string())
    }

    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/")
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Header map for logging, with credentials redacted.
    pub fn headers_for_log(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for name in self.headers.keys() {
            let key = name.as_str();
            let value = if REDACTED_HEADERS.contains(&key) {
                "***".to_string()
            } else {
                header_joined(&self.headers, key).unwrap_or_default()
            };
            out.insert(key.to_string(), value);
        }
        out
    }
}

pub(crate) fn header_joined(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn strip_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        // [v6]:port
        return rest.split(']').next().unwrap_or(rest);
    }
    authority.split(':').next().unwrap_or(authority)
}
