use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use mirage_common::Headers;

use crate::upstream_client::UpstreamChunk;

/// Copies upstream headers onto a downstream response. Hyper sets framing itself.
pub fn apply_upstream_headers(target: &mut HeaderMap, headers: &Headers) {
    for (k, v) in headers {
        if is_hop_by_hop_or_framing_header(k) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            target.append(name, value);
        }
    }
}

pub fn buffered_response(status: StatusCode, headers: &Headers, body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    apply_upstream_headers(resp.headers_mut(), headers);
    resp
}

/// Relays chunks as they arrive. A failed read ends the body abruptly so the
/// caller sees a truncated transfer instead of a silently short one.
pub fn streamed_response(
    status: StatusCode,
    headers: &Headers,
    rx: mpsc::Receiver<UpstreamChunk>,
) -> Response {
    let mut resp = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *resp.status_mut() = status;
    apply_upstream_headers(resp.headers_mut(), headers);
    resp
}

pub fn is_hop_by_hop_or_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-authenticate")
        || name.eq_ignore_ascii_case("proxy-authorization")
        || name.eq_ignore_ascii_case("proxy-connection")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
}

pub fn headers_to_vec(headers: &HeaderMap) -> Headers {
    let mut out: Headers = Vec::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.push((name.as_str().to_string(), v.to_string()));
        }
    }
    out
}
