use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use bytes::Bytes;

use crate::core::CoreState;
use crate::ingress::InboundRequest;

/// Fallback route: every path not served locally is relayed.
pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let inbound = InboundRequest::capture(method, uri, headers, body);
    state.dispatcher.dispatch(inbound).await
}
