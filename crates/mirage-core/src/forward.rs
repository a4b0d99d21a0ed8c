use mirage_common::{RelayConfig, header_get, header_remove, header_set};
use tracing::info;

use crate::encoding::narrow_accept_encoding;
use crate::ingress::InboundRequest;
use crate::response::{headers_to_vec, is_hop_by_hop_or_framing_header};
use crate::upstream_client::UpstreamHttpRequest;

/// Rewrites an inbound request for the upstream target.
///
/// Caller headers are kept except hop-by-hop ones; `host`, the forwarding
/// pair and the whole disguise bundle always overwrite what the caller sent.
/// `accept-encoding` is narrowed to codings the observer can decode.
pub fn build_upstream_request(config: &RelayConfig, inbound: &InboundRequest) -> UpstreamHttpRequest {
    let mut headers = headers_to_vec(&inbound.headers);
    headers.retain(|(k, _)| !is_hop_by_hop_or_framing_header(k));

    header_set(&mut headers, "host", config.target_host.as_str());
    if let Some(hostname) = inbound.hostname() {
        header_set(&mut headers, "x-forwarded-host", hostname);
    }
    header_set(&mut headers, "x-forwarded-proto", "https");
    for (name, value) in &config.inject_headers {
        header_set(&mut headers, name.as_str(), value.as_str());
    }
    if let Some(accept) = header_remove(&mut headers, "accept-encoding") {
        header_set(&mut headers, "accept-encoding", narrow_accept_encoding(&accept));
    }

    let url = config.target_url(inbound.path_and_query());
    info!(
        event = "forwarded_headers",
        request_id = %inbound.request_id,
        url = %url,
        user_agent = ?header_get(&headers, "user-agent"),
        anthropic_beta = ?header_get(&headers, "anthropic-beta"),
        x_app = ?header_get(&headers, "x-app"),
    );

    let body = (!inbound.raw_body.is_empty()).then(|| inbound.raw_body.clone());
    UpstreamHttpRequest {
        method: inbound.method.clone(),
        url,
        headers,
        body,
    }
}
