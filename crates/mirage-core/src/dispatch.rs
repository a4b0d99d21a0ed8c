use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

use mirage_common::RelayConfig;
use mirage_protocol::{EchoedRequest, ExchangeResponse};

use crate::classify::classify_error;
use crate::encoding::ContentDecoder;
use crate::error::ProxyError;
use crate::forward::build_upstream_request;
use crate::ingress::InboundRequest;
use crate::observe::{Observation, log_reconstructed, spawn_observation};
use crate::probe::{is_probe, probe_delay, synthetic_reply};
use crate::record::RecordEmitter;
use crate::response::{buffered_response, streamed_response};
use crate::tee::{TeeReceivers, tee};
use crate::upstream_client::{UpstreamBody, UpstreamClient, UpstreamHttpResponse};

const LOGGED_ERROR_BODY_CHARS: usize = 2000;

/// Routes one captured request through probe, forward and relay.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<RelayConfig>,
    client: Arc<dyn UpstreamClient>,
    records: RecordEmitter,
}

impl Dispatcher {
    pub fn new(
        config: Arc<RelayConfig>,
        client: Arc<dyn UpstreamClient>,
        records: RecordEmitter,
    ) -> Self {
        Self {
            config,
            client,
            records,
        }
    }

    pub async fn dispatch(&self, inbound: InboundRequest) -> Response {
        info!(
            event = "downstream_received",
            request_id = %inbound.request_id,
            method = %inbound.method,
            url = %inbound.uri,
            headers = ?inbound.headers_for_log(),
            body = %inbound.body.summary()
        );

        if is_probe(inbound.body.json(), &inbound.headers) {
            tokio::time::sleep(probe_delay(&self.config)).await;
            info!(
                event = "probe_mocked",
                request_id = %inbound.request_id,
                elapsed_ms = inbound.elapsed_ms()
            );
            return synthetic_reply(inbound.body.model());
        }

        let request = build_upstream_request(&self.config, &inbound);
        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    event = "upstream_failed",
                    request_id = %inbound.request_id,
                    elapsed_ms = inbound.elapsed_ms(),
                    error = %err
                );
                return ProxyError::bad_gateway("upstream request failed").into_response();
            }
        };

        if response.status != StatusCode::OK {
            return self.relay_error(&inbound, response).await;
        }

        info!(
            event = "upstream_responded",
            request_id = %inbound.request_id,
            status = response.status.as_u16(),
            elapsed_ms = inbound.elapsed_ms()
        );

        if inbound.body.wants_stream() {
            return self.relay_streamed(inbound, response);
        }
        if inbound.body.as_object().is_some() {
            return self.relay_buffered(inbound, response).await;
        }
        match response.body {
            UpstreamBody::Bytes(body) => buffered_response(response.status, &response.headers, body),
            UpstreamBody::Stream(rx) => streamed_response(response.status, &response.headers, rx),
        }
    }

    async fn relay_error(&self, inbound: &InboundRequest, response: UpstreamHttpResponse) -> Response {
        let body = match response.body.collect().await {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    event = "upstream_failed",
                    request_id = %inbound.request_id,
                    status = response.status.as_u16(),
                    error = %err
                );
                return ProxyError::bad_gateway("upstream read failed").into_response();
            }
        };

        let text = String::from_utf8_lossy(&body);
        let logged: String = text.chars().take(LOGGED_ERROR_BODY_CHARS).collect();
        warn!(
            event = "upstream_error_response",
            request_id = %inbound.request_id,
            status = response.status.as_u16(),
            elapsed_ms = inbound.elapsed_ms(),
            body = %logged,
            is_html = text.trim_start().starts_with('<'),
            mask_errors = self.config.mask_errors
        );

        classify_error(
            response.status,
            response.headers,
            body,
            self.config.mask_errors,
        )
        .into_response()
    }

    /// Returns the client copy at once; the observer copy is decoded on a
    /// background task that cannot touch the client stream.
    fn relay_streamed(&self, inbound: InboundRequest, response: UpstreamHttpResponse) -> Response {
        let decoder = match ContentDecoder::for_headers(&response.headers) {
            Ok(decoder) => decoder,
            Err(err) => {
                warn!(
                    event = "observation_skipped",
                    request_id = %inbound.request_id,
                    error = %err
                );
                let rx = response.body.into_receiver();
                return streamed_response(response.status, &response.headers, rx);
            }
        };
        let TeeReceivers { client, observer } =
            tee(response.body.into_receiver(), self.records.tasks());
        spawn_observation(
            &self.records,
            observation(&inbound, response.status),
            observer,
            decoder,
        );
        streamed_response(response.status, &response.headers, client)
    }

    async fn relay_buffered(&self, inbound: InboundRequest, response: UpstreamHttpResponse) -> Response {
        let body = match response.body.collect().await {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    event = "upstream_failed",
                    request_id = %inbound.request_id,
                    status = response.status.as_u16(),
                    error = %err
                );
                return ProxyError::bad_gateway("upstream read failed").into_response();
            }
        };

        // Undecodable or unparseable replies are still relayed, just not recorded.
        match ContentDecoder::decode_all(&response.headers, &body) {
            Ok(plain) => {
                if let Ok(parsed) = serde_json::from_slice::<Value>(&plain) {
                    let record = observation(&inbound, response.status)
                        .into_record(ExchangeResponse::from_buffered(&parsed));
                    log_reconstructed(&record);
                    self.records.save_exchange(record);
                }
            }
            Err(err) => warn!(
                event = "observation_skipped",
                request_id = %inbound.request_id,
                error = %err
            ),
        }

        buffered_response(response.status, &response.headers, body)
    }
}

fn observation(inbound: &InboundRequest, status: StatusCode) -> Observation {
    Observation {
        request_id: inbound.request_id.clone(),
        started_at: inbound.started_at,
        status: status.as_u16(),
        request: inbound
            .body
            .as_object()
            .map(EchoedRequest::from_body)
            .unwrap_or_default(),
    }
}
