use std::time::Instant;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use mirage_protocol::{EchoedRequest, ExchangeRecord, ExchangeResponse};

use crate::accumulate::ContentAccumulator;
use crate::encoding::{ContentDecoder, DecodeError};
use crate::record::RecordEmitter;
use crate::upstream_client::{UpstreamChunk, UpstreamFailure};

/// What the observation path needs to know about the request it follows.
#[derive(Debug, Clone)]
pub struct Observation {
    pub request_id: String,
    pub started_at: Instant,
    pub status: u16,
    pub request: EchoedRequest,
}

impl Observation {
    pub fn into_record(self, response: ExchangeResponse) -> ExchangeRecord {
        ExchangeRecord {
            request_id: self.request_id,
            timestamp: OffsetDateTime::now_utc(),
            latency: u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            status: self.status,
            request: self.request,
            response,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    #[error(transparent)]
    Upstream(#[from] UpstreamFailure),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Reads the observer copy to its end and rebuilds the message.
///
/// A failed upstream read abandons the reconstruction; a partial record
/// would misstate what the caller received.
pub async fn reconstruct_stream(
    mut rx: mpsc::UnboundedReceiver<UpstreamChunk>,
    mut decoder: ContentDecoder,
) -> Result<ExchangeResponse, ObservationError> {
    let mut acc = ContentAccumulator::new();
    while let Some(chunk) = rx.recv().await {
        acc.push_chunk(&decoder.push(&chunk?)?);
    }
    acc.push_chunk(&decoder.finish()?);
    Ok(acc.finish())
}

/// Runs the observation path on a tracked background task.
pub fn spawn_observation(
    records: &RecordEmitter,
    observation: Observation,
    rx: mpsc::UnboundedReceiver<UpstreamChunk>,
    decoder: ContentDecoder,
) {
    let records = records.clone();
    let tasks = records.tasks().clone();
    tasks.spawn(async move {
        match reconstruct_stream(rx, decoder).await {
            Ok(response) => {
                let record = observation.into_record(response);
                log_reconstructed(&record);
                records.save_exchange(record);
            }
            Err(err) => warn!(
                event = "observation_failed",
                request_id = %observation.request_id,
                error = %err
            ),
        }
    });
}

pub fn log_reconstructed(record: &ExchangeRecord) {
    let (stop_reason, input_tokens, output_tokens) = match &record.response {
        ExchangeResponse::Streamed {
            stop_reason, usage, ..
        } => (
            stop_reason.clone(),
            Some(usage.input_tokens),
            Some(usage.output_tokens),
        ),
        ExchangeResponse::Buffered {
            stop_reason, usage, ..
        } => (
            stop_reason
                .as_ref()
                .and_then(|value| value.as_str())
                .map(str::to_string),
            usage
                .as_ref()
                .and_then(|usage| usage.get("input_tokens"))
                .and_then(|value| value.as_u64()),
            usage
                .as_ref()
                .and_then(|usage| usage.get("output_tokens"))
                .and_then(|value| value.as_u64()),
        ),
    };
    info!(
        event = "exchange_reconstructed",
        request_id = %record.request_id,
        status = record.status,
        elapsed_ms = record.latency,
        stop_reason = ?stop_reason,
        input_tokens = ?input_tokens,
        output_tokens = ?output_tokens
    );
}
