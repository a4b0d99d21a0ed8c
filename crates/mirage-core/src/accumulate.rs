use bytes::Bytes;
use tracing::debug;

use mirage_protocol::{
    ContentBlock, ContentKind, ExchangeResponse, SseLineDecoder, StreamEvent, TokenUsage,
};

/// Folds a streamed reply back into one message.
///
/// All fragments of one kind are concatenated in arrival order; the finished
/// content always lists thinking before text, whatever the interleaving.
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    decoder: SseLineDecoder,
    thinking: String,
    text: String,
    input_tokens: u64,
    output_tokens: u64,
    stop_reason: Option<String>,
    skipped_frames: usize,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &Bytes) {
        for payload in self.decoder.push_bytes(chunk) {
            self.apply_payload(&payload);
        }
    }

    /// Malformed frames are counted and skipped; decoding carries on.
    pub fn apply_payload(&mut self, payload: &str) {
        match StreamEvent::decode(payload) {
            Ok(Some(event)) => self.apply(event),
            Ok(None) => {}
            Err(err) => {
                self.skipped_frames += 1;
                debug!(event = "sse_frame_skipped", error = %err);
            }
        }
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::MessageStart { input_tokens } => self.input_tokens = input_tokens,
            StreamEvent::ContentDelta { kind, text } => match kind {
                ContentKind::Thinking => self.thinking.push_str(&text),
                ContentKind::Text => self.text.push_str(&text),
            },
            // Last one wins, absent fields included.
            StreamEvent::MessageDelta {
                stop_reason,
                output_tokens,
            } => {
                self.stop_reason = stop_reason;
                self.output_tokens = output_tokens;
            }
            StreamEvent::Done => {}
        }
    }

    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    pub fn finish(mut self) -> ExchangeResponse {
        for payload in self.decoder.finish() {
            self.apply_payload(&payload);
        }

        let mut content = Vec::with_capacity(2);
        if !self.thinking.is_empty() {
            content.push(ContentBlock::Thinking {
                thinking: self.thinking,
            });
        }
        if !self.text.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        ExchangeResponse::Streamed {
            content,
            stop_reason: self.stop_reason,
            usage: TokenUsage {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
            },
        }
    }
}
