use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::DONE_SENTINEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Thinking,
}

/// The subset of upstream stream events the observation path cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    MessageStart {
        input_tokens: u64,
    },
    ContentDelta {
        kind: ContentKind,
        text: String,
    },
    MessageDelta {
        stop_reason: Option<String>,
        output_tokens: u64,
    },
    Done,
}

impl StreamEvent {
    /// Decodes one `data:` payload.
    ///
    /// `Ok(None)` means the frame was well formed but carries nothing worth
    /// accumulating (pings, block starts/stops, signature deltas, ...).
    pub fn decode(payload: &str) -> Result<Option<Self>, serde_json::Error> {
        if payload == DONE_SENTINEL {
            return Ok(Some(StreamEvent::Done));
        }
        let wire: WireEvent = serde_json::from_str(payload)?;
        Ok(wire.into_event())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        #[serde(default)]
        message: Option<WireMessage>,
    },
    ContentBlockDelta {
        #[serde(default)]
        delta: Option<WireContentDelta>,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<WireMessageDelta>,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

/// Token counts are read loosely so an odd value never costs the whole frame.
#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Value,
    #[serde(default)]
    output_tokens: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentDelta {
    TextDelta {
        #[serde(default)]
        text: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Value,
}

/// Integers as-is, non-negative floats truncated, numeric strings parsed.
fn lenient_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Strings as-is; any other non-null value keeps its JSON text.
fn lenient_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

impl WireEvent {
    fn into_event(self) -> Option<StreamEvent> {
        match self {
            WireEvent::MessageStart { message } => Some(StreamEvent::MessageStart {
                input_tokens: message
                    .and_then(|message| message.usage)
                    .and_then(|usage| lenient_count(&usage.input_tokens))
                    .unwrap_or(0),
            }),
            WireEvent::ContentBlockDelta { delta } => match delta? {
                WireContentDelta::TextDelta { text } => Some(StreamEvent::ContentDelta {
                    kind: ContentKind::Text,
                    text,
                }),
                WireContentDelta::ThinkingDelta { thinking } => Some(StreamEvent::ContentDelta {
                    kind: ContentKind::Thinking,
                    text: thinking,
                }),
                WireContentDelta::Other => None,
            },
            WireEvent::MessageDelta { delta, usage } => Some(StreamEvent::MessageDelta {
                stop_reason: delta.and_then(|delta| lenient_text(delta.stop_reason)),
                output_tokens: usage
                    .and_then(|usage| lenient_count(&usage.output_tokens))
                    .unwrap_or(0),
            }),
            WireEvent::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_reads_nested_usage() {
        let event = StreamEvent::decode(
            r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":42,"output_tokens":1}}}"#,
        )
        .unwrap();
        assert_eq!(event, Some(StreamEvent::MessageStart { input_tokens: 42 }));
    }

    #[test]
    fn message_start_without_usage_defaults_to_zero() {
        let event = StreamEvent::decode(r#"{"type":"message_start","message":{}}"#).unwrap();
        assert_eq!(event, Some(StreamEvent::MessageStart { input_tokens: 0 }));
    }

    #[test]
    fn content_deltas_by_kind() {
        let text = StreamEvent::decode(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(
            text,
            Some(StreamEvent::ContentDelta {
                kind: ContentKind::Text,
                text: "hi".to_string()
            })
        );

        let thinking = StreamEvent::decode(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
        )
        .unwrap();
        assert_eq!(
            thinking,
            Some(StreamEvent::ContentDelta {
                kind: ContentKind::Thinking,
                text: "hmm".to_string()
            })
        );
    }

    #[test]
    fn other_deltas_are_ignored() {
        let event = StreamEvent::decode(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn message_delta_captures_stop_reason_and_output() {
        let event = StreamEvent::decode(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":17}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::MessageDelta {
                stop_reason: Some("end_turn".to_string()),
                output_tokens: 17
            })
        );

        let bare = StreamEvent::decode(r#"{"type":"message_delta"}"#).unwrap();
        assert_eq!(
            bare,
            Some(StreamEvent::MessageDelta {
                stop_reason: None,
                output_tokens: 0
            })
        );
    }

    #[test]
    fn odd_field_types_do_not_drop_the_frame() {
        let event = StreamEvent::decode(
            r#"{"type":"message_delta","delta":{"stop_reason":7},"usage":{"output_tokens":12.0}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::MessageDelta {
                stop_reason: Some("7".to_string()),
                output_tokens: 12
            })
        );

        let event = StreamEvent::decode(
            r#"{"type":"message_delta","delta":{"stop_reason":null},"usage":{"output_tokens":"9"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::MessageDelta {
                stop_reason: None,
                output_tokens: 9
            })
        );

        let start = StreamEvent::decode(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":-3}}}"#,
        )
        .unwrap();
        assert_eq!(start, Some(StreamEvent::MessageStart { input_tokens: 0 }));
    }

    #[test]
    fn done_sentinel_is_not_json() {
        assert_eq!(StreamEvent::decode("[DONE]").unwrap(), Some(StreamEvent::Done));
    }

    #[test]
    fn unknown_types_and_malformed_frames() {
        assert_eq!(StreamEvent::decode(r#"{"type":"ping"}"#).unwrap(), None);
        assert_eq!(
            StreamEvent::decode(r#"{"type":"content_block_stop","index":0}"#).unwrap(),
            None
        );
        assert!(StreamEvent::decode(r#"{"type":"content_block_delta","delta":"#).is_err());
        assert!(StreamEvent::decode("not json").is_err());
    }
}
