use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub const EXCHANGE_KEY_PREFIX: &str = "logs/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Thinking { thinking: String },
    Text { text: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Request fields copied verbatim from the caller's JSON body.
///
/// Absent fields stay absent in the stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoedRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub messages: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub system: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_tokens: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stream: Option<Value>,
}

impl EchoedRequest {
    pub fn from_body(body: &Map<String, Value>) -> Self {
        let field = |name: &str| body.get(name).cloned();
        Self {
            model: field("model"),
            messages: field("messages"),
            system: field("system"),
            max_tokens: field("max_tokens"),
            temperature: field("temperature"),
            thinking: field("thinking"),
            tools: field("tools"),
            metadata: field("metadata"),
            stream: field("stream"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExchangeResponse {
    /// Rebuilt from the event stream.
    Streamed {
        content: Vec<ContentBlock>,
        stop_reason: Option<String>,
        usage: TokenUsage,
    },
    /// Lifted from a buffered JSON body as-is.
    Buffered {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        content: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        stop_reason: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        usage: Option<Value>,
    },
}

impl ExchangeResponse {
    pub fn from_buffered(body: &Value) -> Self {
        ExchangeResponse::Buffered {
            content: body.get("content").cloned(),
            stop_reason: body.get("stop_reason").cloned(),
            usage: body.get("usage").cloned(),
        }
    }
}

/// One genuine request/response pair, as handed to the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub request_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Milliseconds from request entry to record completion.
    pub latency: u64,
    pub status: u16,
    pub request: EchoedRequest,
    pub response: ExchangeResponse,
}

impl ExchangeRecord {
    /// `logs/{YYYY-MM-DD}/{request_id}.json`
    pub fn storage_key(&self) -> String {
        let date = self.timestamp.date();
        format!(
            "{EXCHANGE_KEY_PREFIX}{:04}-{:02}-{:02}/{}.json",
            date.year(),
            u8::from(date.month()),
            date.day(),
            self.request_id
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(response: ExchangeResponse) -> ExchangeRecord {
        let body = json!({"model": "m", "messages": [], "stream": true});
        ExchangeRecord {
            request_id: "req-1".to_string(),
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            latency: 5,
            status: 200,
            request: EchoedRequest::from_body(body.as_object().unwrap()),
            response,
        }
    }

    #[test]
    fn storage_key_is_dated() {
        let record = record(ExchangeResponse::from_buffered(&json!({})));
        assert_eq!(record.storage_key(), "logs/2023-11-14/req-1.json");
    }

    #[test]
    fn streamed_record_shape() {
        let record = record(ExchangeResponse::Streamed {
            content: vec![
                ContentBlock::Thinking {
                    thinking: "ac".to_string(),
                },
                ContentBlock::Text {
                    text: "bd".to_string(),
                },
            ],
            stop_reason: None,
            usage: TokenUsage {
                input_tokens: 3,
                output_tokens: 4,
            },
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value["request"],
            json!({"model": "m", "messages": [], "stream": true})
        );
        assert_eq!(
            value["response"],
            json!({
                "content": [
                    {"type": "thinking", "thinking": "ac"},
                    {"type": "text", "text": "bd"}
                ],
                "stop_reason": null,
                "usage": {"input_tokens": 3, "output_tokens": 4}
            })
        );
    }

    #[test]
    fn buffered_record_lifts_fields_verbatim() {
        let upstream = json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": "yo"}],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 1, "output_tokens": 2, "cache_read_input_tokens": 0}
        });
        let value = serde_json::to_value(ExchangeResponse::from_buffered(&upstream)).unwrap();
        assert_eq!(value["content"], upstream["content"]);
        assert_eq!(value["stop_reason"], "max_tokens");
        assert_eq!(value["usage"], upstream["usage"]);
        assert!(value.get("id").is_none());
    }
}
