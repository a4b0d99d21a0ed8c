use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250514";
pub const GREETING: &str = "Hi! How can I help you today?";
pub const CANNED_INPUT_TOKENS: u64 = 8;
pub const CANNED_OUTPUT_TOKENS: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub r#type: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A complete, non-streamed message body in the upstream's response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub role: String,
    pub content: Vec<TextBlock>,
    pub model: String,
    pub stop_reason: String,
    /// Always serialized, as `null`.
    pub stop_sequence: Option<String>,
    pub usage: MessageUsage,
}

impl SyntheticMessage {
    pub fn greeting(id: impl Into<String>, model: Option<&str>) -> Self {
        Self {
            id: id.into(),
            r#type: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![TextBlock {
                r#type: "text".to_string(),
                text: GREETING.to_string(),
            }],
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            stop_reason: "end_turn".to_string(),
            stop_sequence: None,
            usage: MessageUsage {
                input_tokens: CANNED_INPUT_TOKENS,
                output_tokens: CANNED_OUTPUT_TOKENS,
            },
        }
    }
}
