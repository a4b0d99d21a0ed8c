pub mod error;
pub mod exchange;
pub mod health;
pub mod message;
pub mod sse;
pub mod stream;

pub use exchange::{ContentBlock, EchoedRequest, ExchangeRecord, ExchangeResponse, TokenUsage};
pub use health::HealthRecord;
pub use message::SyntheticMessage;
pub use sse::SseLineDecoder;
pub use stream::{ContentKind, StreamEvent};
