pub mod accumulate;
pub mod background;
pub mod classify;
pub mod core;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod forward;
pub mod handler;
pub mod health;
pub mod ingress;
pub mod observe;
pub mod probe;
pub mod record;
pub mod response;
pub mod tee;
pub mod upstream_client;

pub use background::BackgroundTasks;
pub use classify::{ErrorOutcome, classify_error};
pub use self::core::{Core, CoreState};
pub use dispatch::Dispatcher;
pub use encoding::{ContentDecoder, DecodeError};
pub use health::HealthChecker;
pub use ingress::{InboundRequest, RequestBody};
pub use probe::{PROBE_MARKER_HEADER, is_probe};
pub use record::RecordEmitter;
pub use upstream_client::{
    UpstreamBody, UpstreamChunk, UpstreamClient, UpstreamClientConfig, UpstreamFailure,
    UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind, WreqUpstreamClient,
};
