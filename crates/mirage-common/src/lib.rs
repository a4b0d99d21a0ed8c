pub mod config;
pub mod headers;

pub use config::{ConfigError, RelayConfig, RelayConfigPatch, DEFAULT_INJECT_HEADERS};
pub use headers::{Headers, header_get, header_remove, header_set};
