use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::headers::Headers;

/// Header bundle written over every forwarded request so it resembles the
/// official CLI client.
pub const DEFAULT_INJECT_HEADERS: &[(&str, &str)] = &[
    ("user-agent", "claude-cli/2.0.76 (external, cli)"),
    ("anthropic-version", "2023-06-01"),
    (
        "anthropic-beta",
        "claude-code-20250219,interleaved-thinking-2025-05-14,context-management-2025-06-27",
    ),
    ("anthropic-dangerous-direct-browser-access", "true"),
    ("x-app", "cli"),
    ("x-stainless-arch", "arm64"),
    ("x-stainless-os", "MacOS"),
    ("x-stainless-lang", "js"),
    ("x-stainless-runtime", "node"),
    ("x-stainless-runtime-version", "v24.3.0"),
    ("x-stainless-package-version", "0.70.0"),
    ("x-stainless-helper-method", "stream"),
    ("x-stainless-timeout", "600"),
    ("x-stainless-retry-count", "0"),
];

pub const DEFAULT_TARGET_HOST: &str = "anyrouter.top";
pub const DEFAULT_HEALTH_CHECK_MODEL: &str = "claude-opus-4-5-20251101";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Final, merged configuration used by the running process.
///
/// Built once at startup and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Upstream hostname every genuine request is forwarded to.
    pub target_host: String,
    pub target_scheme: String,
    /// Replace non-500 upstream errors with a generic 429.
    pub mask_errors: bool,
    pub inject_headers: Headers,
    pub probe_delay_min_ms: u64,
    pub probe_delay_max_ms: u64,
    /// Root directory of the filesystem object store.
    pub data_dir: String,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    /// Periodic health checks run only when a key is configured.
    pub health_check_key: Option<String>,
    pub health_check_interval_secs: u64,
    pub health_check_model: String,
    pub connect_timeout_secs: u64,
    /// Longest gap tolerated between two upstream body chunks.
    pub idle_timeout_secs: u64,
    /// How long shutdown waits for in-flight background work.
    pub drain_timeout_secs: u64,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// `{scheme}://{target_host}{path_and_query}`
    pub fn target_url(&self, path_and_query: &str) -> String {
        let path = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        format!("{}://{}{}", self.target_scheme, self.target_host, path)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        // A patch with no layers applied always resolves.
        RelayConfigPatch::default().resolve()
    }
}

/// Optional layer used for merging config sources.
///
/// Merge order: defaults < file < env < CLI (clap folds env into the CLI layer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub target_host: Option<String>,
    pub target_scheme: Option<String>,
    pub mask_errors: Option<bool>,
    pub inject_headers: Option<BTreeMap<String, String>>,
    pub probe_delay_min_ms: Option<u64>,
    pub probe_delay_max_ms: Option<u64>,
    pub data_dir: Option<String>,
    pub proxy: Option<String>,
    pub health_check_key: Option<String>,
    pub health_check_interval_secs: Option<u64>,
    pub health_check_model: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
}

macro_rules! overlay_fields {
    ($target:ident, $other:ident; $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $target.$field = $other.$field;
            }
        )+
    };
}

impl RelayConfigPatch {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn overlay(&mut self, other: RelayConfigPatch) {
        overlay_fields!(self, other;
            host,
            port,
            target_host,
            target_scheme,
            mask_errors,
            inject_headers,
            probe_delay_min_ms,
            probe_delay_max_ms,
            data_dir,
            proxy,
            health_check_key,
            health_check_interval_secs,
            health_check_model,
            connect_timeout_secs,
            idle_timeout_secs,
            drain_timeout_secs,
        );
    }

    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let config = self.resolve();
        if config.target_host.trim().is_empty() {
            return Err(ConfigError::MissingField("target_host"));
        }
        if config.target_host.contains('/') {
            return Err(ConfigError::Invalid {
                field: "target_host",
                reason: "expected a bare hostname".to_string(),
            });
        }
        if !matches!(config.target_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "target_scheme",
                reason: format!("unsupported scheme {:?}", config.target_scheme),
            });
        }
        if config.probe_delay_min_ms > config.probe_delay_max_ms {
            return Err(ConfigError::Invalid {
                field: "probe_delay_min_ms",
                reason: "must not exceed probe_delay_max_ms".to_string(),
            });
        }
        if config.health_check_key.is_some() && config.health_check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "health_check_interval_secs",
                reason: "must be positive when health checks are enabled".to_string(),
            });
        }
        Ok(config)
    }

    fn resolve(self) -> RelayConfig {
        let inject_headers = match self.inject_headers {
            Some(map) => map.into_iter().collect(),
            None => DEFAULT_INJECT_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        RelayConfig {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8787),
            target_host: self
                .target_host
                .unwrap_or_else(|| DEFAULT_TARGET_HOST.to_string()),
            target_scheme: self.target_scheme.unwrap_or_else(|| "https".to_string()),
            mask_errors: self.mask_errors.unwrap_or(false),
            inject_headers,
            probe_delay_min_ms: self.probe_delay_min_ms.unwrap_or(2000),
            probe_delay_max_ms: self.probe_delay_max_ms.unwrap_or(4000),
            data_dir: self.data_dir.unwrap_or_else(|| "./data".to_string()),
            proxy: self
                .proxy
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            health_check_key: self
                .health_check_key
                .filter(|value| !value.trim().is_empty()),
            health_check_interval_secs: self.health_check_interval_secs.unwrap_or(300),
            health_check_model: self
                .health_check_model
                .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_MODEL.to_string()),
            connect_timeout_secs: self.connect_timeout_secs.unwrap_or(5),
            idle_timeout_secs: self.idle_timeout_secs.unwrap_or(300),
            drain_timeout_secs: self.drain_timeout_secs.unwrap_or(30),
        }
    }
}
