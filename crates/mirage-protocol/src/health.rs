use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const HEALTH_KEY_PREFIX: &str = "health/";

/// Outcome of one periodic upstream probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub ok: bool,
    /// `0` when the upstream could not be reached at all.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub latency: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HealthRecord {
    pub fn storage_key(&self) -> String {
        let stamp = self
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string());
        format!("{HEALTH_KEY_PREFIX}{stamp}.json")
    }
}
