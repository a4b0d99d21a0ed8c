use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use bytes::Bytes;
use http::{Method, StatusCode};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mirage_common::{Headers, RelayConfig, header_set};
use mirage_protocol::HealthRecord;
use mirage_protocol::health::HEALTH_KEY_PREFIX;
use mirage_storage::SharedObjectStore;

use crate::core::CoreState;
use crate::record::RecordEmitter;
use crate::upstream_client::{UpstreamClient, UpstreamHttpRequest};

/// Newest health records served by the JSON endpoint.
pub const HEALTH_API_LIMIT: usize = 50;

/// Periodically sends one real streaming request upstream and stores the outcome.
#[derive(Clone)]
pub struct HealthChecker {
    config: Arc<RelayConfig>,
    client: Arc<dyn UpstreamClient>,
    records: RecordEmitter,
}

impl HealthChecker {
    pub fn new(
        config: Arc<RelayConfig>,
        client: Arc<dyn UpstreamClient>,
        records: RecordEmitter,
    ) -> Self {
        Self {
            config,
            client,
            records,
        }
    }

    /// `None` when no key is configured.
    pub fn request(&self) -> Option<UpstreamHttpRequest> {
        let key = self.config.health_check_key.as_deref()?;
        let mut headers: Headers = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
            ("authorization".to_string(), format!("Bearer {key}")),
        ];
        for (name, value) in &self.config.inject_headers {
            header_set(&mut headers, name.as_str(), value.as_str());
        }
        let body = json!({
            "model": self.config.health_check_model,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "Hello, who are you?"}]}
            ],
            "system": [{"type": "text", "text": "You are a helpful assistant."}],
            "tools": [],
            "metadata": {"user_id": "health-check"},
            "max_tokens": 1024,
            "stream": true
        });
        Some(UpstreamHttpRequest {
            method: Method::POST,
            url: self.config.target_url("/v1/messages"),
            headers,
            body: Some(Bytes::from(body.to_string())),
        })
    }

    /// Only the status matters; the reply body is dropped unread.
    pub async fn check(&self) -> Option<HealthRecord> {
        let request = self.request()?;
        let started = Instant::now();
        let outcome = self.client.send(request).await;
        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timestamp = OffsetDateTime::now_utc();
        let record = match outcome {
            Ok(response) => HealthRecord {
                ok: response.status == StatusCode::OK,
                status: response.status.as_u16(),
                error: None,
                latency,
                timestamp,
            },
            Err(err) => HealthRecord {
                ok: false,
                status: 0,
                error: Some(err.to_string()),
                latency,
                timestamp,
            },
        };
        info!(
            event = "health_check",
            ok = record.ok,
            status = record.status,
            latency_ms = record.latency,
            error = ?record.error
        );
        Some(record)
    }

    pub async fn check_and_save(&self) {
        if let Some(record) = self.check().await {
            self.records.save_health(record);
        }
    }

    /// Runs until `shutdown` fires. The first check happens one interval in.
    pub async fn run(self, shutdown: CancellationToken) {
        if self.config.health_check_key.is_none() {
            info!(event = "health_check_disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.config.health_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.check_and_save().await,
            }
        }
    }
}

pub async fn health_page() -> Html<&'static str> {
    Html(HEALTH_PAGE)
}

pub async fn health_api(State(state): State<Arc<CoreState>>) -> Result<Json<Vec<Value>>, StatusCode> {
    recent_health(&state.store, HEALTH_API_LIMIT)
        .await
        .map(Json)
        .map_err(|err| {
            warn!(event = "health_api_failed", error = %err);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Newest first. Unreadable entries are skipped.
pub async fn recent_health(
    store: &SharedObjectStore,
    limit: usize,
) -> mirage_storage::StorageResult<Vec<Value>> {
    let keys = store.list(HEALTH_KEY_PREFIX).await?;
    let mut out = Vec::with_capacity(limit.min(keys.len()));
    for key in keys.iter().rev().take(limit) {
        let Ok(Some(body)) = store.get(key).await else {
            continue;
        };
        if let Ok(value) = serde_json::from_slice::<Value>(&body) {
            out.push(value);
        }
    }
    Ok(out)
}

const HEALTH_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Upstream health</title>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>
    body { font-family: system-ui; max-width: 900px; margin: 0 auto; padding: 20px; background: #f5f5f5; }
    .summary { display: flex; gap: 20px; margin-bottom: 20px; }
    .card { background: white; padding: 20px; border-radius: 8px; flex: 1; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
    .ok { color: #22c55e; }
    .fail { color: #ef4444; }
    table { width: 100%; border-collapse: collapse; background: white; }
    th { background: #f8f9fa; text-align: left; padding: 12px; }
    td { padding: 12px; border-top: 1px solid #eee; }
  </style>
</head>
<body>
  <h1>Upstream health</h1>
  <div class="summary">
    <div class="card"><div>Current</div><div id="current" style="font-size: 24px;">-</div></div>
    <div class="card"><div>Uptime</div><div id="uptime" style="font-size: 24px;">-</div></div>
    <div class="card"><div>Avg latency</div><div id="latency" style="font-size: 24px;">-</div></div>
  </div>
  <table>
    <thead><tr><th>Time</th><th>Status</th><th>HTTP</th><th>Latency</th><th>Error</th></tr></thead>
    <tbody id="rows"></tbody>
  </table>
  <script>
    fetch('/health/api').then(r => r.json()).then(records => {
      if (!records.length) return;
      const ok = records.filter(r => r.ok).length;
      const current = document.getElementById('current');
      current.textContent = records[0].ok ? 'OK' : 'FAIL';
      current.className = records[0].ok ? 'ok' : 'fail';
      document.getElementById('uptime').textContent = (ok * 100 / records.length).toFixed(1) + '%';
      const avg = records.reduce((sum, r) => sum + r.latency, 0) / records.length;
      document.getElementById('latency').textContent = Math.round(avg) + ' ms';
      const rows = document.getElementById('rows');
      for (const r of records) {
        const tr = document.createElement('tr');
        for (const cell of [new Date(r.timestamp).toLocaleString(), r.ok ? 'OK' : 'FAIL', r.status, r.latency + ' ms', r.error || '']) {
          const td = document.createElement('td');
          td.textContent = cell;
          tr.appendChild(td);
        }
        rows.appendChild(tr);
      }
    });
  </script>
</body>
</html>
"#;
