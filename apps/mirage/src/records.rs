use anyhow::{Context, bail};
use mirage_storage::ObjectStore;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cli::RecordsCommand;

/// Headers a replayed request always needs; credentials are never stored.
const REPLAY_HEADERS: &[(&str, &str)] = &[
    ("content-type", "application/json"),
    ("anthropic-version", "2023-06-01"),
    ("x-api-key", "$ANTHROPIC_API_KEY"),
];

/// Non-JSON replay bodies are cut to this many characters.
const REPLAY_BODY_CHARS: usize = 2000;

pub(crate) async fn run(store: &dyn ObjectStore, action: RecordsCommand) -> anyhow::Result<()> {
    match action {
        RecordsCommand::List { prefix, limit } => {
            let keys = list_newest(store, &prefix, limit).await?;
            if keys.is_empty() {
                println!("no records under {prefix:?}");
            }
            for key in keys {
                println!("{key}");
            }
        }
        RecordsCommand::Get { key } => {
            let record = load(store, &key).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        RecordsCommand::Curl { key, base_url } => {
            let record = load(store, &key).await?;
            println!("{}", curl_command(&record, &base_url)?);
        }
        RecordsCommand::Replay {
            key,
            base_url,
            api_key,
        } => {
            let record = load(store, &key).await?;
            let replayed = replay(&record, &base_url, api_key.as_deref()).await?;
            println!("status: {}", replayed.status);
            for (name, value) in &replayed.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", replayed.body);
        }
    }
    Ok(())
}

pub(crate) async fn list_newest(
    store: &dyn ObjectStore,
    prefix: &str,
    limit: usize,
) -> anyhow::Result<Vec<String>> {
    let keys = store
        .list(prefix)
        .await
        .with_context(|| format!("list {prefix}"))?;

    // Keys only order by their directory (the date); inside one directory the
    // records' own timestamps decide.
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for key in keys {
        let dir = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("").to_string();
        match groups.last_mut() {
            Some((last, members)) if *last == dir => members.push(key),
            _ => groups.push((dir, vec![key])),
        }
    }

    let mut out = Vec::with_capacity(limit);
    for (_, members) in groups.into_iter().rev() {
        if out.len() >= limit {
            break;
        }
        let mut stamped = Vec::with_capacity(members.len());
        for key in members {
            stamped.push((record_timestamp(store, &key).await, key));
        }
        stamped.sort_by(|a, b| b.cmp(a));
        out.extend(stamped.into_iter().map(|(_, key)| key));
    }
    out.truncate(limit);
    Ok(out)
}

/// `None` for records that cannot be read or carry no RFC 3339 timestamp.
async fn record_timestamp(store: &dyn ObjectStore, key: &str) -> Option<OffsetDateTime> {
    let body = store.get(key).await.ok()??;
    let value: Value = serde_json::from_slice(&body).ok()?;
    OffsetDateTime::parse(value.get("timestamp")?.as_str()?, &Rfc3339).ok()
}

async fn load(store: &dyn ObjectStore, key: &str) -> anyhow::Result<Value> {
    let Some(body) = store.get(key).await.with_context(|| format!("read {key}"))? else {
        bail!("no record at {key}");
    };
    serde_json::from_slice(&body).with_context(|| format!("parse {key}"))
}

fn echoed_request(record: &Value) -> anyhow::Result<&Value> {
    match record.get("request").filter(|value| value.is_object()) {
        Some(request) => Ok(request),
        None => bail!("record has no request object"),
    }
}

fn messages_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

/// Replays the echoed request fields against `{base_url}/v1/messages`.
pub(crate) fn curl_command(record: &Value, base_url: &str) -> anyhow::Result<String> {
    let request = echoed_request(record)?;
    let url = messages_url(base_url);
    let mut out = format!("curl -X POST {}", shell_quote(&url));
    for (name, value) in REPLAY_HEADERS {
        // The key placeholder must stay expandable by the shell.
        if value.starts_with('$') {
            out.push_str(&format!(" \\\n  -H \"{name}: {value}\""));
        } else {
            out.push_str(&format!(" \\\n  -H {}", shell_quote(&format!("{name}: {value}"))));
        }
    }
    out.push_str(&format!(" \\\n  -d {}", shell_quote(&request.to_string())));
    Ok(out)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub(crate) struct Replayed {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    /// Pretty JSON, or the first characters of anything else.
    pub(crate) body: String,
}

/// Sends the echoed request to `{base_url}/v1/messages` and captures the reply.
pub(crate) async fn replay(
    record: &Value,
    base_url: &str,
    api_key: Option<&str>,
) -> anyhow::Result<Replayed> {
    let request = echoed_request(record)?;
    let url = messages_url(base_url);
    let client = wreq::Client::builder()
        .build()
        .context("build replay client")?;

    let mut builder = client.post(url.as_str());
    for (name, value) in REPLAY_HEADERS {
        if value.starts_with('$') {
            if let Some(key) = api_key {
                builder = builder.header(*name, key);
            }
        } else {
            builder = builder.header(*name, *value);
        }
    }
    let resp = builder
        .body(request.to_string())
        .send()
        .await
        .with_context(|| format!("send to {url}"))?;

    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = resp.bytes().await.context("read replay response")?;
    Ok(Replayed {
        status,
        headers,
        body: render_body(&body),
    })
}

fn render_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(_) => String::from_utf8_lossy(body)
            .chars()
            .take(REPLAY_BODY_CHARS)
            .collect(),
    }
}
