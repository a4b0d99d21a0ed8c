use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;
use time::OffsetDateTime;

use mirage_common::RelayConfig;
use mirage_core::{
    Core, UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
};
use mirage_protocol::HealthRecord;
use mirage_storage::{MemoryObjectStore, SharedObjectStore, put_json};

struct EchoPath;

impl UpstreamClient for EchoPath {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            Ok(UpstreamHttpResponse {
                status: StatusCode::OK,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body: UpstreamBody::Bytes(Bytes::from(req.url)),
            })
        })
    }
}

async fn serve(store: SharedObjectStore) -> String {
    let core = Core::new(Arc::new(RelayConfig::default()), Arc::new(EchoPath), store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, core.router()).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn unknown_paths_are_relayed() {
    let base = serve(Arc::new(MemoryObjectStore::new())).await;
    let client = wreq::Client::builder().build().unwrap();
    let resp = client
        .get(format!("{base}/v1/models?limit=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.bytes().await.unwrap(),
        Bytes::from_static(b"https://anyrouter.top/v1/models?limit=2")
    );
}

#[tokio::test]
async fn health_endpoints_are_served_locally() {
    let store: SharedObjectStore = Arc::new(MemoryObjectStore::new());
    for offset in 0..3i64 {
        let record = HealthRecord {
            ok: offset != 1,
            status: if offset == 1 { 0 } else { 200 },
            error: (offset == 1).then(|| "connect refused".to_string()),
            latency: 100 + offset as u64,
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000 + offset).unwrap(),
        };
        put_json(store.as_ref(), &record.storage_key(), &record)
            .await
            .unwrap();
    }
    let base = serve(store).await;
    let client = wreq::Client::builder().build().unwrap();

    let page = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(page.status().as_u16(), 200);
    let html = page.bytes().await.unwrap();
    assert!(String::from_utf8_lossy(&html).contains("/health/api"));

    let api = client.get(format!("{base}/health/api")).send().await.unwrap();
    let records: Vec<Value> = serde_json::from_slice(&api.bytes().await.unwrap()).unwrap();
    let latencies: Vec<u64> = records
        .iter()
        .map(|record| record["latency"].as_u64().unwrap())
        .collect();
    assert_eq!(latencies, vec![102, 101, 100]);
    assert_eq!(records[1]["error"], "connect refused");
}
