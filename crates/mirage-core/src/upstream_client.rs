use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{Method, StatusCode};
use tokio::sync::mpsc;
use wreq::redirect::Policy;
use wreq::{Client, Proxy};

use mirage_common::{Headers, RelayConfig};

/// One read from an upstream body. An `Err` is always the last item.
pub type UpstreamChunk = Result<Bytes, UpstreamFailure>;

const BODY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct UpstreamHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    /// Single-use chunk stream fed by one reader task.
    Stream(mpsc::Receiver<UpstreamChunk>),
}

impl UpstreamBody {
    pub async fn collect(self) -> Result<Bytes, UpstreamFailure> {
        match self {
            UpstreamBody::Bytes(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut rx) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Chunk-stream view of either body form.
    pub fn into_receiver(self) -> mpsc::Receiver<UpstreamChunk> {
        match self {
            UpstreamBody::Stream(rx) => rx,
            UpstreamBody::Bytes(bytes) => {
                let (tx, rx) = mpsc::channel(1);
                if !bytes.is_empty() {
                    // Capacity 1 and a fresh channel: cannot be full.
                    let _ = tx.try_send(Ok(bytes));
                }
                rx
            }
        }
    }
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("upstream transport error ({kind:?}): {message}")]
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
}

impl UpstreamFailure {
    pub fn transport(kind: UpstreamTransportErrorKind, message: impl Into<String>) -> Self {
        UpstreamFailure::Transport {
            kind,
            message: message.into(),
        }
    }
}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            proxy: config.proxy.clone(),
            connect_timeout: config.connect_timeout(),
            stream_idle_timeout: config.idle_timeout(),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
            stream_idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Upstream client that never follows redirects and never decodes
/// content-encoding, so relayed bytes stay exactly as the upstream sent them.
#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: Client,
    stream_idle_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .read_timeout(config.stream_idle_timeout)
            .redirect(Policy::none());

        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let method = wreq::Method::from_bytes(req.method.as_str().as_bytes()).map_err(|_| {
                UpstreamFailure::transport(
                    UpstreamTransportErrorKind::Other,
                    format!("unsupported method {}", req.method),
                )
            })?;
            let mut builder = self.client.request(method, &req.url);

            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }

            if let Some(body) = req.body {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp, self.stream_idle_timeout).await
        })
    }
}

/// A 200 body is handed over as a live stream; anything else is buffered,
/// since the error classifier needs the whole body anyway.
async fn convert_response(
    resp: wreq::Response,
    stream_idle_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status =
        StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = headers_from_wreq(resp.headers());

    if status != StatusCode::OK {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = mpsc::channel::<UpstreamChunk>(BODY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let next = tokio::time::timeout(stream_idle_timeout, stream.next()).await;
            let item = match next {
                Ok(item) => item,
                Err(_) => {
                    let _ = tx
                        .send(Err(UpstreamFailure::transport(
                            UpstreamTransportErrorKind::ReadTimeout,
                            "upstream body idle timeout",
                        )))
                        .await;
                    break;
                }
            };
            let Some(item) = item else {
                break;
            };
            let chunk = item.map_err(map_wreq_error);
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (k, v) in map {
        if let Ok(s) = v.to_str() {
            out.push((k.as_str().to_string(), s.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let kind = classify_wreq_error(&err);
    UpstreamFailure::transport(kind, err.to_string())
}

fn classify_wreq_error(err: &wreq::Error) -> UpstreamTransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") || message.contains("idle") {
            return UpstreamTransportErrorKind::ReadTimeout;
        }
        return UpstreamTransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return UpstreamTransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return UpstreamTransportErrorKind::Tls;
        }
        return UpstreamTransportErrorKind::Connect;
    }
    if err.is_connection_reset() {
        return UpstreamTransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return UpstreamTransportErrorKind::Tls;
    }
    UpstreamTransportErrorKind::Other
}
