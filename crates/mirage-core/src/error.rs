use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::StatusCode;

/// Failure answered by the relay itself, before or instead of an upstream reply.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    /// The upstream could not be reached or its body could not be read.
    pub fn bad_gateway(message: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: message.into(),
        }
    }

    pub fn internal(message: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: message.into(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from(self.body));
        *resp.status_mut() = self.status;
        resp
    }
}
