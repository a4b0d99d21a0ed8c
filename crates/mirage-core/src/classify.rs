use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderValue, StatusCode};

use mirage_common::Headers;
use mirage_protocol::error::{ErrorResponse, ErrorType};

use crate::response::apply_upstream_headers;

pub const OPAQUE_AUTH_MESSAGE: &str = "Unauthorized access. This API endpoint is restricted to the Claude Code client; please use the official Claude Code CLI.";
pub const MASKED_RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const MASKED_RETRY_AFTER_SECS: u64 = 60;

/// What the caller sees for a non-200 upstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Upstream 500, whatever the mask setting.
    OpaqueAuth,
    MaskedRateLimit,
    Passthrough {
        status: StatusCode,
        headers: Headers,
        body: Bytes,
    },
}

pub fn classify_error(status: StatusCode, headers: Headers, body: Bytes, mask: bool) -> ErrorOutcome {
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        return ErrorOutcome::OpaqueAuth;
    }
    if mask {
        return ErrorOutcome::MaskedRateLimit;
    }
    ErrorOutcome::Passthrough {
        status,
        headers,
        body,
    }
}

impl ErrorOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorOutcome::OpaqueAuth => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorOutcome::MaskedRateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorOutcome::Passthrough { status, .. } => *status,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            ErrorOutcome::OpaqueAuth => json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(ErrorType::AuthenticationError, OPAQUE_AUTH_MESSAGE),
            ),
            ErrorOutcome::MaskedRateLimit => {
                let mut resp = json_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorResponse::new(ErrorType::RateLimitError, MASKED_RATE_LIMIT_MESSAGE),
                );
                resp.headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(MASKED_RETRY_AFTER_SECS));
                resp
            }
            ErrorOutcome::Passthrough {
                status,
                headers,
                body,
            } => {
                let mut resp = Response::new(Body::from(body));
                *resp.status_mut() = status;
                apply_upstream_headers(resp.headers_mut(), &headers);
                resp
            }
        }
    }
}

fn json_error(status: StatusCode, body: ErrorResponse) -> Response {
    // A two-string struct always serializes.
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::{Value, json};

    use super::*;

    fn upstream_headers() -> Headers {
        vec![
            ("content-type".to_string(), "text/html".to_string()),
            ("x-upstream".to_string(), "1".to_string()),
        ]
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upstream_500_is_always_opaque_auth() {
        for mask in [false, true] {
            let outcome = classify_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                upstream_headers(),
                Bytes::from_static(b"<html>boom</html>"),
                mask,
            );
            assert_eq!(outcome, ErrorOutcome::OpaqueAuth);
            let resp = outcome.into_response();
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(resp.headers().get("x-upstream").is_none());
            let body = body_json(resp).await;
            assert_eq!(body["type"], "error");
            assert_eq!(body["error"]["type"], "authentication_error");
        }
    }

    #[tokio::test]
    async fn masked_503_becomes_rate_limit() {
        let outcome = classify_error(
            StatusCode::SERVICE_UNAVAILABLE,
            upstream_headers(),
            Bytes::from_static(b"overloaded"),
            true,
        );
        assert_eq!(outcome.status(), StatusCode::TOO_MANY_REQUESTS);
        let resp = outcome.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[RETRY_AFTER], "60");
        assert_eq!(
            body_json(resp).await,
            json!({"type": "error", "error": {"type": "rate_limit_error", "message": MASKED_RATE_LIMIT_MESSAGE}})
        );
    }

    #[tokio::test]
    async fn unmasked_503_passes_through() {
        let outcome = classify_error(
            StatusCode::SERVICE_UNAVAILABLE,
            upstream_headers(),
            Bytes::from_static(b"overloaded"),
            false,
        );
        let resp = outcome.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()["x-upstream"], "1");
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/html");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"overloaded");
    }

    #[test]
    fn other_2xx_is_still_classified() {
        let outcome = classify_error(StatusCode::CREATED, Vec::new(), Bytes::new(), true);
        assert_eq!(outcome, ErrorOutcome::MaskedRateLimit);
    }
}
