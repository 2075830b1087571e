//! Request correlation ids and failure logging.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 64;

/// Correlation id for one API call, stored in request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Accepts a caller-supplied id of at most 64 characters from `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_REQUEST_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Failure details left on an error response for the middleware to log.
#[derive(Clone, Debug)]
pub struct FailedRequest {
    pub code: &'static str,
    pub message: String,
}

/// Tags the request span with its id, echoes the id on the response and logs
/// failed analytics calls under it.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::parse)
        .unwrap_or_else(RequestId::generate);

    tracing::Span::current().record("request_id", id.as_str());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;

    if let Some(failed) = response.extensions_mut().remove::<FailedRequest>() {
        let status = response.status().as_u16();
        if response.status().is_server_error() {
            tracing::error!(
                request_id = id.as_str(),
                status,
                code = failed.code,
                "{}",
                failed.message
            );
        } else {
            tracing::warn!(
                request_id = id.as_str(),
                status,
                code = failed.code,
                "{}",
                failed.message
            );
        }
    }

    if let Ok(val) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_token_ids() {
        assert_eq!(RequestId::parse(" req-42 ").unwrap().as_str(), "req-42");
        assert!(RequestId::parse("a1b2.c3_d4").is_some());
    }

    #[test]
    fn test_parse_rejects_unsafe_ids() {
        assert!(RequestId::parse("").is_none());
        assert!(RequestId::parse("has space").is_none());
        assert!(RequestId::parse("line\nbreak").is_none());
        assert!(RequestId::parse(&"x".repeat(65)).is_none());
    }

    #[test]
    fn test_generated_ids_are_uuids() {
        let id = RequestId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }
}
