//! HTTP error responses
//!
//! Maps dispatch failures onto status codes and a stable JSON envelope:
//! {"error":{"type":"...","message":"...","request_id":"req_..."}}.
//! Clients branch on `error.type` rather than parsing the message text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::DispatchError;

/// Status code for a dispatch failure.
///
/// Quota exhaustion surfaces as 429 so callers can apply their own backoff.
/// Credential problems and unrecognized upstream failures are 502 (the
/// gateway is fine, the upstream relationship is not), while transient
/// conditions are 503 (retry later).
pub fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::InvalidCredentials => StatusCode::BAD_GATEWAY,
        DispatchError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        DispatchError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Fatal { .. } => StatusCode::BAD_GATEWAY,
        DispatchError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Build a JSON error response with the standard envelope.
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Map a dispatch failure to its HTTP response.
pub fn dispatch_error_response(error: &DispatchError, request_id: &str) -> Response {
    error_response(
        status_for(error),
        error.kind(),
        &error.to_string(),
        request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::CallFailure;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&DispatchError::MissingCredentials),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&DispatchError::InvalidCredentials),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DispatchError::QuotaExceeded),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&DispatchError::Unavailable {
                attempts: 4,
                source: CallFailure::new(Some(503), "service unavailable"),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&DispatchError::Fatal {
                source: CallFailure::new(Some(400), "bad request"),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DispatchError::Cancelled),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = dispatch_error_response(&DispatchError::QuotaExceeded, "req_test123");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert_eq!(content_type, "application/json");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "quota_exceeded");
        assert_eq!(body["error"]["request_id"], "req_test123");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("quota"),
            "message should describe the failure, got: {}",
            body["error"]["message"]
        );
    }

    #[tokio::test]
    async fn test_fatal_envelope_carries_upstream_message() {
        let error = DispatchError::Fatal {
            source: CallFailure::new(Some(400), "unsupported image format"),
        };
        let response = dispatch_error_response(&error, "req_abc");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], "upstream_error");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("unsupported image format"),
            "upstream detail must survive into the envelope"
        );
    }
}
