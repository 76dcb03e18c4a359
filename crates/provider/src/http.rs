//! HTTP provider: posts JSON payloads to a configured generation endpoint.
//!
//! One call = one POST with the API key injected as a request header. The
//! provider never inspects the payload; it shapes transport and status
//! failures into [`CallFailure`] values and leaves the retry decision to
//! the caller.

use crate::{CallFailure, Provider, ProviderHealth};
use reqwest::header::HeaderValue;
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Provider backed by a plain HTTP endpoint.
///
/// The client is built by the caller so connection timeouts and TLS settings
/// come from one place (service config).
pub struct HttpProvider {
    client: reqwest::Client,
    endpoint: String,
    key_header: String,
}

impl HttpProvider {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        key_header: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            key_header: key_header.into(),
        }
    }

    async fn call(
        &self,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> crate::Result<serde_json::Value> {
        let mut key_value = HeaderValue::from_str(api_key).map_err(|_| {
            warn!("api key rejected: not a valid header value");
            CallFailure::new(None, "invalid API key: not a valid header value")
        })?;
        // Keeps the key out of header Debug output.
        key_value.set_sensitive(true);

        let response = self
            .client
            .post(&self.endpoint)
            .header(&self.key_header, key_value)
            .json(payload)
            .send()
            .await
            .map_err(|e| shape_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(body) if !body.is_empty() => body,
                Ok(_) => format!("upstream returned status {status} with an empty body"),
                Err(e) => format!("upstream returned status {status}, body unreadable: {e}"),
            };
            return Err(CallFailure::new(Some(status.as_u16()), message));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| CallFailure::new(None, format!("invalid JSON from provider: {e}")))
    }
}

/// Timeouts and refused connections are outages, not request defects, so
/// their messages carry an "unavailable" marker the classifier picks up.
fn shape_transport_error(err: &reqwest::Error) -> CallFailure {
    if err.is_timeout() || err.is_connect() {
        CallFailure::new(None, format!("provider unavailable: {err}"))
    } else {
        CallFailure::new(None, err.to_string())
    }
}

impl Provider for HttpProvider {
    fn id(&self) -> &str {
        "http"
    }

    fn generate<'a>(
        &'a self,
        api_key: &'a str,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = crate::Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.call(api_key, payload))
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>> {
        Box::pin(async {
            ProviderHealth {
                status: "healthy".to_string(),
                detail: Some(serde_json::json!({ "endpoint": self.endpoint })),
            }
        })
    }
}
