//! Provider abstraction for upstream generation APIs
//!
//! Defines the `Provider` trait that decouples dispatch logic from the HTTP
//! transport. HttpProvider posts JSON payloads to a configured endpoint with
//! per-request key injection; tests substitute scripted providers that fail
//! in controlled ways.

pub mod http;

pub use http::HttpProvider;

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Failure shape for a single provider call.
///
/// Carries the upstream HTTP status when one was received, plus the raw
/// error text. Classification into retry/rotate/abort strategies happens
/// downstream; this type only transports what the wire said.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallFailure {
    /// HTTP status from the upstream response, absent for transport-level
    /// failures (timeouts, refused connections, header construction).
    pub status: Option<u16>,
    /// Raw error text, used for classification and operator logs.
    pub message: String,
}

impl CallFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Health status reported by a provider for the /health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// Provider-specific details (e.g. the configured endpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Result alias for provider calls.
pub type Result<T> = std::result::Result<T, CallFailure>;

/// Abstraction over upstream generation APIs.
///
/// The dispatcher delegates the actual network call to the provider:
/// - `generate` performs one keyed call and resolves to the upstream JSON
/// - `health` reports provider-specific status for the health endpoint
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Provider>`).
pub trait Provider: Send + Sync {
    /// Identifier for logging and health reporting (e.g. "http", "scripted")
    fn id(&self) -> &str;

    /// Perform one generation call with the given API key.
    ///
    /// Resolves to the upstream response body on success. Rejects with a
    /// [`CallFailure`] carrying the HTTP status (when one was received) and
    /// the raw error text; the caller decides whether to retry, rotate keys,
    /// or abort based on that shape. Must not panic on malformed keys or
    /// unreachable endpoints.
    fn generate<'a>(
        &'a self,
        api_key: &'a str,
        payload: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Provider health for the /health endpoint.
    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>>;
}
