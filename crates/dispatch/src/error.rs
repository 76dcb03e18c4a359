//! Error types for dispatch outcomes

use provider::CallFailure;

/// Terminal outcome of a failed dispatch.
///
/// Every variant means the dispatcher is done: the pool, the retry budget,
/// or the caller's patience ran out. Transient failures never surface here;
/// they are rotated or retried away inside the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no API keys configured")]
    MissingCredentials,

    #[error("all API keys were rejected as invalid")]
    InvalidCredentials,

    #[error("quota exhausted across all keys and retries")]
    QuotaExceeded,

    #[error("provider unavailable after {attempts} attempts: {source}")]
    Unavailable { attempts: u32, source: CallFailure },

    #[error("provider call failed: {source}")]
    Fatal { source: CallFailure },

    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Stable label for metrics and error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::MissingCredentials => "missing_credentials",
            DispatchError::InvalidCredentials => "invalid_credentials",
            DispatchError::QuotaExceeded => "quota_exceeded",
            DispatchError::Unavailable { .. } => "provider_unavailable",
            DispatchError::Fatal { .. } => "upstream_error",
            DispatchError::Cancelled => "cancelled",
        }
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
