use std::time::Duration;

/// Errors surfaced by the transport collaborator at upload completion.
/// Cancellation is a distinguished sub-kind: the router classifies it as a
/// `Cancelled` event rather than a `Failed` one.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
