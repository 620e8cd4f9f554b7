//! Error types for gatewire.

use thiserror::Error;

use crate::error_info::ErrorInfo;

/// Main error type for all gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration files only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Framing error (short envelope, bad length prefix, oversized frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound envelope names a wire id nobody registered.
    ///
    /// The request context is kept so the caller can still log or reply.
    #[error("message id {id} not registered (context {context})")]
    UnknownMessageId { context: u32, id: u32 },

    /// Raw payload routed under an id nobody registered.
    #[error("message id {0} not registered")]
    UnregisteredId(u32),

    /// Outbound or routed message has a shape nobody registered.
    #[error("message {0} not registered")]
    UnregisteredShape(&'static str),

    /// A typed handler was handed a message of another shape.
    #[error("handler expected message {expected}")]
    ShapeMismatch { expected: &'static str },

    /// Application error raised by handler logic.
    #[error(transparent)]
    Application(#[from] ErrorInfo),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Pending write queue stayed full for the whole write timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// External router worker went away before answering.
    #[error("Router closed")]
    RouterClosed,

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid gateway configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Request context carried by the error, if any.
    pub fn context(&self) -> Option<u32> {
        match self {
            GatewayError::UnknownMessageId { context, .. } => Some(*context),
            _ => None,
        }
    }

    /// Application error carried by the error, if any.
    pub fn as_application(&self) -> Option<&ErrorInfo> {
        match self {
            GatewayError::Application(info) => Some(info),
            _ => None,
        }
    }

    /// Whether a failed reply means the session can no longer write.
    pub fn is_write_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionClosed | GatewayError::BackpressureTimeout
        )
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_id_keeps_context() {
        let err = GatewayError::UnknownMessageId { context: 7, id: 99 };
        assert_eq!(err.context(), Some(7));
        assert!(err.to_string().contains("99"));
        assert_eq!(GatewayError::ConnectionClosed.context(), None);
    }

    #[test]
    fn test_application_error_is_transparent() {
        let info = ErrorInfo::new(3, "no gold");
        let err: GatewayError = info.clone().into();
        assert_eq!(err.to_string(), info.to_string());
        assert_eq!(err.as_application(), Some(&info));
    }

    #[test]
    fn test_write_fatal_errors() {
        assert!(GatewayError::ConnectionClosed.is_write_fatal());
        assert!(GatewayError::BackpressureTimeout.is_write_fatal());
        assert!(!GatewayError::UnregisteredShape("Pong").is_write_fatal());
    }
}
