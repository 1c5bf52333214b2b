//! Errors raised by the generic transport contract.

use thiserror::Error;

use crate::core::{EndReason, FrameError};

/// Transport errors, surfaced by calls or as [`TransportEvent::Error`].
///
/// [`TransportEvent::Error`]: super::TransportEvent::Error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The relay stack is not initialized. Retry after initialization.
    #[error("relay client not initialized")]
    NotInitialized,

    /// `open` was called on a transport that is already open.
    #[error("transport already open")]
    AlreadyOpen,

    /// The transport has not been opened.
    #[error("transport not open")]
    NotOpen,

    /// The transport is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Framing failed; the frame was dropped.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The host ended the session on purpose.
    ///
    /// Callers must not attempt a disconnect handshake on this session.
    #[error("connection closed by host")]
    Graceful,

    /// The connection was lost.
    #[error("peer disconnected: {description} ({code}): {reason}")]
    Abnormal {
        /// Full relay report (status, address, identity).
        reason: String,
        /// Raw relay end code.
        code: i32,
        /// Short description of the end reason.
        description: String,
    },
}

impl TransportError {
    /// Build the disconnect error matching a relay end reason.
    pub fn from_disconnect(end_reason: EndReason, report: impl Into<String>) -> Self {
        if end_reason.is_graceful() {
            TransportError::Graceful
        } else {
            TransportError::Abnormal {
                reason: report.into(),
                code: end_reason.code(),
                description: end_reason.description(),
            }
        }
    }

    /// Whether reconnecting may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::NotInitialized | TransportError::Abnormal { .. }
        )
    }

    /// Whether the host ended the session on purpose.
    pub fn is_graceful(&self) -> bool {
        matches!(self, TransportError::Graceful)
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let err = TransportError::from_disconnect(EndReason::AppClosed, "bye");
        assert!(err.is_graceful());
        assert!(!err.is_retryable());

        let err = TransportError::from_disconnect(EndReason::Timeout, "route lost");
        assert!(!err.is_graceful());
        assert!(err.is_retryable());
        assert_eq!(
            err,
            TransportError::Abnormal {
                reason: "route lost".into(),
                code: EndReason::TIMEOUT_CODE,
                description: "Timeout".into(),
            }
        );
    }

    #[test]
    fn test_abnormal_message_preserves_reason() {
        let err = TransportError::from_disconnect(EndReason::Generic, "Address: 10.0.0.1:27015");
        assert_eq!(
            err.to_string(),
            "peer disconnected: Generic Connection Error (5001): Address: 10.0.0.1:27015"
        );
    }

    #[test]
    fn test_closed_is_not_retryable() {
        assert!(!TransportError::ConnectionClosed.is_retryable());
        assert!(TransportError::NotInitialized.is_retryable());
    }
}
