use std::fmt::Display;

use crate::config::LogId;
use crate::SequenceNumber;

/// A specialized error type for tailer operations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TailerError {
    /// The log, topic, or subscription is not tracked.
    #[error("not found: {0}")]
    NotFound(String),
    /// An event did not line up with the reader position and was dropped.
    #[error("out of order on log {log}: expected {expected}, received {received}")]
    OutOfOrder {
        log: LogId,
        expected: SequenceNumber,
        received: SequenceNumber,
    },
    /// The forward queue is full; the caller must retry with the same message.
    #[error("no buffer space in forward queue")]
    NoBuffer,
    /// The topic could not be routed to a log.
    #[error("routing failed: {0}")]
    Routing(String),
    /// Operation attempted before `initialize`.
    #[error("tailer not initialized")]
    NotInitialized,
    /// Log storage rejected a request.
    #[error("storage error: {0}")]
    Storage(String),
    /// Internal error (invariant violation, lost channel, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TailerError {
    /// Create a not-found error from a displayable value.
    pub fn not_found<T: Display>(what: T) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Create a routing error from a displayable value.
    pub fn routing<T: Display>(msg: T) -> Self {
        Self::Routing(msg.to_string())
    }

    /// Create a storage error from a displayable value.
    pub fn storage<T: Display>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Create an internal error from a displayable value.
    pub fn internal<T: Display>(msg: T) -> Self {
        Self::Internal(msg.to_string())
    }
}

/// A Result type alias for tailer operations.
pub type TailerResult<T> = Result<T, TailerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_display_names_positions() {
        let err = TailerError::OutOfOrder {
            log: LogId::new(7),
            expected: 10,
            received: 12,
        };
        assert_eq!(
            err.to_string(),
            "out of order on log 7: expected 10, received 12"
        );
    }

    #[test]
    fn helper_constructors() {
        assert!(matches!(
            TailerError::not_found("log 3"),
            TailerError::NotFound(msg) if msg == "log 3"
        ));
    }
}
