//! AMQP worker error types.

use messaging::ErrorCategory;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the broker plumbing.
#[derive(Debug, Error)]
pub enum AmqpError {
    /// Broker unreachable or credentials rejected
    #[error("connection error: {0}")]
    Connection(String),

    #[error("channel error: {0}")]
    Channel(String),

    /// Declaration conflicts with an existing exchange or queue
    #[error("topology error: {0}")]
    Topology(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("consumer error: {0}")]
    Consumer(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not connected to broker")]
    NotConnected,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid lifecycle state: {0}")]
    InvalidState(String),
}

impl AmqpError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AmqpError::Topology(_) | AmqpError::Serialization(_) | AmqpError::InvalidState(_) => {
                ErrorCategory::Permanent
            }
            _ => ErrorCategory::Transient,
        }
    }

    /// Errors that reconnecting cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AmqpError::Topology(_))
    }
}

/// Result type for AMQP operations.
pub type Result<T> = std::result::Result<T, AmqpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            AmqpError::Connection("refused".into()).category(),
            ErrorCategory::Transient
        );
        assert_eq!(AmqpError::NotConnected.category(), ErrorCategory::Transient);
        assert_eq!(
            AmqpError::Topology("PRECONDITION_FAILED".into()).category(),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn test_only_topology_is_fatal() {
        assert!(AmqpError::Topology("x-message-ttl mismatch".into()).is_fatal());
        assert!(!AmqpError::Connection("reset".into()).is_fatal());
        assert!(!AmqpError::Timeout {
            operation: "connect",
            after: Duration::from_secs(10),
        }
        .is_fatal());
    }

    #[test]
    fn test_timeout_display() {
        let err = AmqpError::Timeout {
            operation: "connect",
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "connect timed out after 10s");
    }
}
