//! Error types for event bus operations

use std::time::Duration;
use thiserror::Error;

/// Event bus errors
#[derive(Error, Debug)]
pub enum EventBusError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Topic name rejected before reaching the transport
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Publish did not complete in time
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// Transport has been shut down
    #[error("Event bus closed")]
    Closed,
}

impl EventBusError {
    /// Whether a later attempt against the same transport may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EventBusError::Redis(e) => {
                e.is_timeout() || e.is_connection_dropped() || e.is_io_error()
            }
            EventBusError::Timeout(_) => true,
            EventBusError::Serialization(_) | EventBusError::InvalidTopic(_) => false,
            EventBusError::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventBusError::InvalidTopic("".to_string());
        assert_eq!(err.to_string(), "Invalid topic: ");

        let err = EventBusError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "Publish timed out after 500ms");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("not json");
        let err: EventBusError = json_err.unwrap_err().into();
        assert!(matches!(err, EventBusError::Serialization(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        assert!(EventBusError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!EventBusError::Closed.is_transient());
    }
}
