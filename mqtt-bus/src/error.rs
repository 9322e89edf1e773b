//! Error types for the bus transport

use thiserror::Error;

/// Errors that can occur while talking to the broker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Could not establish or keep the broker connection
    #[error("Broker connection failed: {0}")]
    Connection(String),

    /// Subscribing or unsubscribing a topic filter failed
    #[error("Subscription to {topic} failed: {reason}")]
    Subscription { topic: String, reason: String },

    /// Writing a message to the broker failed
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Invalid transport configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The bus has already been disconnected
    #[error("Bus disconnected")]
    Disconnected,
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BusError::Publish {
            topic: "pico-cs/loco/br01/speed".to_string(),
            reason: "request channel closed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Publish to pico-cs/loco/br01/speed failed: request channel closed"
        );

        let error = BusError::Connection("connection refused".to_string());
        assert_eq!(error.to_string(), "Broker connection failed: connection refused");

        assert_eq!(BusError::Disconnected.to_string(), "Bus disconnected");
    }
}
