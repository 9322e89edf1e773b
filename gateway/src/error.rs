//! Error types for the pico-gateway crate.

use cs_client::DeviceError;
use mqtt_bus::BusError;
use thiserror::Error;

use crate::ownership::Role;

/// Errors produced while parsing or building a topic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// A topic has between one and five levels
    #[error("Invalid topic: {0} levels, expected 1 to 5")]
    LevelCount(usize),

    #[error("Invalid topic level name: name is empty")]
    EmptyLevel,

    /// Level names must not contain `/`, `+` or `#`
    #[error("Invalid topic level name {0:?}: name contains invalid characters")]
    InvalidLevel(String),

    /// The fifth level is not one of get, set, toggle, stop, add
    #[error("Unknown command {0:?}")]
    UnknownCommand(String),
}

/// Errors produced while decoding an inbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Malformed JSON payload: {0}")]
    Json(String),

    /// Well-formed JSON of a kind handlers never accept
    #[error("Unsupported payload type: {0}")]
    Unsupported(&'static str),
}

/// Errors produced while executing a command against a station.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Invalid payload for {command}: expected {expected}, got {found}")]
    InvalidPayload {
        command: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// A speed outside the bus range 0..=126
    #[error("Speed {0} out of range 0..=126")]
    SpeedOutOfRange(f64),

    #[error("Command {command} not supported for {property}")]
    Unsupported {
        property: &'static str,
        command: &'static str,
    },
}

/// Errors produced by ownership registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// Another controller already is the primary for the entity
    #[error("Loco {entity} is already assigned to primary command station {primary}, cannot assign {controller}")]
    Conflict {
        entity: String,
        primary: String,
        controller: String,
    },

    #[error("Loco {entity} is already assigned to {role} command station {controller}")]
    AlreadyAssigned {
        entity: String,
        controller: String,
        role: Role,
    },
}

/// Errors returned by the gateway facade.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Command station error: {0}")]
    Device(#[from] DeviceError),

    /// A filter pattern is not a valid regular expression
    #[error("Invalid filter pattern {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Command station {0} is already registered")]
    DuplicateController(String),

    #[error("Loco {0} is already registered")]
    DuplicateEntity(String),

    #[error("Gateway is already listening")]
    AlreadyListening,

    #[error("Gateway is closed")]
    Closed,

    #[error("Failed to start worker thread: {0}")]
    Worker(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_error_display() {
        assert_eq!(
            TopicError::LevelCount(6).to_string(),
            "Invalid topic: 6 levels, expected 1 to 5"
        );
        assert_eq!(
            TopicError::InvalidLevel("br+01".to_string()).to_string(),
            "Invalid topic level name \"br+01\": name contains invalid characters"
        );
    }

    #[test]
    fn test_command_error_wraps_device_error() {
        let err: CommandError = DeviceError::Closed.into();
        assert_eq!(err.to_string(), "Connection closed");

        let err = CommandError::InvalidPayload {
            command: "set",
            expected: "boolean",
            found: "number",
        };
        assert_eq!(
            err.to_string(),
            "Invalid payload for set: expected boolean, got number"
        );
    }

    #[test]
    fn test_ownership_conflict_display() {
        let err = OwnershipError::Conflict {
            entity: "br01".to_string(),
            primary: "cs01".to_string(),
            controller: "cs02".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Loco br01 is already assigned to primary command station cs01, cannot assign cs02"
        );

        let err: GatewayError = err.into();
        assert!(matches!(err, GatewayError::Ownership(OwnershipError::Conflict { .. })));
    }
}
