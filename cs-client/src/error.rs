//! Error types for the command station client

use thiserror::Error;

/// Errors that can occur while talking to a command station
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Connection or I/O failure on the underlying transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The station answered with an error reply
    #[error("Command station rejected command: {0}")]
    Rejected(String),

    /// A value outside the range the station accepts
    #[error("Value {value} out of range for {what}")]
    OutOfRange { what: &'static str, value: u32 },

    /// The connection has already been closed
    #[error("Connection closed")]
    Closed,
}

/// Result type for command station operations
pub type Result<T> = std::result::Result<T, DeviceError>;
