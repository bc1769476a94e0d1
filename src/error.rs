//! Error types and result definitions for the tplink-smarthome crate.
//! Separates transport failures from protocol mismatches, device rejections
//! and caller mistakes so each can be handled on its own.

use serde_json::Value;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a device.
#[derive(Error, Debug, Clone)]
pub enum SmartHomeError {
    /// Standard IO error (network, reset, etc.)
    #[error("IO error: {0}")]
    Io(String),

    /// Connect, read or write did not finish in time
    #[error("Timeout waiting for device")]
    Timeout,

    /// TCP connection could not be established
    #[error("Connection to {0} failed")]
    ConnectionFailed(String),

    /// The stream ended before the announced frame length was read
    #[error("Truncated frame: expected {expected} bytes")]
    TruncatedFrame { expected: usize },

    /// The length prefix announced an implausible frame size
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// The response did not contain the requested namespace
    #[error("No required {namespace} in response: {response}")]
    MissingNamespace { namespace: String, response: Value },

    /// The payload received from the device was malformed or unexpected
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The device answered with a nonzero `err_code`
    #[error("Error on {namespace}.{command}: {result}")]
    Device {
        namespace: String,
        command: String,
        result: Value,
    },

    /// The supplied host is not a well-formed IPv4 address
    #[error("Invalid IPv4 address '{0}'")]
    InvalidAddress(String),

    /// A caller supplied value is outside the accepted range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// A requested state cannot be applied
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification of a [`SmartHomeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device could not be reached or the exchange broke down.
    Transport,
    /// The device answered with something this client does not understand.
    Protocol,
    /// The device explicitly rejected the command.
    Device,
    /// The caller passed a bad value; nothing was sent.
    Validation,
}

/// A specialized Result type for smart home operations.
pub type Result<T> = std::result::Result<T, SmartHomeError>;

impl From<std::io::Error> for SmartHomeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                SmartHomeError::Timeout
            }
            _ => SmartHomeError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SmartHomeError {
    fn from(err: serde_json::Error) -> Self {
        SmartHomeError::Json(err.to_string())
    }
}

impl SmartHomeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SmartHomeError::Io(_)
            | SmartHomeError::Timeout
            | SmartHomeError::ConnectionFailed(_)
            | SmartHomeError::TruncatedFrame { .. }
            | SmartHomeError::FrameTooLarge(_) => ErrorKind::Transport,
            SmartHomeError::Json(_)
            | SmartHomeError::MissingNamespace { .. }
            | SmartHomeError::InvalidPayload(_) => ErrorKind::Protocol,
            SmartHomeError::Device { .. } => ErrorKind::Device,
            SmartHomeError::InvalidAddress(_)
            | SmartHomeError::OutOfRange(_)
            | SmartHomeError::InvalidState(_) => ErrorKind::Validation,
        }
    }

    /// True when the device was unreachable rather than uncooperative.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_device(&self) -> bool {
        self.kind() == ErrorKind::Device
    }
}
