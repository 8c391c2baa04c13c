//! Error types for the doorbell core

use thiserror::Error;

/// Result type for doorbell operations
pub type DoorbellResult<T> = Result<T, DoorbellError>;

/// Errors that can occur while configuring or running the doorbell
///
/// Only [`DoorbellError::Configuration`] is fatal. Everything else is raised
/// inside a single loop iteration, logged by the orchestrator and dropped.
#[derive(Debug, Error)]
pub enum DoorbellError {
    /// Startup configuration is unusable (empty trust list, bad pin, ...)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The "untrusted caller" message could not be delivered to the owner
    #[error("Failed to notify {recipient}: {reason}")]
    NotificationDelivery { recipient: String, reason: String },

    /// The signaling engine rejected or failed an operation
    #[error("Signaling engine error in {operation}: {details}")]
    Engine { operation: String, details: String },

    /// The button input line could not be read
    #[error("Input error on pin {pin}: {message}")]
    Input { pin: u32, message: String },

    /// Ring cue playback failed
    #[error("Ring cue error: {message}")]
    Cue { message: String },

    /// An operation was attempted in a state that does not allow it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DoorbellError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a notification delivery error
    pub fn notification(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }

    /// Create a signaling engine error
    pub fn engine(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Create an input error
    pub fn input(pin: u32, message: impl Into<String>) -> Self {
        Self::Input {
            pin,
            message: message.into(),
        }
    }

    /// Create a ring cue error
    pub fn cue(message: impl Into<String>) -> Self {
        Self::Cue {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error must stop the process before the run loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(DoorbellError::config("empty trust list").is_fatal());
        assert!(!DoorbellError::notification("sip:owner@x", "offline").is_fatal());
        assert!(!DoorbellError::engine("invite", "timeout").is_fatal());
        assert!(!DoorbellError::input(17, "busy").is_fatal());
        assert!(!DoorbellError::cue("no device").is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = DoorbellError::notification("sip:owner@x", "offline");
        assert_eq!(err.to_string(), "Failed to notify sip:owner@x: offline");

        let err = DoorbellError::engine("accept_call", "no such call");
        assert_eq!(
            err.to_string(),
            "Signaling engine error in accept_call: no such call"
        );
    }
}
