//! Error types for tcplink
//!
//! This module defines the error hierarchy for the connection engine.
//! Errors are categorized by subsystem and include recovery hints.

use std::io;

use thiserror::Error;

/// Top-level error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration errors (validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection lifecycle and I/O errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Connection(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Validation error (invalid values)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Config errors are not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// Connection handling errors
///
/// Variants carry string reasons rather than source errors so the type stays
/// `Clone`: a disconnect reason is broadcast on the connection's lifecycle
/// channel and handed to every observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Connection was closed or is closing
    #[error("Connection closed: {reason}")]
    Closed { reason: String },

    /// A socket send failed
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    /// A socket receive failed
    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    /// The socket shutdown step of teardown failed
    #[error("Socket shutdown failed: {reason}")]
    ShutdownFailed { reason: String },

    /// The send queue rejected a packet because it is closed
    #[error("Send queue is closed")]
    QueueClosed,
}

impl ConnectionError {
    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        // All connection errors terminate the connection; the caller may
        // establish a new one, but this connection is done.
        false
    }

    /// Create a closed error
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Create a send failure error
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    /// Create a receive failure error
    pub fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            reason: reason.into(),
        }
    }

    /// Create a shutdown failure error
    pub fn shutdown_failed(reason: impl Into<String>) -> Self {
        Self::ShutdownFailed {
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
