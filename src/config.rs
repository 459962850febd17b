//! Configuration types for the connection engine
//!
//! The engine takes its sizes at construction time and validates them once.
//! Loading configuration from files is a collaborator concern; these types
//! only derive serde so embedding applications can deserialize them from
//! whatever format they already use.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default OS socket buffer size hint (bytes)
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// Default pooled I/O buffer size (bytes)
///
/// Dictates the maximum send-chunk granularity and the receive read size.
pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 4 * 1024;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// OS socket buffer size hint, in bytes
    ///
    /// The engine stores this for collaborators that bind or connect sockets;
    /// it does not apply socket options itself.
    #[serde(default = "default_socket_buffer_size")]
    pub socket_buffer_size: usize,

    /// Size of each pooled I/O buffer, in bytes
    ///
    /// Every send is chunked to at most this many bytes and every receive
    /// reads into a buffer of exactly this size.
    #[serde(default = "default_message_buffer_size")]
    pub message_buffer_size: usize,
}

fn default_socket_buffer_size() -> usize {
    DEFAULT_SOCKET_BUFFER_SIZE
}

fn default_message_buffer_size() -> usize {
    DEFAULT_MESSAGE_BUFFER_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            message_buffer_size: DEFAULT_MESSAGE_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with explicit sizes
    #[must_use]
    pub const fn new(socket_buffer_size: usize, message_buffer_size: usize) -> Self {
        Self {
            socket_buffer_size,
            message_buffer_size,
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if either size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_buffer_size == 0 {
            return Err(ConfigError::validation(
                "socket_buffer_size must be at least 1",
            ));
        }
        if self.message_buffer_size == 0 {
            return Err(ConfigError::validation(
                "message_buffer_size must be at least 1",
            ));
        }
        Ok(())
    }
}
