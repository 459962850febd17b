//! tcplink: asynchronous TCP connection engine
//!
//! This crate is the substrate higher-level protocol servers and clients
//! are built on: it owns TCP sockets, drives their send and receive paths,
//! presents a framed message-receive hook with partial-packet reassembly,
//! and serializes outgoing packets per connection with bounded
//! backpressure.
//!
//! # Features
//!
//! - **Serialized sends**: per-connection FIFO send queue, bounded at 500
//!   waiting packets, with submitters awaiting a slot when it fills
//! - **Framed receive**: a zero-copy fast path from the socket buffer,
//!   falling back to a reassembly buffer when messages straddle reads
//! - **Pooled I/O buffers**: lock-free pool of fixed-size contexts shared
//!   by every connection of a host
//! - **Orderly teardown**: idempotent disconnect with exactly-once
//!   lifecycle events and resource reclamation
//!
//! # Architecture
//!
//! ```text
//! Collaborator (listener / connector / parser)
//!        │ TcpStream            │ consumed bytes
//!        ▼                      ▼
//!      Host ──mints──▶ Connection ◀──▶ EngineHooks
//!        │                  │
//!   IoContextPool      SendQueue
//!   ConnectionRegistry
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcplink::{EngineConfig, Host, NoopHooks, Packet};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(Host::new(EngineConfig::default(), Arc::new(NoopHooks))?);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9000").await?;
//! let (socket, _) = listener.accept().await?;
//!
//! let connection = host.new_connection(socket);
//! host.register_connection(&connection);
//! connection.begin_receive();
//! connection.begin_send(Arc::new(Packet::new(&b"hello"[..]))).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: engine configuration
//! - [`connection`]: per-socket state machine
//! - [`error`]: error types
//! - [`hooks`]: the collaborator seam and framing continuation protocol
//! - [`host`]: connection factory, registry, and pool owner
//! - [`packet`]: outbound payload with progress cursor
//! - [`pool`]: pooled I/O contexts
//! - [`queue`]: bounded per-connection send queue
//! - [`registry`]: connection registry
//! - [`stats`]: per-connection and host statistics

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod host;
pub mod packet;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod stats;

// Re-export commonly used types at the crate root
pub use config::{EngineConfig, DEFAULT_MESSAGE_BUFFER_SIZE, DEFAULT_SOCKET_BUFFER_SIZE};
pub use connection::{Connection, LinkState};
pub use error::{ConfigError, ConnectionError, EngineError, Result};
pub use hooks::{EngineHooks, NoopHooks};
pub use host::Host;
pub use packet::{Packet, SendStatus};
pub use pool::{IoContext, IoContextPool, PoolStats, MAX_POOLED};
pub use queue::{SendQueue, Submission, SEND_QUEUE_LIMIT};
pub use registry::ConnectionRegistry;
pub use stats::{ConnectionStats, ConnectionStatsSnapshot, HostStats, HostStatsSnapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
