//! Engine hooks
//!
//! The seam between the engine and the protocol layer built on top of it.
//! A hooks implementation is handed to the [`Host`](crate::host::Host) at
//! construction and observes every connection it mints; default method
//! bodies only log, so implementors override exactly the events they care
//! about.
//!
//! The one hook that is more than an observer is [`on_message_received`]:
//! it carries the framing continuation protocol. The engine calls it with
//! the bytes available so far and the parser answers with how many it
//! consumed:
//!
//! - `0` — the slice does not yet hold a complete message; the engine
//!   stashes it and reads more.
//! - `slice.len()` — everything was consumed; the engine reads more.
//! - anything in between — a message ended mid-slice; the engine
//!   immediately re-invokes the hook with the unconsumed suffix, without
//!   touching the socket.
//!
//! Returning more than `slice.len()` is a contract violation and panics.
//!
//! [`on_message_received`]: EngineHooks::on_message_received

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::packet::{Packet, SendStatus};

/// Observer and framing seam for a host's connections
///
/// Implementations must be thread-safe: hooks fire from connection tasks.
/// They should also return promptly; a connection's receive loop does not
/// read again until `on_message_received` returns.
pub trait EngineHooks: Send + Sync + 'static {
    /// A connection was registered with the host
    fn on_connected(&self, connection: &Arc<Connection>) {
        debug!(id = connection.id(), "connection registered");
    }

    /// A packet reached the front of a connection's send queue
    fn on_start_sending(&self, connection: &Arc<Connection>, packet: &Arc<Packet>) {
        trace!(id = connection.id(), len = packet.len(), "send started");
    }

    /// A packet finished, successfully or not
    ///
    /// Fires exactly once per submitted packet, in submission order, and
    /// always after `on_start_sending` for the same packet (queued packets
    /// failed at teardown never started).
    fn on_send_complete(
        &self,
        connection: &Arc<Connection>,
        packet: &Arc<Packet>,
        status: SendStatus,
    ) {
        trace!(
            id = connection.id(),
            len = packet.len(),
            ?status,
            "send complete"
        );
    }

    /// Bytes arrived on a connection
    ///
    /// Returns the number of bytes consumed; see the module docs for the
    /// continuation protocol. The default consumes everything, which makes
    /// a hook-less engine a byte sink rather than a memory leak.
    fn on_message_received(&self, connection: &Arc<Connection>, data: &[u8]) -> usize {
        trace!(id = connection.id(), len = data.len(), "bytes received");
        data.len()
    }

    /// A connection finished tearing down
    ///
    /// `error` is `None` for an orderly peer close or a local disconnect
    /// without cause.
    fn on_disconnected(&self, connection: &Arc<Connection>, error: Option<&ConnectionError>) {
        debug!(id = connection.id(), ?error, "connection closed");
    }

    /// A connection hit an I/O failure
    ///
    /// Advisory; the connection is already tearing down when this fires.
    fn on_connection_error(&self, connection: &Arc<Connection>, error: &ConnectionError) {
        warn!(id = connection.id(), %error, "connection error");
    }
}

/// Hooks implementation that keeps every default (log-only) body
///
/// Useful for hosts that only drive connections through their public
/// surface and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl EngineHooks for NoopHooks {}
