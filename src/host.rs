//! Host facade
//!
//! The host is the process-wide side of the engine: it allocates connection
//! ids, mints connections around live sockets, keeps the registry of what
//! is connected, and owns the I/O context pool every connection draws from.
//! Accepting and connecting sockets is the collaborator's job; the host
//! takes over once a `TcpStream` exists.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcplink::{EngineConfig, Host, NoopHooks};
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
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::{ConfigError, ConnectionError};
use crate::hooks::EngineHooks;
use crate::pool::{IoContext, IoContextPool};
use crate::registry::ConnectionRegistry;
use crate::stats::HostStats;

/// Connection ids start above this value
const CONNECTION_ID_BASE: i64 = 1000;

/// Factory and registry for connections sharing one hook set and pool
pub struct Host {
    config: EngineConfig,
    hooks: Arc<dyn EngineHooks>,
    registry: Arc<ConnectionRegistry>,
    pool: Arc<IoContextPool>,
    next_id: AtomicI64,
    stats: Arc<HostStats>,
}

impl Host {
    /// Create a host
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if either configured size is
    /// zero.
    pub fn new(config: EngineConfig, hooks: Arc<dyn EngineHooks>) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = Arc::new(IoContextPool::new(config.message_buffer_size));
        Ok(Self {
            config,
            hooks,
            registry: Arc::new(ConnectionRegistry::new()),
            pool,
            next_id: AtomicI64::new(CONNECTION_ID_BASE),
            stats: Arc::new(HostStats::new()),
        })
    }

    /// The validated configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Allocate the next connection id
    ///
    /// Wait-free; ids are unique and strictly increasing for the lifetime
    /// of the host.
    pub fn next_connection_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mint a connection around a live socket
    ///
    /// The connection draws its two I/O contexts from the host pool. It is
    /// not registered yet; call [`register_connection`](Self::register_connection)
    /// once the collaborator is ready to receive hooks for it.
    #[must_use]
    pub fn new_connection(self: &Arc<Self>, socket: tokio::net::TcpStream) -> Arc<Connection> {
        Connection::new(
            self.next_connection_id(),
            socket,
            Arc::clone(&self.pool),
            Arc::clone(&self.hooks),
            Arc::downgrade(&self.registry),
            Arc::clone(&self.stats),
        )
    }

    /// Register a connection and fire the connected hook
    ///
    /// A connection that already began teardown is silently ignored.
    pub fn register_connection(&self, connection: &Arc<Connection>) {
        if !connection.is_active() {
            debug!(id = connection.id(), "not registering inactive connection");
            return;
        }
        connection.mark_registered();
        self.registry.insert(Arc::clone(connection));
        self.stats.record_opened();
        self.hooks.on_connected(connection);
    }

    /// Look up a registered connection by id
    #[must_use]
    pub fn connection(&self, id: i64) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    /// Number of registered connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Start the host
    ///
    /// The engine itself has nothing to start; collaborators bind their
    /// listeners or initiate their outbound connects around this call.
    pub fn start(&self) {}

    /// Stop the host
    ///
    /// Drains the registry and issues an asynchronous disconnect to every
    /// registered connection; does not wait for them to finish closing.
    pub fn stop(&self) {
        let connections = self.registry.drain();
        info!(count = connections.len(), "host stopping");
        for connection in connections {
            connection.begin_disconnect(Some(ConnectionError::closed("host stopping")));
        }
    }

    /// Borrow an I/O context from the host pool
    #[must_use]
    pub fn acquire_context(&self) -> IoContext {
        self.pool.acquire()
    }

    /// Return an I/O context to the host pool
    pub fn release_context(&self, ctx: IoContext) {
        self.pool.release(ctx);
    }

    /// The shared I/O context pool
    #[must_use]
    pub fn pool(&self) -> &Arc<IoContextPool> {
        &self.pool
    }

    /// Host-level lifecycle statistics
    #[must_use]
    pub fn stats(&self) -> &HostStats {
        &self.stats
    }
}
