//! Per-socket connection state machine
//!
//! A [`Connection`] owns one TCP stream and the state needed to drive it:
//! a serialized send queue feeding a chunked send loop, a receive loop with
//! partial-message reassembly, and an idempotent teardown path that reclaims
//! the pooled I/O contexts exactly once.
//!
//! Concurrency model: the send loop and the receive loop are the only tasks
//! touching their respective socket halves, the queue grants the sender role
//! to one task at a time, and `active` flips to false exactly once. Both
//! loops watch the lifecycle channel so a disconnect initiated anywhere
//! wakes them out of blocked socket operations.

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::error::ConnectionError;
use crate::hooks::EngineHooks;
use crate::packet::{Packet, SendStatus};
use crate::pool::{IoContext, IoContextPool};
use crate::queue::{SendQueue, Submission};
use crate::registry::ConnectionRegistry;
use crate::stats::{ConnectionStats, HostStats};

/// Lifecycle of a connection, observable through [`Connection::state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The socket is live
    Active,
    /// Teardown has begun; I/O loops are winding down
    Closing,
    /// The socket is closed and resources are reclaimed
    Closed,
}

/// Where a connection's pooled I/O context currently is
///
/// `Idle` sits in the slot between loop runs, `Busy` means a loop took it,
/// `Gone` means teardown reclaimed the slot. The slot arbitration makes the
/// pool release exactly-once: whichever of teardown and the loop touches the
/// slot last performs the release.
enum ContextSlot {
    Idle(IoContext),
    Busy,
    Gone,
}

impl ContextSlot {
    fn take(&mut self) -> Option<IoContext> {
        match std::mem::replace(self, Self::Busy) {
            Self::Idle(ctx) => Some(ctx),
            Self::Busy => None,
            Self::Gone => {
                *self = Self::Gone;
                None
            }
        }
    }

    /// Put a context back; returns it instead if teardown owns the slot,
    /// in which case the caller releases it to the pool.
    fn put_back(&mut self, ctx: IoContext) -> Option<IoContext> {
        match self {
            Self::Gone => Some(ctx),
            _ => {
                *self = Self::Idle(ctx);
                None
            }
        }
    }

    /// Mark the slot reclaimed; returns the context if it was idle.
    fn mark_gone(&mut self) -> Option<IoContext> {
        match std::mem::replace(self, Self::Gone) {
            Self::Idle(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Why the send loop stopped mid-packet
enum SendAbort {
    /// Teardown was observed; no new disconnect is initiated
    Closing,
    /// The socket write failed; the loop initiates the disconnect
    Io(ConnectionError),
}

/// A live TCP connection and its I/O state
///
/// Created by [`Host::new_connection`](crate::host::Host::new_connection),
/// shared as `Arc<Connection>`.
pub struct Connection {
    id: i64,
    active: AtomicBool,
    receiving: AtomicBool,
    registered: AtomicBool,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    reader: AsyncMutex<Option<OwnedReadHalf>>,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    send_slot: Mutex<ContextSlot>,
    recv_slot: Mutex<ContextSlot>,
    queue: SendQueue,
    current: Mutex<Option<Arc<Packet>>>,
    user_data: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    close_reason: Mutex<Option<ConnectionError>>,
    state_tx: watch::Sender<LinkState>,
    stats: ConnectionStats,
    pool: Arc<IoContextPool>,
    hooks: Arc<dyn EngineHooks>,
    registry: Weak<ConnectionRegistry>,
    host_stats: Arc<HostStats>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        id: i64,
        socket: TcpStream,
        pool: Arc<IoContextPool>,
        hooks: Arc<dyn EngineHooks>,
        registry: Weak<ConnectionRegistry>,
        host_stats: Arc<HostStats>,
    ) -> Arc<Self> {
        // Endpoint retrieval can fail on a socket that the peer already
        // closed; that never aborts construction.
        let local_addr = socket.local_addr().ok();
        let peer_addr = socket.peer_addr().ok();
        let (read_half, write_half) = socket.into_split();
        let (state_tx, _) = watch::channel(LinkState::Active);

        Arc::new(Self {
            id,
            active: AtomicBool::new(true),
            receiving: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            local_addr,
            peer_addr,
            reader: AsyncMutex::new(Some(read_half)),
            writer: AsyncMutex::new(Some(write_half)),
            send_slot: Mutex::new(ContextSlot::Idle(pool.acquire())),
            recv_slot: Mutex::new(ContextSlot::Idle(pool.acquire())),
            queue: SendQueue::new(),
            current: Mutex::new(None),
            user_data: Mutex::new(None),
            close_reason: Mutex::new(None),
            state_tx,
            stats: ConnectionStats::new(),
            pool,
            hooks,
            registry,
            host_stats,
        })
    }

    /// Connection id, unique and strictly increasing within one host
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Whether teardown has not yet begun
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Local endpoint, if it could be read at construction
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Remote endpoint, if it could be read at construction
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether a packet is in flight on this connection
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.queue.is_sending()
    }

    /// The packet currently being written to the socket, if any
    #[must_use]
    pub fn current_packet(&self) -> Option<Arc<Packet>> {
        self.current.lock().clone()
    }

    /// Per-connection transfer statistics
    #[must_use]
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Subscribe to the connection lifecycle
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Wait until the connection has fully closed
    pub async fn wait_closed(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == LinkState::Closed).await;
    }

    /// The error that closed the connection, if teardown has begun and a
    /// cause was recorded
    #[must_use]
    pub fn close_reason(&self) -> Option<ConnectionError> {
        self.close_reason.lock().clone()
    }

    /// Attach opaque collaborator data to this connection
    pub fn set_user_data(&self, data: Box<dyn Any + Send + Sync>) {
        *self.user_data.lock() = Some(data);
    }

    /// Detach the opaque collaborator data, if any
    #[must_use]
    pub fn take_user_data(&self) -> Option<Box<dyn Any + Send + Sync>> {
        self.user_data.lock().take()
    }

    pub(crate) fn mark_registered(&self) {
        self.registered.store(true, Ordering::Release);
    }

    /// Submit a packet for sending
    ///
    /// Completes as soon as the packet is admitted to the send queue; the
    /// only await point is backpressure when 500 packets are already
    /// waiting. Exactly one send-complete hook eventually fires for the
    /// packet. If teardown has already begun the packet fails immediately
    /// with its cursor reset to 0.
    pub async fn begin_send(self: &Arc<Self>, packet: Arc<Packet>) {
        if !self.is_active() {
            self.fail_packet(&packet);
            return;
        }
        match self.queue.submit(Arc::clone(&packet)).await {
            Submission::Closed => {
                self.fail_packet(&packet);
            }
            Submission::Enqueued => {}
            Submission::Sender => {
                self.hooks.on_start_sending(self, &packet);
                let connection = Arc::clone(self);
                tokio::spawn(async move {
                    connection.run_send_loop(packet).await;
                });
            }
        }
    }

    /// Start the receive loop
    ///
    /// Idempotent: the first call spawns the loop, every later call is a
    /// no-op.
    pub fn begin_receive(self: &Arc<Self>) {
        if self
            .receiving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if !self.is_active() {
            return;
        }
        let connection = Arc::clone(self);
        tokio::spawn(async move {
            connection.run_receive_loop().await;
        });
    }

    /// Begin teardown
    ///
    /// Idempotent: only the caller that flips the connection inactive
    /// performs the shutdown, asynchronously. Everyone else returns
    /// immediately.
    pub fn begin_disconnect(self: &Arc<Self>, error: Option<ConnectionError>) {
        if self
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        *self.close_reason.lock() = error.clone();
        let connection = Arc::clone(self);
        tokio::spawn(async move {
            connection.run_disconnect(error).await;
        });
    }

    fn fail_packet(self: &Arc<Self>, packet: &Arc<Packet>) {
        packet.reset();
        self.stats.record_packet_failed();
        self.hooks.on_send_complete(self, packet, SendStatus::Failed);
    }

    fn release_send_ctx(&self, ctx: IoContext) {
        let leftover = self.send_slot.lock().put_back(ctx);
        if let Some(ctx) = leftover {
            self.pool.release(ctx);
        }
    }

    fn release_recv_ctx(&self, ctx: IoContext) {
        let leftover = self.recv_slot.lock().put_back(ctx);
        if let Some(ctx) = leftover {
            self.pool.release(ctx);
        }
    }

    fn drain_queue_failed(self: &Arc<Self>) {
        while let Some(packet) = self.queue.next() {
            self.fail_packet(&packet);
        }
    }

    /// Drive the socket for one sender grant: the granted packet first,
    /// then whatever the queue hands over, until it drains or the
    /// connection dies.
    async fn run_send_loop(self: Arc<Self>, first: Arc<Packet>) {
        // Subscribe before checking `active`: a teardown that flipped the
        // flag after this point is guaranteed to be seen on the channel.
        let mut state_rx = self.state_tx.subscribe();

        let taken = self.send_slot.lock().take();
        let Some(mut ctx) = taken else {
            // Context already reclaimed by teardown
            self.fail_packet(&first);
            self.drain_queue_failed();
            return;
        };
        if !self.is_active() {
            self.fail_packet(&first);
            self.drain_queue_failed();
            self.release_send_ctx(ctx);
            return;
        }

        let mut writer_guard = self.writer.lock().await;
        let Some(writer) = writer_guard.as_mut() else {
            drop(writer_guard);
            self.fail_packet(&first);
            self.drain_queue_failed();
            self.release_send_ctx(ctx);
            return;
        };

        let mut packet = first;
        loop {
            *self.current.lock() = Some(Arc::clone(&packet));
            let result = self
                .send_packet(writer, &mut ctx, &packet, &mut state_rx)
                .await;
            *self.current.lock() = None;
            match result {
                Ok(()) => {
                    self.stats.record_packet_sent();
                    self.hooks
                        .on_send_complete(&self, &packet, SendStatus::Success);
                }
                Err(abort) => {
                    packet.reset();
                    self.stats.record_packet_failed();
                    self.hooks
                        .on_send_complete(&self, &packet, SendStatus::Failed);
                    if let SendAbort::Io(error) = abort {
                        self.begin_disconnect(Some(error.clone()));
                        self.hooks.on_connection_error(&self, &error);
                    }
                    // Packets still queued are failed when teardown closes
                    // the queue.
                    break;
                }
            }
            // Return the context before the queue can leave sending state:
            // a sender granted right after must find the slot idle.
            self.release_send_ctx(ctx);
            match self.queue.next() {
                Some(next) => {
                    let retaken = self.send_slot.lock().take();
                    let Some(c) = retaken else {
                        // Teardown reclaimed the slot between packets
                        self.fail_packet(&next);
                        self.drain_queue_failed();
                        return;
                    };
                    ctx = c;
                    self.hooks.on_start_sending(&self, &next);
                    packet = next;
                }
                None => return,
            }
        }
        // Error exit: the context is still ours
        drop(writer_guard);
        self.release_send_ctx(ctx);
    }

    /// Send one packet through the context buffer, chunk by chunk
    async fn send_packet(
        &self,
        writer: &mut OwnedWriteHalf,
        ctx: &mut IoContext,
        packet: &Arc<Packet>,
        state_rx: &mut watch::Receiver<LinkState>,
    ) -> Result<(), SendAbort> {
        while !packet.is_sent() {
            if !self.is_active() {
                return Err(SendAbort::Closing);
            }
            // Load the next payload slice into the context buffer
            let start = packet.sent();
            let chunk = packet.remaining().min(ctx.capacity());
            ctx.buffer_mut()[..chunk].copy_from_slice(&packet.payload()[start..start + chunk]);
            ctx.set_window(0, chunk);

            // Drain the window; a short write advances the window and
            // resends the remainder without reloading from the payload.
            while ctx.length() > 0 {
                let (offset, length) = ctx.window();
                let written = tokio::select! {
                    result = writer.write(&ctx.buffer()[offset..offset + length]) => {
                        match result {
                            Ok(0) => {
                                ctx.record_error(io::ErrorKind::WriteZero);
                                return Err(SendAbort::Io(ConnectionError::send_failed(
                                    "wrote zero bytes",
                                )));
                            }
                            Ok(n) => n,
                            Err(e) => {
                                ctx.record_error(e.kind());
                                return Err(SendAbort::Io(ConnectionError::send_failed(
                                    e.to_string(),
                                )));
                            }
                        }
                    }
                    _ = state_rx.changed() => return Err(SendAbort::Closing),
                };
                packet.advance(written);
                self.stats.record_bytes_sent(written as u64);
                ctx.set_window(offset + written, length - written);
            }
        }
        Ok(())
    }

    /// Read from the socket and feed the parser until the connection dies
    async fn run_receive_loop(self: Arc<Self>) {
        let mut state_rx = self.state_tx.subscribe();

        let taken = self.recv_slot.lock().take();
        let Some(mut ctx) = taken else {
            return;
        };
        if !self.is_active() {
            self.release_recv_ctx(ctx);
            return;
        }

        let mut reader_guard = self.reader.lock().await;
        let Some(reader) = reader_guard.as_mut() else {
            drop(reader_guard);
            self.release_recv_ctx(ctx);
            return;
        };

        let mut reassembly: Option<BytesMut> = None;
        loop {
            if !self.is_active() {
                break;
            }
            let result = tokio::select! {
                result = reader.read(ctx.buffer_mut()) => result,
                _ = state_rx.changed() => break,
            };
            match result {
                Ok(0) => {
                    // Orderly peer close
                    self.begin_disconnect(None);
                    break;
                }
                Ok(n) => {
                    self.stats.record_bytes_received(n as u64);
                    self.dispatch_received(&mut reassembly, ctx.buffer(), n);
                }
                Err(e) => {
                    ctx.record_error(e.kind());
                    self.begin_disconnect(Some(ConnectionError::receive_failed(e.to_string())));
                    break;
                }
            }
        }
        drop(reader_guard);
        self.release_recv_ctx(ctx);
    }

    /// Run the framing continuation protocol over freshly read bytes
    ///
    /// Dispatches straight from the receive buffer (zero copy) unless
    /// earlier reads left unconsumed bytes in the reassembly buffer, in
    /// which case the new bytes are appended and the combined slice is
    /// dispatched. The parser's return value drives the loop: 0 stashes the
    /// remainder for the next read, a full consume clears the stash, and a
    /// partial consume re-dispatches the suffix synchronously.
    fn dispatch_received(self: &Arc<Self>, reassembly: &mut Option<BytesMut>, buf: &[u8], n: usize) {
        let buffered = match reassembly.as_mut() {
            Some(r) if !r.is_empty() => {
                r.extend_from_slice(&buf[..n]);
                true
            }
            _ => false,
        };
        let total = if buffered {
            reassembly.as_ref().map_or(0, BytesMut::len)
        } else {
            n
        };

        let mut offset = 0;
        while offset < total {
            let consumed = {
                let view = if buffered {
                    &reassembly.as_ref().expect("buffered implies reassembly")[offset..total]
                } else {
                    &buf[offset..n]
                };
                let consumed = self.hooks.on_message_received(self, view);
                assert!(
                    consumed <= view.len(),
                    "parser consumed {consumed} bytes from a {} byte slice",
                    view.len()
                );
                consumed
            };

            if consumed == 0 {
                // The parser needs more bytes; carry the unconsumed tail
                // across the next read.
                if buffered {
                    let r = reassembly.as_mut().expect("buffered implies reassembly");
                    if offset > 0 {
                        let _ = r.split_to(offset);
                    }
                } else {
                    let r = reassembly
                        .get_or_insert_with(|| BytesMut::with_capacity(self.pool.buffer_size()));
                    r.clear();
                    r.extend_from_slice(&buf[offset..n]);
                }
                return;
            }

            offset += consumed;
            // A partial consume means a complete message ended mid-slice;
            // loop around and re-dispatch the suffix before reading again.
        }

        if let Some(r) = reassembly.as_mut() {
            r.clear();
        }
    }

    /// The winning disconnect path
    async fn run_disconnect(self: Arc<Self>, error: Option<ConnectionError>) {
        debug!(id = self.id, ?error, "disconnecting");

        // Wake both I/O loops before touching the socket so neither stays
        // blocked on a half we are about to reclaim.
        let _ = self.state_tx.send(LinkState::Closing);

        // Half close first: FIN the write side, then drop both halves to
        // close the socket fully.
        {
            let mut writer = self.writer.lock().await;
            if let Some(half) = writer.as_mut() {
                if let Err(e) = half.shutdown().await {
                    // Proceed to the full close regardless.
                    warn!(id = self.id, error = %e, "socket shutdown failed");
                }
            }
            *writer = None;
        }
        *self.reader.lock().await = None;

        // The local lifecycle event precedes the host hook, and both
        // precede resource reclamation.
        let _ = self.state_tx.send(LinkState::Closed);
        self.hooks.on_disconnected(&self, error.as_ref());
        self.free();

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        if self.registered.swap(false, Ordering::AcqRel) {
            self.host_stats.record_closed();
        }
    }

    /// Reclaim connection resources: fail the queued backlog and return
    /// both I/O contexts to the pool (a context held by a live loop is
    /// released by that loop on exit).
    fn free(self: &Arc<Self>) {
        if let Some(packets) = self.queue.close() {
            for packet in packets {
                self.fail_packet(&packet);
            }
        }
        let idle = self.send_slot.lock().mark_gone();
        if let Some(ctx) = idle {
            self.pool.release(ctx);
        }
        let idle = self.recv_slot.lock().mark_gone();
        if let Some(ctx) = idle {
            self.pool.release(ctx);
        }
    }
}
