//! Pooled I/O contexts
//!
//! Every connection holds two I/O contexts: one for sends and one for
//! receives. A context bundles a fixed-size byte buffer with the window and
//! error bookkeeping one in-flight socket operation needs. Contexts are the
//! dominant per-connection allocation under churn, so the host keeps a
//! lock-free pool of them using `crossbeam_queue::ArrayQueue`.
//!
//! # Example
//!
//! ```
//! use tcplink::IoContextPool;
//!
//! let pool = IoContextPool::new(4096);
//!
//! let ctx = pool.acquire();
//! assert_eq!(ctx.capacity(), 4096);
//!
//! pool.release(ctx);
//! assert_eq!(pool.available(), 1);
//! ```

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

/// Hard cap on pooled contexts
///
/// Bounds resident memory: `MAX_POOLED * message_buffer_size` bytes is the
/// upper bound on pooled buffer memory.
pub const MAX_POOLED: usize = 50_000;

/// A reusable descriptor for one async socket operation
///
/// Owns a byte buffer of exactly the pool's buffer size plus the active
/// window (offset, length) the send path walks through, and the last I/O
/// error kind observed on it.
#[derive(Debug)]
pub struct IoContext {
    buffer: Vec<u8>,
    offset: usize,
    length: usize,
    last_error: Option<io::ErrorKind>,
}

impl IoContext {
    fn new(buffer_size: usize) -> Self {
        Self {
            buffer: vec![0u8; buffer_size],
            offset: 0,
            length: 0,
            last_error: None,
        }
    }

    /// Buffer capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The full buffer
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The full buffer, mutably
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Set the active window
    ///
    /// # Panics
    ///
    /// Panics if the window exceeds the buffer capacity.
    pub fn set_window(&mut self, offset: usize, length: usize) {
        assert!(
            offset + length <= self.buffer.len(),
            "window exceeds buffer capacity"
        );
        self.offset = offset;
        self.length = length;
    }

    /// The active window as (offset, length)
    #[must_use]
    pub fn window(&self) -> (usize, usize) {
        (self.offset, self.length)
    }

    /// Remaining length of the active window
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Record the kind of the last I/O error observed on this context
    pub fn record_error(&mut self, kind: io::ErrorKind) {
        self.last_error = Some(kind);
    }

    /// The last I/O error kind, if any
    #[must_use]
    pub fn last_error(&self) -> Option<io::ErrorKind> {
        self.last_error
    }

    /// Reset window and error state for reuse
    fn reset(&mut self) {
        self.offset = 0;
        self.length = 0;
        self.last_error = None;
    }
}

/// Statistics for the context pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Contexts newly allocated (pool was empty)
    allocations: AtomicU64,
    /// Contexts reused from the pool
    reuses: AtomicU64,
    /// Contexts returned to the pool
    returns: AtomicU64,
    /// Contexts discarded (pool full or wrong buffer size)
    drops: AtomicU64,
}

impl PoolStats {
    /// Get the number of allocations
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Get the number of reuses
    #[must_use]
    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }

    /// Get the number of returns
    #[must_use]
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Get the number of discarded contexts
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Lock-free pool of I/O contexts with a hard cap
#[derive(Debug)]
pub struct IoContextPool {
    contexts: ArrayQueue<IoContext>,
    buffer_size: usize,
    stats: PoolStats,
}

impl IoContextPool {
    /// Create a pool whose contexts carry buffers of `buffer_size` bytes
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            contexts: ArrayQueue::new(MAX_POOLED),
            buffer_size,
            stats: PoolStats::default(),
        }
    }

    /// Pop a cached context, or allocate a fresh one
    #[must_use]
    pub fn acquire(&self) -> IoContext {
        if let Some(mut ctx) = self.contexts.pop() {
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            ctx.reset();
            ctx
        } else {
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            IoContext::new(self.buffer_size)
        }
    }

    /// Return a context to the pool
    ///
    /// A context whose buffer does not match the pool's buffer size is
    /// discarded, as is any return once the pool holds [`MAX_POOLED`]
    /// entries.
    pub fn release(&self, mut ctx: IoContext) {
        if ctx.capacity() != self.buffer_size {
            self.stats.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }
        ctx.reset();
        match self.contexts.push(ctx) {
            Ok(()) => {
                self.stats.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_ctx) => {
                self.stats.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// The buffer size carried by every pooled context
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of contexts currently cached
    #[must_use]
    pub fn available(&self) -> usize {
        self.contexts.len()
    }

    /// Pool statistics
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}
