//! Per-connection send queue
//!
//! Outgoing packets on a connection are serialized through this queue: the
//! first submitter becomes the sender and drives the socket, later packets
//! wait their turn in FIFO order, and the waiting list is bounded. A
//! submitter that finds the list full awaits a slot instead of spinning, so
//! backpressure propagates to producers without dropping or reordering
//! anything.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::packet::Packet;

/// Maximum number of packets waiting behind the in-flight one
pub const SEND_QUEUE_LIMIT: usize = 500;

/// Outcome of submitting a packet to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The caller is now the sender and must drive the send loop;
    /// the packet was not placed in the waiting list
    Sender,
    /// A send is already in flight; the packet waits its turn
    Enqueued,
    /// The queue was closed; the packet must be failed immediately
    Closed,
}

#[derive(Debug)]
struct QueueInner {
    sending: bool,
    closed: bool,
    waiting: VecDeque<Arc<Packet>>,
}

/// Bounded, serialized outbound queue for one connection
#[derive(Debug)]
pub struct SendQueue {
    inner: Mutex<QueueInner>,
    slots: Notify,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SendQueue {
    /// Create an open, idle queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                sending: false,
                closed: false,
                waiting: VecDeque::new(),
            }),
            slots: Notify::new(),
        }
    }

    /// Submit a packet
    ///
    /// Awaits a free slot when the waiting list is at [`SEND_QUEUE_LIMIT`];
    /// the wait ends when the in-flight send dequeues a packet or the queue
    /// closes. FIFO order among submitters is preserved by the waiting list
    /// itself.
    pub async fn submit(&self, packet: Arc<Packet>) -> Submission {
        loop {
            // Register interest before re-checking so a slot freed between
            // the check and the await is not missed.
            let slot_freed = self.slots.notified();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Submission::Closed;
                }
                if !inner.sending {
                    inner.sending = true;
                    return Submission::Sender;
                }
                if inner.waiting.len() < SEND_QUEUE_LIMIT {
                    inner.waiting.push_back(packet);
                    return Submission::Enqueued;
                }
            }
            slot_freed.await;
        }
    }

    /// Dequeue the next packet, or leave sending state if none is waiting
    ///
    /// Returns `None` exactly when the queue atomically transitions to
    /// not-sending (or is closed); otherwise the queue stays in sending
    /// state and one backpressure slot is freed.
    pub fn next(&self) -> Option<Arc<Packet>> {
        let mut inner = self.inner.lock();
        match inner.waiting.pop_front() {
            Some(packet) => {
                self.slots.notify_one();
                Some(packet)
            }
            None => {
                inner.sending = false;
                None
            }
        }
    }

    /// Close the queue and drain the waiting list
    ///
    /// Returns `None` if the queue was already closed; otherwise the drained
    /// packets (possibly empty), which the caller is responsible for
    /// failing. The in-flight packet, if any, is not in the list. Blocked
    /// submitters are woken and observe `Closed`.
    pub fn close(&self) -> Option<Vec<Arc<Packet>>> {
        let drained = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return None;
            }
            inner.closed = true;
            inner.waiting.drain(..).collect()
        };
        self.slots.notify_waiters();
        Some(drained)
    }

    /// Whether a packet is in flight or just dequeued for flight
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.inner.lock().sending
    }

    /// Whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of packets currently waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    /// Whether the waiting list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().waiting.is_empty()
    }
}
