//! Outbound packet type
//!
//! A packet is an immutable byte payload with an atomic progress cursor.
//! The cursor tracks how many payload bytes have been handed to the OS; the
//! send path advances it chunk by chunk and resets it when a packet fails.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

/// Outcome of a packet send, delivered through the send-complete hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The full payload was handed to the OS
    Success,
    /// The packet was abandoned (connection closing or I/O failure)
    Failed,
}

/// An application-provided outbound byte payload with a progress cursor
///
/// Packets are shared as `Arc<Packet>` between the submitter, the send queue,
/// and the send loop, so the cursor is atomic. The payload itself never
/// changes after construction.
#[derive(Debug)]
pub struct Packet {
    payload: Bytes,
    sent: AtomicUsize,
}

impl Packet {
    /// Create a packet from a payload
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            sent: AtomicUsize::new(0),
        }
    }

    /// The immutable payload
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes handed to the OS so far
    #[must_use]
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }

    /// Bytes still to send
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.sent()
    }

    /// Whether the entire payload has been handed to the OS
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent() == self.payload.len()
    }

    /// Advance the cursor by `n` bytes
    ///
    /// Only the send loop calls this; the cursor never exceeds the payload
    /// length.
    pub(crate) fn advance(&self, n: usize) {
        let prev = self.sent.fetch_add(n, Ordering::AcqRel);
        debug_assert!(prev + n <= self.payload.len());
    }

    /// Reset the cursor to 0
    ///
    /// Failed packets report a cursor of 0 regardless of how far they got.
    pub(crate) fn reset(&self) {
        self.sent.store(0, Ordering::Release);
    }
}
