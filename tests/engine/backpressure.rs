//! End-to-end send-queue backpressure against a stalled peer

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use tcplink::{Packet, SendStatus, SEND_QUEUE_LIMIT};

use super::{Event, Harness};

#[tokio::test]
async fn full_queue_blocks_submitters_until_the_peer_drains() {
    let mut h = Harness::with_buffer_size(64 * 1024).await;

    // A payload far beyond what loopback buffering absorbs wedges the send
    // loop mid-packet while the peer reads nothing.
    const WEDGE: usize = 32 * 1024 * 1024;
    let wedge = Arc::new(Packet::new(vec![0xAAu8; WEDGE]));
    h.connection.begin_send(Arc::clone(&wedge)).await;

    // Fill the waiting list behind it
    let queued: Vec<Arc<Packet>> = (0..SEND_QUEUE_LIMIT)
        .map(|i| Arc::new(Packet::new(vec![i as u8; 16])))
        .collect();
    for packet in &queued {
        h.connection.begin_send(Arc::clone(packet)).await;
    }

    // One more submission must block until the peer frees a slot
    let overflow = Arc::new(Packet::new(vec![0xBBu8; 16]));
    let mut blocked = {
        let connection = Arc::clone(&h.connection);
        let overflow = Arc::clone(&overflow);
        tokio::spawn(async move {
            connection.begin_send(overflow).await;
        })
    };
    let still_blocked = tokio::time::timeout(Duration::from_millis(100), &mut blocked).await;
    assert!(
        still_blocked.is_err(),
        "submitter completed while the queue was full"
    );

    // Drain everything at the peer; the blocked submitter gets its slot as
    // soon as the wedge finishes and the queue starts moving.
    let total = WEDGE + SEND_QUEUE_LIMIT * 16 + 16;
    let mut drained = 0usize;
    let mut buf = vec![0u8; 1024 * 1024];
    while drained < total {
        let n = h.peer.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer saw EOF before the stream finished");
        drained += n;
    }
    assert_eq!(drained, total);

    tokio::time::timeout(Duration::from_secs(5), blocked)
        .await
        .expect("blocked submitter never admitted")
        .unwrap();

    // No packet lost: every submission completes successfully
    h.hooks
        .wait_until(|events| {
            events
                .iter()
                .filter(|e| matches!(e, Event::SendComplete { .. }))
                .count()
                == 1 + SEND_QUEUE_LIMIT + 1
        })
        .await;
    assert_eq!(
        h.hooks.count(|e| matches!(
            e,
            Event::SendComplete {
                status: SendStatus::Failed,
                ..
            }
        )),
        0
    );
    assert!(wedge.is_sent());
    assert!(overflow.is_sent());
}
