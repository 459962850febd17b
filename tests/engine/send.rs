//! Send path: single packets, chunking, and callback ordering

use std::sync::Arc;

use tokio::io::AsyncReadExt;

use tcplink::{Packet, SendStatus};

use super::{eventually, Event, Harness};

#[tokio::test]
async fn single_small_packet() {
    let mut h = Harness::with_buffer_size(4096).await;

    let packet = Arc::new(Packet::new(&[0x01u8, 0x02, 0x03][..]));
    h.connection.begin_send(Arc::clone(&packet)).await;

    // The payload arrives intact at the peer
    let mut buf = [0u8; 3];
    h.peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x01, 0x02, 0x03]);

    h.hooks
        .wait_until(|events| {
            events.iter().any(|e| {
                matches!(
                    e,
                    Event::SendComplete {
                        status: SendStatus::Success,
                        ..
                    }
                )
            })
        })
        .await;

    // Start-sending precedes send-complete
    let events = h.hooks.events();
    let start = events
        .iter()
        .position(|e| matches!(e, Event::StartSending { len: 3, .. }))
        .expect("start-sending fired");
    let complete = events
        .iter()
        .position(|e| matches!(e, Event::SendComplete { len: 3, .. }))
        .expect("send-complete fired");
    assert!(start < complete);

    assert!(packet.is_sent());
    assert_eq!(packet.sent(), 3);

    // The queue drains back to not-sending
    eventually(|| !h.connection.is_sending()).await;
    assert!(h.connection.current_packet().is_none());
    assert_eq!(h.connection.stats().packets_sent(), 1);
    assert_eq!(h.connection.stats().bytes_sent(), 3);
}

#[tokio::test]
async fn packet_larger_than_buffer_is_chunked() {
    // 40 payload bytes through a 16-byte context buffer: three chunks
    let mut h = Harness::with_buffer_size(16).await;

    let payload: Vec<u8> = (0..40u8).collect();
    let packet = Arc::new(Packet::new(payload.clone()));
    h.connection.begin_send(Arc::clone(&packet)).await;

    let mut received = vec![0u8; 40];
    h.peer.read_exact(&mut received).await.unwrap();
    assert_eq!(received, payload);

    h.hooks
        .wait_until(|events| {
            events
                .iter()
                .any(|e| matches!(e, Event::SendComplete { .. }))
        })
        .await;

    // Exactly one completion, successful, with the cursor at the end
    assert_eq!(
        h.hooks.count(|e| matches!(e, Event::SendComplete { .. })),
        1
    );
    assert_eq!(
        h.hooks.count(|e| matches!(
            e,
            Event::SendComplete {
                status: SendStatus::Success,
                ..
            }
        )),
        1
    );
    assert_eq!(packet.sent(), 40);
    assert_eq!(h.connection.stats().bytes_sent(), 40);
}

#[tokio::test]
async fn empty_packet_completes_without_touching_the_socket() {
    let h = Harness::with_buffer_size(64).await;

    let packet = Arc::new(Packet::new(Vec::new()));
    h.connection.begin_send(Arc::clone(&packet)).await;

    h.hooks
        .wait_until(|events| {
            events.iter().any(|e| {
                matches!(
                    e,
                    Event::SendComplete {
                        status: SendStatus::Success,
                        ..
                    }
                )
            })
        })
        .await;
    assert_eq!(h.connection.stats().bytes_sent(), 0);
}

#[tokio::test]
async fn completions_fire_in_submission_order() {
    let mut h = Harness::with_buffer_size(8).await;

    // Distinct lengths let the completion events identify their packet
    let packets: Vec<Arc<Packet>> = (1..=50usize)
        .map(|len| Arc::new(Packet::new(vec![len as u8; len])))
        .collect();
    for packet in &packets {
        h.connection.begin_send(Arc::clone(packet)).await;
    }

    let total: usize = (1..=50).sum();
    let mut received = vec![0u8; total];
    h.peer.read_exact(&mut received).await.unwrap();

    h.hooks
        .wait_until(|events| {
            events
                .iter()
                .filter(|e| matches!(e, Event::SendComplete { .. }))
                .count()
                == 50
        })
        .await;

    // Wire bytes are the payloads back to back, in order
    let mut expected = Vec::with_capacity(total);
    for packet in &packets {
        expected.extend_from_slice(packet.payload());
    }
    assert_eq!(received, expected);

    // Completion order matches submission order, all successful
    let completions: Vec<(usize, SendStatus)> = h
        .hooks
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::SendComplete { len, status, .. } => Some((*len, *status)),
            _ => None,
        })
        .collect();
    let expected_order: Vec<(usize, SendStatus)> =
        (1..=50).map(|len| (len, SendStatus::Success)).collect();
    assert_eq!(completions, expected_order);

    // Start-sending precedes completion for every packet
    let events = h.hooks.events();
    for len in 1..=50usize {
        let start = events
            .iter()
            .position(|e| matches!(e, Event::StartSending { len: l, .. } if *l == len))
            .unwrap_or_else(|| panic!("no start-sending for len {len}"));
        let complete = events
            .iter()
            .position(|e| matches!(e, Event::SendComplete { len: l, .. } if *l == len))
            .unwrap_or_else(|| panic!("no send-complete for len {len}"));
        assert!(start < complete);
    }
}
