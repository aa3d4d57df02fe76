// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! §8 items 3-5: ring buffer round-trip, out-of-order reassembly under
//! an arbitrary arrival order, and ACK-driven monotonic progress.

use std::time::{Duration, Instant};

use overlay_node::stream::{in_buffer::StreamInBuffer, out_buffer::StreamOutBuffer, ring::{CAPACITY, FixedRingBuffer}};

#[test]
fn ring_buffer_round_trips_arbitrary_writes() {
    let mut ring = FixedRingBuffer::new();
    let data: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(ring.write(&data), data.len());
    let mut out = vec![0u8; data.len()];
    assert_eq!(ring.take(&mut out), data.len());
    assert_eq!(out, data);
    assert_eq!(ring.free(), CAPACITY);
}

#[test]
fn reassembly_is_order_independent() {
    // Five 20-byte segments delivered in a shuffled, non-sequential
    // order must still reassemble into the original contiguous message.
    let message: Vec<u8> = (0..100u8).collect();
    let segments: Vec<(u32, &[u8])> =
        message.chunks(20).enumerate().map(|(i, chunk)| (i as u32 * 20, chunk)).collect();
    let arrival_order = [2, 0, 4, 1, 3];

    let mut buf = StreamInBuffer::new(0);
    for &idx in &arrival_order {
        let (seq, chunk) = segments[idx];
        buf.put_packet(seq, chunk);
    }
    assert_eq!(buf.next_seq(), message.len() as u32);
    let mut out = vec![0u8; message.len()];
    assert_eq!(buf.read(&mut out), message.len());
    assert_eq!(out, message);
}

#[test]
fn duplicate_retransmissions_never_advance_past_what_was_already_delivered() {
    let mut buf = StreamInBuffer::new(0);
    assert!(buf.put_packet(0, b"abcdefgh"));
    let seq_after_first = buf.next_seq();
    // The peer resends the same segment (e.g. its ACK was lost); this
    // must not double-deliver or move next_seq.
    assert!(!buf.put_packet(0, b"abcdefgh"));
    assert_eq!(buf.next_seq(), seq_after_first);
}

#[test]
fn acks_only_ever_move_the_send_window_forward() {
    let mut out = StreamOutBuffer::new(0);
    let now = Instant::now();
    for chunk in [b"aaaa".as_slice(), b"bbbb".as_slice(), b"cccc".as_slice()] {
        out.write(chunk);
    }
    let mut sent_so_far = 0u32;
    while let Some((seq, data)) = out.next_unsent(4, now) {
        sent_so_far = seq + data.len() as u32;
    }
    assert_eq!(sent_so_far, 12);

    let writable_before = out.writable();
    out.ack(4, now + Duration::from_millis(10));
    assert!(out.writable() > writable_before);
    let writable_after_first_ack = out.writable();

    // A stale, lower ack must not un-acknowledge already-freed bytes.
    out.ack(4, now + Duration::from_millis(20));
    assert_eq!(out.writable(), writable_after_first_ack);

    out.ack(12, now + Duration::from_millis(30));
    assert!(!out.has_unacked());
    assert_eq!(out.writable(), CAPACITY);
}
