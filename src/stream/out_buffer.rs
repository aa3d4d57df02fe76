// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Send-side buffering, in-flight segment tracking, and the adaptive
//! retransmission timeout estimator (§4.F).

use std::{collections::VecDeque, time::Instant};

use crate::stream::ring::FixedRingBuffer;

/// Width of the RTT sample window the RTO estimate is drawn from.
const RTT_SAMPLES: usize = 64;

/// Used before any RTT sample has been taken.
const INITIAL_RTO_MILLIS: u64 = 2000;
const MIN_RTO_MILLIS: u64 = 200;
const MAX_RTO_MILLIS: u64 = 60_000;

struct InFlight {
    seq: u32,
    len: usize,
    sent_at: Instant,
    retries: u32,
}

/// Rolling mean/variance over the last `RTT_SAMPLES` round-trip times,
/// estimating the retransmission timeout as `mean + 3 * stddev` (§4.F).
#[derive(Default)]
struct RttEstimator {
    samples: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RttEstimator {
    fn observe(&mut self, rtt: std::time::Duration) {
        let ms = rtt.as_secs_f64() * 1000.0;
        self.samples.push_back(ms);
        self.sum += ms;
        self.sum_sq += ms * ms;
        if self.samples.len() > RTT_SAMPLES {
            let dropped = self.samples.pop_front().expect("just checked len > 0");
            self.sum -= dropped;
            self.sum_sq -= dropped * dropped;
        }
    }

    fn rto(&self) -> std::time::Duration {
        if self.samples.is_empty() {
            return std::time::Duration::from_millis(INITIAL_RTO_MILLIS);
        }
        let n = self.samples.len() as f64;
        let mean = self.sum / n;
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        let stddev = variance.sqrt();
        let estimate = (mean + 3.0 * stddev).round() as u64;
        std::time::Duration::from_millis(estimate.clamp(MIN_RTO_MILLIS, MAX_RTO_MILLIS))
    }
}

/// Bytes written by the application, tracked through sending and
/// waiting for cumulative ACK.
pub struct StreamOutBuffer {
    ring: FixedRingBuffer,
    /// Sequence number of the first byte still held in `ring`.
    base_seq: u32,
    /// Bytes from the start of `ring` that have already been sent at
    /// least once.
    sent_len: usize,
    in_flight: VecDeque<InFlight>,
    rtt: RttEstimator,
}

impl StreamOutBuffer {
    pub fn new(initial_seq: u32) -> Self {
        StreamOutBuffer {
            ring: FixedRingBuffer::new(),
            base_seq: initial_seq,
            sent_len: 0,
            in_flight: VecDeque::new(),
            rtt: RttEstimator::default(),
        }
    }

    /// Buffer application bytes for sending; returns how many were
    /// accepted (the rest must be retried once `writable()` grows).
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.ring.write(data)
    }

    /// Bytes still free for `write` without blocking.
    pub fn writable(&self) -> usize {
        self.ring.free()
    }

    /// Next chunk of unsent bytes, up to `mss`, marked as sent `now`.
    /// Returns `None` once every buffered byte is in flight.
    pub fn next_unsent(&mut self, mss: usize, now: Instant) -> Option<(u32, Vec<u8>)> {
        let unsent = self.ring.available() - self.sent_len;
        if unsent == 0 {
            return None;
        }
        let len = unsent.min(mss);
        let mut chunk = vec![0u8; self.sent_len + len];
        self.ring.peek(&mut chunk);
        let data = chunk[self.sent_len..].to_vec();
        let seq = self.base_seq.wrapping_add(self.sent_len as u32);
        self.in_flight.push_back(InFlight { seq, len: data.len(), sent_at: now, retries: 0 });
        self.sent_len += data.len();
        Some((seq, data))
    }

    /// Apply a cumulative ACK: drop fully-acknowledged in-flight
    /// segments, fold their RTT into the estimator, and free their
    /// bytes from the ring.
    pub fn ack(&mut self, cumulative_ack: u32, now: Instant) {
        let mut dropped = 0usize;
        while let Some(front) = self.in_flight.front() {
            let end = front.seq.wrapping_add(front.len as u32);
            if !seq_at_or_before(end, cumulative_ack) {
                break;
            }
            let front = self.in_flight.pop_front().expect("just peeked");
            if front.retries == 0 {
                self.rtt.observe(now.duration_since(front.sent_at));
            }
            dropped += front.len;
        }
        if dropped > 0 {
            self.ring.drop_front(dropped);
            self.base_seq = self.base_seq.wrapping_add(dropped as u32);
            self.sent_len -= dropped;
        }
    }

    /// Segments whose RTO has elapsed, re-marked as sent `now` for the
    /// next round. Callers re-transmit the returned `(seq, data)` pairs
    /// verbatim.
    pub fn timed_out(&mut self, now: Instant) -> Vec<(u32, Vec<u8>)> {
        let rto = self.rtt.rto();
        let mut out = Vec::new();
        let mut chunk = vec![0u8; self.sent_len];
        self.ring.peek(&mut chunk);
        for seg in self.in_flight.iter_mut() {
            if now.duration_since(seg.sent_at) < rto {
                continue;
            }
            let offset = seg.seq.wrapping_sub(self.base_seq) as usize;
            out.push((seg.seq, chunk[offset..offset + seg.len].to_vec()));
            seg.sent_at = now;
            seg.retries += 1;
        }
        out
    }

    pub fn has_unacked(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn rto(&self) -> std::time::Duration {
        self.rtt.rto()
    }
}

fn seq_at_or_before(a: u32, b: u32) -> bool {
    a == b || (a.wrapping_sub(b) as i32) < 0
}
