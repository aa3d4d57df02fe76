// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reliable in-order byte stream atop one `SecureSocket` (§4.F).
//!
//! Three independent timers drive a stream forward, all serviced from
//! `tick`, called once per `stream_packet_timer_interval` from the
//! owning `Node`'s event loop (§5 — one cooperative loop, no per-stream
//! tasks):
//! - the packet timer (100ms): resend timed-out segments, send freshly
//!   written bytes, flush a pending ACK;
//! - the keep-alive timer (5s): an empty `Data` frame if nothing else
//!   was sent, to hold the NAT mapping open;
//! - the idle timeout (30s): no frame received at all closes the
//!   stream with `StreamEvent::Error`.

use std::{net::SocketAddr, time::Instant};

use crate::{
    config::NodeConfig,
    crypto::secure_socket::{MAX_CIPHERTEXT, SecureSocket},
    error::OverlayError,
    events::StreamEvent,
    stream::{frame::StreamFrame, in_buffer::StreamInBuffer, out_buffer::StreamOutBuffer},
};

/// Frame header overhead subtracted from `MAX_CIPHERTEXT` to get the
/// maximum `Data` payload: 1 tag byte + 4-byte sequence number.
const FRAME_OVERHEAD: usize = 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The secure socket has not finished its handshake yet; this
    /// stream exists only to be handed events once it does.
    Initialized,
    Open,
    /// User `close()` called; no more writes accepted, draining the
    /// output buffer before sending `Reset` (§9 Open Questions).
    Closing,
    Closed,
}

pub struct SecureStream {
    socket: SecureSocket,
    peer_addr: SocketAddr,
    state: StreamState,
    in_buf: StreamInBuffer,
    out_buf: StreamOutBuffer,
    last_acked_seq: Option<u32>,
    ack_owed: bool,
    last_activity: Instant,
    last_send: Instant,
    next_keepalive_at: Instant,
    next_packet_tick_at: Instant,
}

impl SecureStream {
    pub fn new(socket: SecureSocket, peer_addr: SocketAddr, initial_seq: u32, now: Instant) -> Self {
        SecureStream {
            socket,
            peer_addr,
            state: StreamState::Open,
            in_buf: StreamInBuffer::new(initial_seq),
            out_buf: StreamOutBuffer::new(initial_seq),
            last_acked_seq: None,
            ack_owed: false,
            last_activity: now,
            last_send: now,
            next_keepalive_at: now,
            next_packet_tick_at: now,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn peer_id(&self) -> crate::id::Identifier {
        self.socket.peer_id
    }

    /// Queue application bytes for sending; returns how many were
    /// accepted (§4.F "send window exceeded" edge case: callers must
    /// retry the remainder once `writable()` grows).
    pub fn write(&mut self, data: &[u8]) -> Result<usize, OverlayError> {
        if self.state != StreamState::Open {
            return Err(OverlayError::PeerReset);
        }
        Ok(self.out_buf.write(data))
    }

    pub fn writable(&self) -> usize {
        self.out_buf.writable()
    }

    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.in_buf.read(out)
    }

    /// Begin a graceful close: `RESET` is sent on the next packet tick,
    /// once every byte queued ahead of it has drained (§9 Open Questions).
    pub fn close(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Closing;
        }
    }

    /// Decrypt one session datagram body (`streamId` already stripped
    /// by the caller) and feed it in. A MAC failure is dropped silently,
    /// matching `on_plaintext`'s handling of an undecodable frame.
    pub fn on_datagram(&mut self, now: Instant, body: &[u8]) -> Vec<StreamEvent> {
        match self.socket.decrypt_record(body) {
            Ok(plaintext) => self.on_plaintext(now, &plaintext),
            Err(_) => vec![],
        }
    }

    /// Feed one decrypted stream frame in. Returns the events callers
    /// should forward to whatever is consuming `StreamEvent`s for this
    /// stream.
    pub fn on_plaintext(&mut self, now: Instant, payload: &[u8]) -> Vec<StreamEvent> {
        self.last_activity = now;
        let frame = match StreamFrame::decode(payload) {
            Ok(f) => f,
            Err(_) => return vec![],
        };
        match frame {
            // An empty payload is a bare keep-alive; nothing to acknowledge.
            StreamFrame::Data { seq, payload } if !payload.is_empty() => {
                if self.in_buf.put_packet(seq, &payload) {
                    self.ack_owed = true;
                    vec![StreamEvent::DataAvailable]
                } else {
                    vec![]
                }
            },
            StreamFrame::Data { .. } => vec![],
            StreamFrame::Ack { ack, window: _ } => {
                let was_full = self.out_buf.writable() == 0;
                self.out_buf.ack(ack, now);
                if was_full && self.out_buf.writable() > 0 {
                    vec![StreamEvent::Writable]
                } else {
                    vec![]
                }
            },
            StreamFrame::Reset => {
                self.state = StreamState::Closed;
                vec![StreamEvent::Reset]
            },
            // Reserved, never emitted (§9 Open Questions): graceful close
            // is signalled by RESET from CLOSING, not by FIN. Ignore.
            StreamFrame::Fin { .. } => vec![],
        }
    }

    /// Service the packet/keep-alive/idle timers. Returns the
    /// already-encrypted datagrams to send (addressed to `peer_addr`)
    /// and any events to surface.
    pub fn tick(&mut self, now: Instant, cfg: &NodeConfig) -> (Vec<Vec<u8>>, Vec<StreamEvent>) {
        let mut out = Vec::new();
        let mut events = Vec::new();

        if now.duration_since(self.last_activity) > cfg.stream_idle_timeout {
            self.state = StreamState::Closed;
            events.push(StreamEvent::Error);
            return (out, events);
        }

        if now < self.next_packet_tick_at {
            return (out, events);
        }
        self.next_packet_tick_at = now + cfg.stream_packet_timer_interval;

        let mss = MAX_CIPHERTEXT - FRAME_OVERHEAD;

        for (seq, payload) in self.out_buf.timed_out(now) {
            if let Ok(record) = self.encode_and_encrypt(&StreamFrame::Data { seq, payload }) {
                out.push(record);
                self.last_send = now;
            }
        }

        while let Some((seq, payload)) = self.out_buf.next_unsent(mss, now) {
            if let Ok(record) = self.encode_and_encrypt(&StreamFrame::Data { seq, payload }) {
                out.push(record);
                self.last_send = now;
            }
        }

        if self.ack_owed {
            let ack = StreamFrame::Ack { ack: self.in_buf.next_seq(), window: self.in_buf.window() };
            if let Ok(record) = self.encode_and_encrypt(&ack) {
                out.push(record);
                self.last_acked_seq = Some(self.in_buf.next_seq());
                self.ack_owed = false;
            }
        }

        // Graceful close (§4.F, §9 Open Questions): once every buffered
        // byte has drained, send RESET and move straight to CLOSED —
        // the original's `FIN` marker is reserved but unused.
        if self.state == StreamState::Closing && !self.out_buf.has_unacked() {
            if let Ok(record) = self.encode_and_encrypt(&StreamFrame::Reset) {
                out.push(record);
                self.last_send = now;
            }
            self.state = StreamState::Closed;
        }

        if now >= self.next_keepalive_at {
            self.next_keepalive_at = now + cfg.stream_keepalive_interval;
            if now.duration_since(self.last_send) >= cfg.stream_keepalive_interval
                && self.state == StreamState::Open
                && let Ok(record) = self
                    .encode_and_encrypt(&StreamFrame::Ack { ack: self.in_buf.next_seq(), window: self.in_buf.window() })
            {
                out.push(record);
                self.last_send = now;
            }
        }

        (out, events)
    }

    /// Send `RESET` immediately and tear the stream down locally.
    pub fn reset(&mut self) -> Option<Vec<u8>> {
        self.state = StreamState::Closed;
        self.encode_and_encrypt(&StreamFrame::Reset).ok()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn encode_and_encrypt(&mut self, frame: &StreamFrame) -> Result<Vec<u8>, OverlayError> {
        self.socket.encrypt_record(&frame.encode())
    }
}
