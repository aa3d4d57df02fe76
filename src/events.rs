// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Level-triggered event/callback contract (§9 "Signals/slots for async
//! events"). The original uses Qt signals/slots; this crate instead hands
//! callers an `mpsc::UnboundedReceiver` per `Node` (and per stream) that
//! they poll or `.recv().await` on.

use std::net::SocketAddr;

use crate::id::Identifier;

/// Node-scoped events: routing/search/rendezvous/connection outcomes.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A `find_node`/`find_neighbours` search resolved a target to an
    /// address.
    NodeFound { target: Identifier, addr: SocketAddr },
    /// A search exhausted its candidates without locating the target.
    NodeNotFound { target: Identifier },
    /// `rendezvous(target)` relayed a punch request through at least one
    /// neighbour.
    RendezvousSent { target: Identifier },
    /// No neighbour could relay the rendezvous request.
    RendezvousFailed { target: Identifier },
    /// A `start_connection` handshake completed and the session moved
    /// into `connections`.
    ConnectionEstablished { service: Identifier, peer: Identifier },
    /// A `start_connection` handshake failed (signature, fingerprint
    /// mismatch, or timeout).
    ConnectionFailed { service: Identifier, peer: Identifier },
    /// The last verified routing-table record disappeared.
    Disconnected,
    /// A verified record re-entered the (previously empty) routing table.
    Connected,
}

/// §4.D "every 5s: update I/O rate statistics" — a snapshot of UDP
/// throughput over the interval that just elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IoStats {
    pub bytes_sent_per_sec: f64,
    pub bytes_received_per_sec: f64,
}

/// Stream-scoped events (§9): readability, writability, lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The underlying secure socket handshake completed; the stream is
    /// `OPEN`.
    Established,
    /// Bytes are ready to read via `SecureStream::read`.
    DataAvailable,
    /// The output buffer has room again after being full.
    Writable,
    /// The peer sent RESET.
    Reset,
    /// The stream hit an unrecoverable error (handshake failure, idle
    /// timeout).
    Error,
}
