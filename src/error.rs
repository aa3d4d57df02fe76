// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced across the overlay stack (§7).
//!
//! Internal plumbing still threads `anyhow::Result` through, the way the
//! teacher's `client.rs` does for transport glue; `OverlayError` is the
//! small set of kinds callers actually want to match on at the public API
//! boundary (query completion, socket/stream events, node construction).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    /// A datagram failed to parse or had an invalid length/discriminator.
    /// Dropped silently by the caller; kept here so maintenance code can
    /// count occurrences.
    #[error("malformed datagram")]
    BadDatagram,

    /// A response or session datagram carried a cookie with no matching
    /// pending request or open session.
    #[error("unknown cookie")]
    UnknownCookie,

    /// Signature verification, fingerprint mismatch, or malformed
    /// handshake blob.
    #[error("handshake failed: {0}")]
    HandshakeFailure(&'static str),

    /// A request or stream idle timer fired.
    #[error("timed out")]
    Timeout,

    /// The advertised receive window rejected a write; caller should retry.
    #[error("send window exceeded")]
    WindowExceeded,

    /// The local ring buffer has no space for more unacknowledged bytes.
    #[error("output buffer full")]
    BufferFull,

    /// The peer sent RESET.
    #[error("connection reset by peer")]
    PeerReset,

    /// Binding the UDP socket failed; fatal to `Node::new`.
    #[error("failed to bind UDP socket: {0}")]
    BindFailure(#[source] std::io::Error),

    /// The on-disk identity keypair was malformed.
    #[error("bad identity file: {0}")]
    BadIdentity(String),

    /// A service name was already registered.
    #[error("service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    /// No service registered under the requested name/id.
    #[error("unknown service")]
    UnknownService,
}
