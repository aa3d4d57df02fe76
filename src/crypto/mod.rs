// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Handshake and per-session encryption (§4.E).

pub mod handshake;
pub mod secure_socket;

pub use handshake::{EphemeralKeypair, VerifiedPeer, build_handshake_blob, derive_session_key,
                     verify_handshake_blob};
pub use secure_socket::{MAX_CIPHERTEXT, SecureSocket};
