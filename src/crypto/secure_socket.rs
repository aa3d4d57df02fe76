// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! AES-128-GCM record layer for an established session (§4.E, §9
//! "Nonce construction").
//!
//! Wire layout of one session datagram, after the leading 20-byte
//! cookie (`streamId`) is stripped by the caller: `seq(8, BE) ‖ tag(16)
//! ‖ ciphertext`. The nonce is fixed at exactly 12 bytes, built as
//! `IV_fixed(4) ‖ seq_be(8)` — the Open Question in §9 names this
//! layout explicitly and forbids any other.

use aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use rand::RngCore;

use crate::{error::OverlayError, id::Identifier, wire::message::MAX_DATA};

/// Bytes of session overhead per datagram: 8-byte sequence number plus
/// 16-byte GCM tag.
pub const SESSION_OVERHEAD: usize = 8 + 16;

/// Largest ciphertext (= plaintext, GCM does not expand) a single
/// session datagram can carry once the cookie and session overhead are
/// both accounted for.
pub const MAX_CIPHERTEXT: usize = MAX_DATA - SESSION_OVERHEAD;

/// One established, keyed AES-128-GCM channel to a peer, identified on
/// the wire by `stream_id` (the `streamId` cookie). Built from the key
/// material `crypto::handshake::derive_session_key` returns.
pub struct SecureSocket {
    pub stream_id: Identifier,
    pub peer_id: Identifier,
    cipher: Aes128Gcm,
    iv_fixed: [u8; 4],
    out_seq: u64,
}

impl SecureSocket {
    pub fn new(stream_id: Identifier, peer_id: Identifier, key: [u8; 16], iv: [u8; 16]) -> Self {
        let cipher = Aes128Gcm::new_from_slice(&key).expect("16-byte key is always valid");
        let mut iv_fixed = [0u8; 4];
        iv_fixed.copy_from_slice(&iv[0..4]);
        // Key and IV are the same for both directions (derived once from
        // the shared ECDH secret), so the two directions must pick their
        // outgoing sequence numbers independently at random — starting
        // both sides at the same counter would let the two directions'
        // nonces collide under the same key.
        let out_seq = rand::rng().next_u64();
        SecureSocket { stream_id, peer_id, cipher, iv_fixed, out_seq }
    }

    fn nonce(&self, seq: u64) -> Nonce {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&self.iv_fixed);
        bytes[4..12].copy_from_slice(&seq.to_be_bytes());
        *Nonce::from_slice(&bytes)
    }

    /// Encrypt `plaintext` into one ready-to-send record: `streamId ‖
    /// seq ‖ tag ‖ ciphertext`. Advances the outgoing sequence number by
    /// the ciphertext length, per §9.
    pub fn encrypt_record(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, OverlayError> {
        if plaintext.len() > MAX_CIPHERTEXT {
            return Err(OverlayError::BadDatagram);
        }
        let seq = self.out_seq;
        let nonce = self.nonce(seq);
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|_| OverlayError::HandshakeFailure("encryption failure"))?;

        let mut record = Vec::with_capacity(20 + 8 + 16 + buffer.len());
        record.extend_from_slice(self.stream_id.as_bytes());
        record.extend_from_slice(&seq.to_be_bytes());
        record.extend_from_slice(&tag);
        record.extend_from_slice(&buffer);

        self.out_seq += buffer.len() as u64;
        Ok(record)
    }

    /// Decrypt a datagram body with the leading `streamId` cookie
    /// already stripped: `seq(8) ‖ tag(16) ‖ ciphertext`. A failed MAC
    /// is reported as `BadDatagram`; callers must drop such datagrams
    /// silently rather than treat them as a protocol error (§4.E).
    pub fn decrypt_record(&self, body: &[u8]) -> Result<Vec<u8>, OverlayError> {
        if body.len() < SESSION_OVERHEAD {
            return Err(OverlayError::BadDatagram);
        }
        let (seq_bytes, rest) = body.split_at(8);
        let (tag_bytes, ciphertext) = rest.split_at(16);
        let seq = u64::from_be_bytes(seq_bytes.try_into().expect("8 bytes"));
        let nonce = self.nonce(seq);
        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(&nonce, b"", &mut buffer, tag_bytes.into())
            .map_err(|_| OverlayError::BadDatagram)?;
        Ok(buffer)
    }
}
