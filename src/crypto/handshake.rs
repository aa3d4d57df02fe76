// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! ECDH handshake: blob construction, verification, and key derivation
//! (§4.E).

use p256::{
    PublicKey,
    ecdh::EphemeralSecret,
    ecdsa::{Signature, signature::Verifier},
};
use sha2::{Digest, Sha256};

use crate::{
    error::OverlayError,
    id::Identifier,
    identity::{Identity, PeerIdentity},
    wire::message::HandshakeBlob,
};

/// A freshly generated ephemeral ECDH keypair, used once per handshake
/// and discarded afterward (forward secrecy for the session key).
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public_sec1: Vec<u8>,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut rand_core::OsRng);
        let public_sec1 = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
        EphemeralKeypair { secret, public_sec1 }
    }

    pub fn public_bytes(&self) -> &[u8] {
        &self.public_sec1
    }
}

/// Build `{identityPub, ephPub, Sign_identity(ephPub)}` for the CONNECT
/// request or response (§4.E).
pub fn build_handshake_blob(identity: &Identity, eph: &EphemeralKeypair) -> HandshakeBlob {
    let sig = identity.sign(eph.public_bytes());
    HandshakeBlob {
        identity_pub: identity.public_key_bytes(),
        eph_pub: eph.public_bytes().to_vec(),
        sig: sig.to_bytes().to_vec(),
    }
}

/// Result of a successfully verified handshake blob: the peer's
/// reconstructed identity and their ephemeral public key (still needs
/// combining with our own ephemeral secret via `derive_session_key`).
pub struct VerifiedPeer {
    pub identity: PeerIdentity,
    pub eph_pub: Vec<u8>,
}

/// §4.E verification steps 1-2 (and 4, for initiators):
/// 1. parse the peer identity and compute its fingerprint,
/// 2. verify `Sign_identity(ephPub)`,
/// 4. for initiators, assert the fingerprint matches the expected target
///    (prevents a third party masquerading at a known address).
pub fn verify_handshake_blob(
    blob: &HandshakeBlob,
    expected_peer: Option<&Identifier>,
) -> Result<VerifiedPeer, OverlayError> {
    let identity = PeerIdentity::from_public_key_bytes(&blob.identity_pub)?;

    let sig = Signature::from_slice(&blob.sig)
        .map_err(|_| OverlayError::HandshakeFailure("malformed signature"))?;
    if !identity.verify(&blob.eph_pub, &sig) {
        return Err(OverlayError::HandshakeFailure("ephemeral key signature invalid"));
    }

    if let Some(expected) = expected_peer
        && identity.fingerprint() != *expected
    {
        return Err(OverlayError::HandshakeFailure("peer fingerprint mismatch"));
    }

    Ok(VerifiedPeer { identity, eph_pub: blob.eph_pub.clone() })
}

/// §4.E step 3: `Z = ECDH(ephPriv, peerEphPub)`, then `K‖IV =
/// SHA-256(Z)`, retaining 16 bytes of each.
///
/// Takes `my_eph` by value: `EphemeralSecret` is deliberately not
/// `Clone` (the whole point of an ephemeral key is that it is used
/// once), and its `diffie_hellman` consumes `self`.
pub fn derive_session_key(
    my_eph: EphemeralKeypair,
    peer_eph_pub: &[u8],
) -> Result<([u8; 16], [u8; 16]), OverlayError> {
    let peer_public = PublicKey::from_sec1_bytes(peer_eph_pub)
        .map_err(|_| OverlayError::HandshakeFailure("invalid peer ephemeral key"))?;

    let shared = my_eph.secret.diffie_hellman(&peer_public);

    let digest = Sha256::digest(shared.raw_secret_bytes());
    let mut key = [0u8; 16];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&digest[0..16]);
    iv.copy_from_slice(&digest[16..32]);
    Ok((key, iv))
}
