// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Long-term identity keypair (§4.B).
//!
//! Curve and hash are fixed by the wire format (§9 "Hash agility"): ECDSA
//! over P-256, RIPEMD-160 fingerprints. The public key is carried on the
//! wire (and hashed for the fingerprint) in SEC1 uncompressed point form
//! rather than full X.509/PKCS8 DER — see DESIGN.md for why.

use std::{fs, path::Path};

use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer, signature::Verifier};
use ripemd::{Digest, Ripemd160};

use crate::{
    error::OverlayError,
    id::{ID_LEN, Identifier},
};

/// Long-term ECDSA P-256 keypair identifying a node. `fingerprint()` is the
/// 20-byte RIPEMD-160 hash of the public key's SEC1 encoding and doubles
/// as the node's `Identifier` on the overlay.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh keypair from a cryptographically secure RNG.
    pub fn new() -> Self {
        Identity {
            signing_key: SigningKey::random(&mut rand_core_compat()),
        }
    }

    /// Load a keypair from its raw 32-byte scalar encoding on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverlayError> {
        let bytes = fs::read(path.as_ref())
            .map_err(|e| OverlayError::BadIdentity(format!("read failed: {e}")))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| OverlayError::BadIdentity(format!("invalid key bytes: {e}")))?;
        Ok(Identity { signing_key })
    }

    /// Persist the raw 32-byte scalar encoding to disk.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OverlayError> {
        let bytes = self.signing_key.to_bytes();
        fs::write(path.as_ref(), bytes)
            .map_err(|e| OverlayError::BadIdentity(format!("write failed: {e}")))
    }

    /// SEC1 uncompressed public key bytes (65 bytes: `0x04 || X || Y`).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let verifying_key = VerifyingKey::from(&self.signing_key);
        verifying_key.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        self.signing_key.sign(data)
    }

    pub fn verify(&self, data: &[u8], sig: &Signature) -> bool {
        VerifyingKey::from(&self.signing_key).verify(data, sig).is_ok()
    }

    /// 20-byte RIPEMD-160 fingerprint of `public_key_bytes()`; this is the
    /// node's `Identifier` on the overlay.
    pub fn fingerprint(&self) -> Identifier {
        fingerprint_of(&self.public_key_bytes())
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

/// A peer's identity as reconstructed from the wire (§4.E handshake): only
/// the public key is known, signing is unavailable.
#[derive(Clone)]
pub struct PeerIdentity {
    verifying_key: VerifyingKey,
}

impl PeerIdentity {
    /// Parse a SEC1-encoded public key received over the wire.
    pub fn from_public_key_bytes(bytes: &[u8]) -> Result<Self, OverlayError> {
        let verifying_key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| OverlayError::HandshakeFailure("invalid peer public key"))?;
        Ok(PeerIdentity { verifying_key })
    }

    pub fn verify(&self, data: &[u8], sig: &Signature) -> bool {
        self.verifying_key.verify(data, sig).is_ok()
    }

    pub fn fingerprint(&self) -> Identifier {
        fingerprint_of(self.verifying_key.to_encoded_point(false).as_bytes())
    }
}

fn fingerprint_of(public_key_bytes: &[u8]) -> Identifier {
    let mut hasher = Ripemd160::new();
    hasher.update(public_key_bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; ID_LEN];
    out.copy_from_slice(&digest);
    Identifier::from_bytes(out)
}

/// `p256`/`signature` draw randomness through `rand_core`'s `CryptoRng`;
/// `rand`'s default generator already implements that trait, this just
/// names the concrete type at the one call site that needs it spelled
/// out.
fn rand_core_compat() -> impl rand_core::CryptoRng + rand_core::RngCore {
    rand_core::OsRng
}
