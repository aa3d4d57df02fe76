// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 160-bit node identifiers and the XOR distance metric (§3, §4.A).

use std::fmt;

use data_encoding::BASE32;
use rand::RngCore;

/// Width in bytes of every identifier on the wire: fingerprints, request
/// cookies, session stream ids, network ids. Many other wire constants
/// (triple layout, max triples per SEARCH response) depend on this being
/// exactly 20.
pub const ID_LEN: usize = 20;

/// A 160-bit identifier: node fingerprint, request cookie, session
/// `streamId`, or network id, depending on context.
#[derive(Clone, Copy, Eq)]
pub struct Identifier(pub [u8; ID_LEN]);

impl Identifier {
    pub const ZERO: Identifier = Identifier([0u8; ID_LEN]);

    /// Draw a new identifier from a cryptographically secure RNG. Used for
    /// request cookies, session stream ids, and (indirectly, via the
    /// identity keypair) node fingerprints.
    pub fn random() -> Self {
        let mut buf = [0u8; ID_LEN];
        rand::rng().fill_bytes(&mut buf);
        Identifier(buf)
    }

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Identifier(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Parse a RFC 4648 base32 string (no padding required) into an
    /// identifier.
    pub fn from_base32(s: &str) -> Option<Self> {
        let padded = pad_base32(s);
        let decoded = BASE32.decode(padded.as_bytes()).ok()?;
        let bytes: [u8; ID_LEN] = decoded.try_into().ok()?;
        Some(Identifier(bytes))
    }

    pub fn to_base32(&self) -> String {
        BASE32.encode(&self.0).trim_end_matches('=').to_string()
    }

    /// XOR metric (§4.A): `xor(other)` yields the `Distance` used both for
    /// k-bucket placement and for ordering search candidates.
    pub fn xor(&self, other: &Identifier) -> Distance {
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }
}

fn pad_base32(s: &str) -> String {
    let mut s = s.to_ascii_uppercase();
    let rem = s.len() % 8;
    if rem != 0 {
        s.push_str(&"=".repeat(8 - rem));
    }
    s
}

impl PartialEq for Identifier {
    /// Byte-equal comparison done in constant time: identifiers double as
    /// cryptographic peer identities (fingerprints), so comparisons used
    /// for identity matching must not leak timing information about where
    /// the first differing byte is.
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for i in 0..ID_LEN {
            diff |= self.0[i] ^ other.0[i];
        }
        diff == 0
    }
}

impl std::hash::Hash for Identifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_base32())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

/// Result of `Identifier::xor`. Wraps the raw XOR bytes and exposes the
/// `leading_bit` index used for k-bucket placement and distance ordering.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Distance(pub [u8; ID_LEN]);

impl Distance {
    /// Index (0 = MSB) of the highest-order set bit. Returns `160` when
    /// the distance is zero, i.e. the two identifiers are equal.
    pub fn leading_bit(&self) -> u32 {
        for (byte_idx, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (byte_idx as u32) * 8 + byte.leading_zeros();
            }
        }
        (ID_LEN as u32) * 8
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}
