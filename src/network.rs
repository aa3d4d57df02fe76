// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Network / sub-network namespacing (§4.H).
//!
//! A `Network` identifies a logical overlay by the 20-byte hash of a
//! UTF-8 prefix; the empty prefix is the root network. Each network owns
//! its own `Buckets` but shares the host `Node`'s UDP socket and secure
//! socket machinery — `Node` keeps one `Buckets` per registered network
//! id and dispatches PING/SEARCH by the `netId` field carried on the
//! wire.

use once_cell::sync::Lazy;
use ripemd::{Digest, Ripemd160};

use crate::{
    id::{ID_LEN, Identifier},
    routing::Buckets,
};

/// `network_id("")`, computed once — every `Node` creates the root
/// network on startup and scoped-service lookups against it are on the
/// hot path of every PING/SEARCH dispatch.
static ROOT_NETWORK_ID: Lazy<Identifier> = Lazy::new(|| network_id_uncached(""));

/// Hash a UTF-8 prefix into a 20-byte network identifier. The empty
/// string hashes to the root network's id.
pub fn network_id(prefix: &str) -> Identifier {
    if prefix.is_empty() { *ROOT_NETWORK_ID } else { network_id_uncached(prefix) }
}

fn network_id_uncached(prefix: &str) -> Identifier {
    let mut hasher = Ripemd160::new();
    hasher.update(prefix.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; ID_LEN];
    out.copy_from_slice(&digest);
    Identifier::from_bytes(out)
}

/// Scope a service name under a network prefix before hashing, per §4.H
/// ("Service names are scoped per network by concatenation with the
/// prefix before hashing").
pub fn scoped_service_id(network_prefix: &str, service_name: &str) -> Identifier {
    let mut scoped = String::with_capacity(network_prefix.len() + service_name.len());
    scoped.push_str(network_prefix);
    scoped.push_str(service_name);
    network_id(&scoped)
}

/// One overlay a `Node` participates in: its id and its own routing
/// table. The root network (`prefix = ""`) is created automatically by
/// every `Node`.
pub struct Network {
    pub id: Identifier,
    pub prefix: String,
    pub buckets: Buckets,
}

impl Network {
    pub fn new(prefix: impl Into<String>, local_id: Identifier) -> Self {
        let prefix = prefix.into();
        let id = network_id(&prefix);
        Network { id, prefix, buckets: Buckets::new(local_id) }
    }

    pub fn root(local_id: Identifier) -> Self {
        Network::new("", local_id)
    }
}
