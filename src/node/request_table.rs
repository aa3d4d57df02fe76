// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Pending-request bookkeeping (§4.D): every outbound `PING`/`SEARCH`/
//! `CONNECT`/`RENDEZVOUS` is keyed by its random cookie until a
//! matching response arrives or `request_timeout` elapses.

use std::{collections::HashMap, net::SocketAddr, time::Instant};

use tokio::sync::oneshot;

use crate::{crypto::handshake::EphemeralKeypair, id::Identifier};

/// What a pending cookie is waiting for, and the state needed to act
/// on the eventual response (or its absence).
pub enum PendingKind {
    /// `node_id` is who we expect this PING to be answered by, so a
    /// reply can be folded into the right bucket entry. `reply` is set
    /// only for a caller-initiated `ping()` (§6); maintenance pings
    /// (re-ping, NAT keep-alive) leave it `None`.
    Ping { node_id: Identifier, reply: Option<oneshot::Sender<bool>> },
    /// `search_cookie` names the `ActiveSearch` this per-request cookie
    /// belongs to; the running `SearchQuery` lives there, not here, so a
    /// response only ever mutates the one shared query (see
    /// `Node::on_search_response`).
    Search { search_cookie: Identifier },
    /// We initiated a `CONNECT`; `eph` is kept until the handshake
    /// response lets us derive the session key, and `expected_peer` is
    /// the fingerprint we dialed so the response can be checked against
    /// it (§4.E step 4 — a third party must not be able to answer in
    /// the dialed peer's place just by owning the address).
    Connect { service_id: Identifier, expected_peer: Identifier, eph: EphemeralKeypair },
    Rendezvous { target: Identifier },
}

pub struct PendingRequest {
    pub peer_addr: SocketAddr,
    pub net_id: Identifier,
    pub sent_at: Instant,
    pub kind: PendingKind,
}

#[derive(Default)]
pub struct RequestTable {
    entries: HashMap<Identifier, PendingRequest>,
}

impl RequestTable {
    pub fn new() -> Self {
        RequestTable::default()
    }

    pub fn insert(&mut self, cookie: Identifier, request: PendingRequest) {
        self.entries.insert(cookie, request);
    }

    pub fn remove(&mut self, cookie: &Identifier) -> Option<PendingRequest> {
        self.entries.remove(cookie)
    }

    pub fn get_mut(&mut self, cookie: &Identifier) -> Option<&mut PendingRequest> {
        self.entries.get_mut(cookie)
    }

    pub fn contains(&self, cookie: &Identifier) -> bool {
        self.entries.contains_key(cookie)
    }

    /// Remove and return every request older than `timeout` as of `now`
    /// (§4.D "request expiry"), for the 500ms maintenance tick to act
    /// on (retry or give up).
    pub fn expire(&mut self, now: Instant, timeout: std::time::Duration) -> Vec<(Identifier, PendingRequest)> {
        let expired: Vec<Identifier> = self
            .entries
            .iter()
            .filter(|(_, req)| now.duration_since(req.sent_at) >= timeout)
            .map(|(cookie, _)| *cookie)
            .collect();
        expired
            .into_iter()
            .filter_map(|cookie| self.entries.remove(&cookie).map(|req| (cookie, req)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
