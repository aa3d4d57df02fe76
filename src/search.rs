// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Iterative search state machine (§4.G).

use std::{collections::HashSet, net::SocketAddr};

use crate::{id::Identifier, wire::message::K};

/// Concurrent SEARCH fan-out width per iteration (supplemented from the
/// original implementation — see SPEC_FULL.md). `next()` remains the
/// single-candidate primitive the spec names; `next_many` layers the
/// alpha-width walk on top of it.
pub const ALPHA: usize = 3;

/// What completion means for this query (§4.G `is_complete`): a
/// find-node search is done once the exact target id appears in `best`;
/// a neighbourhood search is done only when the walk stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    FindNode,
    FindNeighbours,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Identifier,
    pub addr: SocketAddr,
    pub queried: bool,
}

/// `{target, best, queried}` (§3 "Search Query", §4.G).
pub struct SearchQuery {
    pub target: Identifier,
    pub kind: SearchKind,
    best: Vec<Candidate>,
    queried: HashSet<Identifier>,
}

impl SearchQuery {
    pub fn new(target: Identifier, kind: SearchKind, queried_self: Identifier) -> Self {
        let mut queried = HashSet::new();
        queried.insert(queried_self);
        SearchQuery { target, kind, best: Vec::new(), queried }
    }

    /// Seed `best` from the local bucket's nearest known records.
    pub fn seed(&mut self, seeds: impl IntoIterator<Item = (Identifier, SocketAddr)>) {
        for (id, addr) in seeds {
            self.update(id, addr);
        }
    }

    /// §4.G `update`: insert in distance order, ignore duplicates and
    /// already-queried ids, truncate to `K`.
    pub fn update(&mut self, id: Identifier, addr: SocketAddr) {
        if self.queried.contains(&id) {
            return;
        }
        if self.best.iter().any(|c| c.id == id) {
            return;
        }
        let pos = self
            .best
            .iter()
            .position(|c| self.target.xor(&id) < self.target.xor(&c.id))
            .unwrap_or(self.best.len());
        self.best.insert(pos, Candidate { id, addr, queried: false });
        self.best.truncate(K);
    }

    /// §4.G `next`: first entry in `best` not yet queried, marking it
    /// queried. `None` if the search has stalled.
    pub fn next(&mut self) -> Option<(Identifier, SocketAddr)> {
        let entry = self.best.iter_mut().find(|c| !c.queried)?;
        entry.queried = true;
        self.queried.insert(entry.id);
        Some((entry.id, entry.addr))
    }

    /// Up to `alpha` unqueried candidates in one call, for the
    /// concurrent-fan-out walk (supplemented; see SPEC_FULL.md).
    pub fn next_many(&mut self, alpha: usize) -> Vec<(Identifier, SocketAddr)> {
        let mut out = Vec::with_capacity(alpha);
        while out.len() < alpha {
            match self.next() {
                Some(c) => out.push(c),
                None => break,
            }
        }
        out
    }

    /// §4.G `is_complete`.
    pub fn is_complete(&self) -> bool {
        match self.kind {
            SearchKind::FindNode => self.best.iter().any(|c| c.id == self.target),
            SearchKind::FindNeighbours => self.best.iter().all(|c| c.queried),
        }
    }

    pub fn best(&self) -> &[Candidate] {
        &self.best
    }

    pub fn found_target(&self) -> Option<SocketAddr> {
        self.best.iter().find(|c| c.id == self.target).map(|c| c.addr)
    }
}
