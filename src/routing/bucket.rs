// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single k-bucket: peers whose XOR distance to the local id has a
//! leading-bit index `>= prefix` (§3 "Bucket", §4.C).

use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use crate::{id::Identifier, wire::message::K};

/// Lost pings tolerated before a verified record becomes eligible for
/// eviction on the next insert attempt (supplemented from the original
/// implementation's candidate-eviction policy — see SPEC_FULL.md).
pub const MAX_LOST_PINGS: u32 = 2;

/// `{id, addr, port, lastSeen, lostPings}` (§3). `last_seen = None` marks
/// an unverified candidate.
#[derive(Clone, Debug)]
pub struct NodeRecord {
    pub id: Identifier,
    pub addr: SocketAddr,
    pub last_seen: Option<Instant>,
    pub lost_pings: u32,
}

impl NodeRecord {
    pub fn candidate(id: Identifier, addr: SocketAddr) -> Self {
        NodeRecord { id, addr, last_seen: None, lost_pings: 0 }
    }

    pub fn verified(id: Identifier, addr: SocketAddr) -> Self {
        NodeRecord { id, addr, last_seen: Some(Instant::now()), lost_pings: 0 }
    }

    pub fn is_verified(&self) -> bool {
        self.last_seen.is_some()
    }

    pub fn age(&self) -> Duration {
        self.last_seen.map(|t| t.elapsed()).unwrap_or(Duration::MAX)
    }
}

/// Bounded map from `Identifier` to `NodeRecord`, covering the distance
/// range `[prefix, 160)` (§3 "Bucket").
#[derive(Debug, Default)]
pub struct Bucket {
    pub prefix: u32,
    entries: HashMap<Identifier, NodeRecord>,
}

/// Outcome of a bucket split requested by `Buckets::add` (§4.C).
pub struct Split {
    pub lower: Bucket,
    pub upper: Bucket,
}

impl Bucket {
    pub fn new(prefix: u32) -> Self {
        Bucket { prefix, entries: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= K
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &Identifier) -> Option<&NodeRecord> {
        self.entries.get(id)
    }

    pub fn verified_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_verified()).count()
    }

    /// Refresh an existing record's `lastSeen`, or insert a new verified
    /// record if the bucket is not full. Returns `true` if a *new*
    /// verified record entered (the bucket was not already tracking this
    /// id in verified state).
    pub fn refresh_or_insert(&mut self, id: Identifier, addr: SocketAddr) -> bool {
        if let Some(existing) = self.entries.get_mut(&id) {
            let was_verified = existing.is_verified();
            existing.addr = addr;
            existing.last_seen = Some(Instant::now());
            existing.lost_pings = 0;
            return !was_verified;
        }
        self.entries.insert(id, NodeRecord::verified(id, addr));
        true
    }

    pub fn insert_candidate(&mut self, id: Identifier, addr: SocketAddr) {
        self.entries.entry(id).or_insert_with(|| NodeRecord::candidate(id, addr));
    }

    /// Evict the least-recently-seen record with `lost_pings >=
    /// MAX_LOST_PINGS`, if any, and insert `record` in its place. Returns
    /// whether the newcomer was inserted.
    pub fn evict_and_insert(&mut self, record: NodeRecord) -> bool {
        let victim = self
            .entries
            .values()
            .filter(|r| r.lost_pings >= MAX_LOST_PINGS)
            .min_by_key(|r| r.last_seen.unwrap_or_else(Instant::now))
            .map(|r| r.id);

        match victim {
            Some(id) => {
                self.entries.remove(&id);
                self.entries.insert(record.id, record);
                true
            },
            None => false,
        }
    }

    pub fn ping_lost(&mut self, id: &Identifier) {
        if let Some(r) = self.entries.get_mut(id) {
            r.lost_pings += 1;
        }
    }

    pub fn remove(&mut self, id: &Identifier) -> Option<NodeRecord> {
        self.entries.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.entries.values()
    }

    pub fn verified(&self) -> impl Iterator<Item = &NodeRecord> {
        self.entries.values().filter(|r| r.is_verified())
    }

    pub fn older_than(&self, age: Duration) -> Vec<Identifier> {
        self.entries
            .values()
            .filter(|r| r.is_verified() && r.age() >= age)
            .map(|r| r.id)
            .collect()
    }

    /// Split this bucket into two at `local_id`'s leading-bit index,
    /// redistributing entries by whether their distance leading bit is
    /// below or at-or-above the new midpoint prefix (§4.C, standard
    /// Kademlia bucket-splitting refinement).
    pub fn split(self, local_id: &Identifier) -> Split {
        let mid = self.prefix + 1;
        let mut lower = Bucket::new(self.prefix);
        let mut upper = Bucket::new(mid);
        for (id, record) in self.entries {
            let bit = local_id.xor(&id).leading_bit();
            if bit < mid {
                lower.entries.insert(id, record);
            } else {
                upper.entries.insert(id, record);
            }
        }
        Split { lower, upper }
    }
}
