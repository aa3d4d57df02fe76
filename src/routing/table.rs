// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ordered list of k-buckets covering the full 160-bit distance space
//! (§3 "Buckets", §4.C).

use std::{net::SocketAddr, time::Duration};

use crate::{
    id::Identifier,
    routing::bucket::{Bucket, NodeRecord},
};

/// Routing table for one local identifier. Prefixes are strictly
/// increasing and their ranges cover `[0, 160)`; only the last (most
/// specific) bucket can ever be split, since it is the only one whose
/// range includes the local node's own (maximal) self-distance.
pub struct Buckets {
    local_id: Identifier,
    buckets: Vec<Bucket>,
}

impl Buckets {
    pub fn new(local_id: Identifier) -> Self {
        Buckets { local_id, buckets: vec![Bucket::new(0)] }
    }

    fn bucket_index(&self, id: &Identifier) -> usize {
        let bit = self.local_id.xor(id).leading_bit();
        self.buckets
            .iter()
            .rposition(|b| b.prefix <= bit)
            .unwrap_or(0)
    }

    fn covers_local(&self, idx: usize) -> bool {
        idx + 1 == self.buckets.len()
    }

    fn split_bucket(&mut self, idx: usize) {
        let bucket = self.buckets.remove(idx);
        let split = bucket.split(&self.local_id);
        self.buckets.insert(idx, split.upper);
        self.buckets.insert(idx, split.lower);
    }

    /// §4.C `add`: refresh, insert, split-and-retry, or evict-or-drop.
    /// Returns whether a *new* verified record entered the table.
    pub fn add(&mut self, id: Identifier, addr: SocketAddr) -> bool {
        if id == self.local_id {
            return false;
        }
        loop {
            let idx = self.bucket_index(&id);
            if self.buckets[idx].contains(&id) {
                return self.buckets[idx].refresh_or_insert(id, addr);
            }
            if !self.buckets[idx].is_full() {
                return self.buckets[idx].refresh_or_insert(id, addr);
            }
            if self.covers_local(idx) {
                self.split_bucket(idx);
                continue;
            }
            return self.buckets[idx].evict_and_insert(NodeRecord::verified(id, addr));
        }
    }

    /// §4.C `add_candidate`: never evicts a verified record.
    pub fn add_candidate(&mut self, id: Identifier, addr: SocketAddr) {
        if id == self.local_id {
            return;
        }
        let idx = self.bucket_index(&id);
        if self.buckets[idx].contains(&id) {
            return;
        }
        if !self.buckets[idx].is_full() {
            self.buckets[idx].insert_candidate(id, addr);
        }
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.buckets[self.bucket_index(id)].contains(id)
    }

    pub fn get_node(&self, id: &Identifier) -> Option<&NodeRecord> {
        self.buckets[self.bucket_index(id)].get(id)
    }

    /// §4.C `get_nearest`: up to `k` verified records sorted by XOR
    /// distance to `id`.
    pub fn get_nearest(&self, id: &Identifier, k: usize) -> Vec<NodeRecord> {
        let mut all: Vec<&NodeRecord> =
            self.buckets.iter().flat_map(|b| b.verified()).collect();
        all.sort_by_key(|r| id.xor(&r.id));
        all.into_iter().take(k).cloned().collect()
    }

    pub fn get_older_than(&self, age: Duration) -> Vec<Identifier> {
        self.buckets.iter().flat_map(|b| b.older_than(age)).collect()
    }

    pub fn remove_older_than(&mut self, age: Duration) {
        for b in &mut self.buckets {
            for id in b.older_than(age) {
                b.remove(&id);
            }
        }
    }

    /// All verified records across every bucket, for nat-keepalive and
    /// similar sweeps that don't care about distance ordering.
    pub fn verified(&self) -> Vec<NodeRecord> {
        self.buckets.iter().flat_map(|b| b.verified()).cloned().collect()
    }

    pub fn ping_lost(&mut self, id: &Identifier) {
        let idx = self.bucket_index(id);
        self.buckets[idx].ping_lost(id);
    }

    pub fn verified_count(&self) -> usize {
        self.buckets.iter().map(|b| b.verified_count()).sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
