// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! §8 items 1-2: XOR distance symmetry and the k-bucket bound/nearest
//! ordering, exercised through the public routing table only.

use std::net::SocketAddr;

use overlay_node::{id::Identifier, routing::Buckets};

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().expect("valid addr")
}

#[test]
fn distance_is_symmetric_and_self_distance_is_zero() {
    for _ in 0..50 {
        let a = Identifier::random();
        let b = Identifier::random();
        assert_eq!(a.xor(&b), b.xor(&a));
        assert_eq!(a.xor(&a), Identifier::ZERO.xor(&Identifier::ZERO));
    }
}

#[test]
fn a_heavily_populated_table_always_returns_distance_sorted_neighbours() {
    let local = Identifier::random();
    let mut table = Buckets::new(local);
    for i in 0..500u16 {
        table.add(Identifier::random(), addr(10_000 + i));
    }
    let target = Identifier::random();
    let nearest = table.get_nearest(&target, 8);
    assert!(nearest.len() <= 8);
    for pair in nearest.windows(2) {
        assert!(target.xor(&pair[0].id) <= target.xor(&pair[1].id));
    }
}

#[test]
fn bootstrapping_with_a_known_peer_makes_it_findable_as_nearest() {
    let local = Identifier::random();
    let mut table = Buckets::new(local);
    let peer = Identifier::random();
    assert!(table.add(peer, addr(1)));
    let nearest = table.get_nearest(&peer, 1);
    assert_eq!(nearest.first().map(|r| r.id), Some(peer));
}

#[test]
fn candidates_never_displace_an_already_verified_record() {
    let local = Identifier::random();
    let mut table = Buckets::new(local);
    let peer = Identifier::random();
    table.add(peer, addr(1));
    table.add_candidate(peer, addr(2));
    assert_eq!(table.get_node(&peer).map(|r| r.addr), Some(addr(1)));
}
