// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S1: two freshly bootstrapped nodes exchange a `ping()` and both end
//! up with a verified routing-table entry for the other.

use std::time::Duration;

use anyhow::Result;
use overlay_node::NodeEvent;

use crate::integration_tests::common::{Harness, root_net_id, wait_for_event};

#[tokio::test]
async fn ping_confirms_the_peer_and_fires_connected() -> Result<()> {
    let mut a = Harness::spawn().await?;
    let b = Harness::spawn().await?;

    let ok = a.handle.ping(b.local_id, b.addr, root_net_id()).await;
    assert!(ok, "ping to a live peer must succeed");

    let connected = wait_for_event(&mut a.events, Duration::from_secs(2), |e| matches!(e, NodeEvent::Connected)).await;
    assert!(connected, "a's routing table should have gone from empty to non-empty");

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn ping_to_nothing_listening_times_out_false() -> Result<()> {
    let a = Harness::spawn().await?;
    // A bound-but-unused socket address: nobody will ever answer.
    let dead = {
        let sink = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
        sink.local_addr()?
    };
    let ok = a.handle.ping(overlay_node::Identifier::random(), dead, root_net_id()).await;
    assert!(!ok);
    a.shutdown().await;
    Ok(())
}
