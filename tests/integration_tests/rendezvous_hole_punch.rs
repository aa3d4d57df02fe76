// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S6: three-party NAT rendezvous. `requester` knows only `relay`;
//! `relay` knows only `target`'s address (seeded the way a real relay
//! would have learned it from an earlier PING, here via
//! `add_bootstrap` so `target` itself stays un-pinged and thus
//! unconnected going in). `requester.rendezvous(target)` must get
//! `relay` to forward the notification to `target`, which punches a
//! PING straight back at `requester`'s real address — the first
//! verified entry in `target`'s own table, flipping it from
//! disconnected to connected.

use std::time::Duration;

use overlay_node::{NodeConfig, NodeEvent};

use crate::integration_tests::common::{Harness, root_net_id, wait_for_event};

#[tokio::test]
async fn rendezvous_through_a_mutual_neighbour_punches_both_ways() -> anyhow::Result<()> {
    let requester = Harness::spawn().await?;
    let mut target = Harness::spawn().await?;
    let relay = Harness::spawn_with_bootstrap(NodeConfig::default(), &[(target.local_id, target.addr)]).await?;

    assert!(requester.handle.ping(relay.local_id, relay.addr, root_net_id()).await);

    let sent = requester.handle.rendezvous(target.local_id, root_net_id()).await;
    assert!(sent, "requester knows relay, so rendezvous has somewhere to go");

    // target never pinged anyone itself, so it starts disconnected;
    // the punched PING that relay's notification provokes is the
    // first record target ever verifies.
    let target_connected =
        wait_for_event(&mut target.events, Duration::from_secs(3), |e| matches!(e, NodeEvent::Connected)).await;
    assert!(target_connected, "target should verify requester via the punched PING");

    relay.shutdown().await;
    requester.shutdown().await;
    target.shutdown().await;
    Ok(())
}
