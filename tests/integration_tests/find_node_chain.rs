// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S2: iterative `find_node` resolves a target several hops away in a
//! bootstrap chain where each node only knows its immediate neighbour.

use anyhow::Result;

use crate::integration_tests::common::{Harness, root_net_id};

#[tokio::test]
async fn find_node_walks_a_four_node_chain() -> Result<()> {
    let n0 = Harness::spawn().await?;
    let n1 = Harness::spawn_with_bootstrap(Default::default(), &[(n0.local_id, n0.addr)]).await?;
    let n2 = Harness::spawn_with_bootstrap(Default::default(), &[(n1.local_id, n1.addr)]).await?;
    let n3 = Harness::spawn_with_bootstrap(Default::default(), &[(n2.local_id, n2.addr)]).await?;

    // Seed n0 -> n1 both ways with a real PING round trip so n0's table
    // is verified (add_bootstrap alone only inserts a candidate), then
    // let n3 walk the chain back to n0 purely through iterative SEARCH.
    assert!(n1.handle.ping(n0.local_id, n0.addr, root_net_id()).await);
    assert!(n2.handle.ping(n1.local_id, n1.addr, root_net_id()).await);
    assert!(n3.handle.ping(n2.local_id, n2.addr, root_net_id()).await);

    let found = n3.handle.find_node(n0.local_id, root_net_id()).await;
    assert_eq!(found, Some(n0.addr), "n3 should locate n0 through n2 and n1");

    n0.shutdown().await;
    n1.shutdown().await;
    n2.shutdown().await;
    n3.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn find_node_for_an_unreachable_target_reports_not_found() -> Result<()> {
    let n0 = Harness::spawn().await?;
    let n1 = Harness::spawn().await?;
    assert!(n1.handle.ping(n0.local_id, n0.addr, root_net_id()).await);

    let missing = overlay_node::Identifier::random();
    let found = n1.handle.find_node(missing, root_net_id()).await;
    assert_eq!(found, None);

    n0.shutdown().await;
    n1.shutdown().await;
    Ok(())
}
