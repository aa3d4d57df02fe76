// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A well-known bootstrap node binds a fixed address rather than an
//! ephemeral one, so that every other node on the network can hardcode
//! it without a prior discovery step. `#[serial]` keeps this the only
//! test holding that port at a time; every other scenario here binds
//! `127.0.0.1:0` and needs no such guard.

use serial_test::serial;

use crate::integration_tests::common::{Harness, root_net_id};

const BOOTSTRAP_ADDR: &str = "127.0.0.1:58391";

#[tokio::test]
#[serial]
async fn a_node_can_bind_a_fixed_well_known_address() -> anyhow::Result<()> {
    let bootstrap =
        Harness::spawn_at(BOOTSTRAP_ADDR.parse().expect("valid addr"), overlay_node::NodeConfig::default(), &[])
            .await?;
    assert_eq!(bootstrap.addr, BOOTSTRAP_ADDR.parse().expect("valid addr"));

    let joiner = Harness::spawn().await?;
    assert!(joiner.handle.ping(bootstrap.local_id, bootstrap.addr, root_net_id()).await);

    bootstrap.shutdown().await;
    joiner.shutdown().await;
    Ok(())
}
