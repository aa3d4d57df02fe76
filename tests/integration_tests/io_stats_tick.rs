// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! §4.D "every 5s: update I/O rate statistics" — a node that has sent
//! and received a PING round trip reports a non-zero rate once the
//! stats tick has fired at least once.

use std::time::Duration;

use anyhow::Result;
use overlay_node::NodeConfig;

use crate::integration_tests::common::{Harness, root_net_id};

#[tokio::test]
async fn io_stats_reflect_ping_traffic_after_a_tick() -> Result<()> {
    let cfg = NodeConfig { stats_interval: Duration::from_millis(50), ..NodeConfig::default() };
    let a = Harness::spawn_with(cfg.clone()).await?;
    let b = Harness::spawn_with(cfg).await?;

    assert!(a.handle.ping(b.local_id, b.addr, root_net_id()).await);

    // Give the 50ms stats ticker at least one chance to fire on both
    // sides after the PING/response exchange.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats_a = a.handle.io_stats().await;
    let stats_b = b.handle.io_stats().await;
    assert!(stats_a.bytes_sent_per_sec > 0.0, "a sent a PING request this window");
    assert!(stats_b.bytes_sent_per_sec > 0.0, "b sent a PING response this window");
    assert!(stats_b.bytes_received_per_sec > 0.0, "b received a's PING request this window");

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}
