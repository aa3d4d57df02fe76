// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! §6 "Service handler contract": a registrant's `allow_connection`
//! filter rejecting every peer means the CONNECT handshake never
//! completes and no incoming connection is ever notified, even though
//! the request itself reached the service.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use overlay_node::{Identifier, NodeConfig, NodeEvent};

use crate::integration_tests::common::{Harness, root_net_id, wait_for_event};

#[tokio::test]
async fn a_rejecting_filter_blocks_the_handshake() -> Result<()> {
    let cfg = NodeConfig { request_timeout: Duration::from_millis(200), ..NodeConfig::default() };
    let mut a = Harness::spawn_with(cfg.clone()).await?;
    let mut b = Harness::spawn_with(cfg).await?;

    let service_id = Identifier::random();
    let mut incoming = b
        .handle
        .register_service_with_filter(service_id, Some(Arc::new(|_peer| false)))
        .await?;

    let _stream_id_a = a.handle.connect(b.local_id, b.addr, service_id, root_net_id()).await?;

    let failed = wait_for_event(&mut a.events, Duration::from_secs(2), |e| {
        matches!(e, NodeEvent::ConnectionFailed { service, .. } if *service == service_id)
    })
    .await;
    assert!(failed, "a's CONNECT must time out once b's filter rejects the peer");
    assert!(incoming.try_recv().is_err(), "b's registrant must never see a rejected peer");

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}
