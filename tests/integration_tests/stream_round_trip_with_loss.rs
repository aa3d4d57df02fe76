// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S4: the same reliable stream transfer, but routed through a relay
//! that drops 30% of the datagrams travelling from the writer to the
//! reader. The adaptive RTO and cumulative ACK retransmission must
//! still deliver every byte, just more slowly.

use std::time::Duration;

use anyhow::Result;
use overlay_node::{Identifier, NodeEvent};

use crate::integration_tests::common::{Harness, LossyRelay, read_exact_from_stream, root_net_id, wait_for_event, write_all_to_stream};

#[tokio::test]
async fn stream_survives_thirty_percent_one_direction_loss() -> Result<()> {
    let mut a = Harness::spawn().await?;
    let mut b = Harness::spawn().await?;
    let relay = LossyRelay::spawn(a.addr, b.addr, 0.30).await?;

    let service_id = Identifier::random();
    let mut incoming = b.handle.register_service(service_id).await?;

    // CONNECT itself rides through the same lossy path as the data that
    // follows and has no built-in retry (§4.E handshakes are
    // single-shot), so the test retries the dial a handful of times
    // rather than relying on one packet surviving a 30% drop rate.
    let (stream_id_a, connection) = 'dial: loop {
        let stream_id_a = a.handle.connect(b.local_id, relay.addr(), service_id, root_net_id()).await?;
        match tokio::time::timeout(Duration::from_secs(1), incoming.recv()).await {
            Ok(Some(connection)) => break 'dial (stream_id_a, connection),
            _ => continue,
        }
    };
    let stream_id_b = connection.stream_id;

    let a_established = wait_for_event(&mut a.events, Duration::from_secs(5), |e| {
        matches!(e, NodeEvent::ConnectionEstablished { .. })
    })
    .await;
    assert!(a_established);

    let payload: Vec<u8> = (0..50_000usize).map(|i| ((i * 7) % 256) as u8).collect();
    let writer = write_all_to_stream(&a.handle, stream_id_a, &payload, Duration::from_secs(30));
    let reader = read_exact_from_stream(&b.handle, stream_id_b, payload.len(), Duration::from_secs(30));
    let (write_result, read_result) = tokio::join!(writer, reader);
    write_result?;
    assert_eq!(read_result?, payload);

    a.shutdown().await;
    b.shutdown().await;
    relay.shutdown().await;
    Ok(())
}
