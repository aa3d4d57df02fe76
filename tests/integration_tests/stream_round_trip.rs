// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! S3: a full CONNECT handshake followed by a 100KB reliable stream
//! transfer, well past one ring buffer's worth of data.

use std::time::Duration;

use anyhow::Result;
use overlay_node::{Identifier, NodeEvent};

use crate::integration_tests::common::{Harness, read_exact_from_stream, root_net_id, wait_for_event, write_all_to_stream};

#[tokio::test]
async fn one_hundred_kilobytes_arrive_intact_and_in_order() -> Result<()> {
    let mut a = Harness::spawn().await?;
    let mut b = Harness::spawn().await?;

    let service_id = Identifier::random();
    let mut incoming = b.handle.register_service(service_id).await?;

    let stream_id_a = a.handle.connect(b.local_id, b.addr, service_id, root_net_id()).await?;
    let connection = incoming.recv().await.expect("b receives the incoming connection");
    let stream_id_b = connection.stream_id;
    assert_eq!(connection.peer_id, a.local_id);

    // `connect()` only hands back the stream id it will use once the
    // handshake response arrives; writing before then would see
    // `UnknownCookie` from a's own node.
    let a_established = wait_for_event(&mut a.events, Duration::from_secs(2), |e| {
        matches!(e, NodeEvent::ConnectionEstablished { peer, .. } if *peer == b.local_id)
    })
    .await;
    assert!(a_established, "a's handshake must complete before it can write");

    let payload: Vec<u8> = (0..100_000usize).map(|i| (i % 256) as u8).collect();
    let writer = write_all_to_stream(&a.handle, stream_id_a, &payload, Duration::from_secs(15));
    let reader = read_exact_from_stream(&b.handle, stream_id_b, payload.len(), Duration::from_secs(15));
    let (write_result, read_result) = tokio::join!(writer, reader);
    write_result?;
    let received = read_result?;
    assert_eq!(received, payload);

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}
