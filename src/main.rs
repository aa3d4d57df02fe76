// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use overlay_node::{Identity, Node, NodeConfig, logging::init_tracing};
use tracing::info;

/// Minimal bootstrap node: binds a socket, joins the root network, and
/// idles in its event loop. Real embedders drive a `NodeHandle` from
/// another task instead of letting `main` block on `run`.
#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing().context("failed to initialize tracing")?;

    let identity = Identity::new();
    let bind_addr = "0.0.0.0:0".parse().expect("valid fallback addr");
    let (node, handle, mut events) = Node::new(bind_addr, identity, NodeConfig::default())
        .await
        .context("failed to bind overlay node")?;

    info!(id = %node.local_id(), "overlay node starting");

    let run_handle = tokio::spawn(node.run());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "node event");
        }
    });

    tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
    handle.shutdown();
    run_handle.await.context("node task panicked")?;
    Ok(())
}
