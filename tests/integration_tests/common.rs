// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use overlay_node::{Identifier, Identity, Node, NodeConfig, NodeEvent};
use tokio::{
    net::UdpSocket,
    sync::{Notify, mpsc},
};

/// One bound-and-running node plus its handle and event stream, torn down
/// by dropping the handle (which cancels `run` via channel closure).
pub struct Harness {
    pub handle: overlay_node::NodeHandle,
    pub addr: SocketAddr,
    pub local_id: overlay_node::Identifier,
    pub events: mpsc::UnboundedReceiver<NodeEvent>,
    run: tokio::task::JoinHandle<()>,
}

impl Harness {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(NodeConfig::default()).await
    }

    pub async fn spawn_with(cfg: NodeConfig) -> Result<Self> {
        Self::spawn_with_bootstrap(cfg, &[]).await
    }

    /// Spawn a node whose root routing table is pre-seeded with the
    /// given `(peer_id, peer_addr)` pairs before the event loop starts,
    /// the same shape `add_bootstrap` exists for (§4.C "seed a known
    /// address before the first PING round trip confirms it").
    pub async fn spawn_with_bootstrap(cfg: NodeConfig, bootstrap: &[(Identifier, SocketAddr)]) -> Result<Self> {
        Self::spawn_at("127.0.0.1:0".parse().expect("valid addr"), cfg, bootstrap).await
    }

    /// Spawn bound to a caller-chosen address rather than an ephemeral
    /// port — the shape a well-known, hardcoded bootstrap/rendezvous
    /// node needs, since every other node on the network dials it by a
    /// fixed address rather than discovering it first.
    pub async fn spawn_at(
        bind_addr: SocketAddr,
        cfg: NodeConfig,
        bootstrap: &[(Identifier, SocketAddr)],
    ) -> Result<Self> {
        let (mut node, handle, events) = Node::new(bind_addr, Identity::new(), cfg)
            .await
            .context("binding test node")?;
        let addr = node.local_addr();
        let local_id = node.local_id();
        for &(peer_id, peer_addr) in bootstrap {
            node.add_bootstrap(root_net_id(), peer_id, peer_addr);
        }
        let run = tokio::spawn(node.run());
        Ok(Harness { handle, addr, local_id, events, run })
    }

    pub async fn shutdown(self) {
        self.handle.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(1), self.run).await;
    }
}

pub fn root_net_id() -> Identifier {
    overlay_node::network::network_id("")
}

/// Drain `events` until `pred` matches one, or `timeout` elapses.
pub async fn wait_for_event(
    events: &mut mpsc::UnboundedReceiver<NodeEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&NodeEvent) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if pred(&event) => return true,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return false,
        }
    }
}

/// A UDP middlebox standing in for two endpoints' direct path: every
/// datagram arriving from `a` is forwarded to `b` (dropped with
/// `drop_probability`, simulating one-direction loss) and every datagram
/// from `b` is forwarded back to `a` unconditionally.
pub struct LossyRelay {
    local_addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
    stop: Arc<Notify>,
}

impl LossyRelay {
    pub async fn spawn(a: SocketAddr, b: SocketAddr, drop_probability: f64) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.context("binding relay socket")?;
        let local_addr = socket.local_addr().context("relay local_addr")?;
        let stop = Arc::new(Notify::new());
        let stop_task = stop.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = stop_task.notified() => break,
                    received = socket.recv_from(&mut buf) => {
                        let Ok((n, from)) = received else { continue };
                        let (dest, drop_this_one) =
                            if from == a { (b, rand::random::<f64>() < drop_probability) } else { (a, false) };
                        if !drop_this_one {
                            let _ = socket.send_to(&buf[..n], dest).await;
                        }
                    }
                }
            }
        });
        Ok(LossyRelay { local_addr, task, stop })
    }

    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(self) {
        self.stop.notify_one();
        let _ = tokio::time::timeout(Duration::from_secs(1), self.task).await;
    }
}

/// Push every byte of `data` into `stream_id`, retrying whatever a call
/// doesn't accept (the ring fills up well before 100KB of application
/// data is queued) until the deadline passes.
pub async fn write_all_to_stream(
    handle: &overlay_node::NodeHandle,
    stream_id: Identifier,
    data: &[u8],
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut offset = 0;
    while offset < data.len() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out with {} of {} bytes still unwritten", data.len() - offset, data.len());
        }
        let accepted = handle.stream_write(stream_id, data[offset..].to_vec()).await?;
        offset += accepted;
        if accepted == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
    Ok(())
}

/// Poll `stream_read` until `expected_len` bytes have been collected or
/// the deadline passes.
pub async fn read_exact_from_stream(
    handle: &overlay_node::NodeHandle,
    stream_id: Identifier,
    expected_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut out = Vec::with_capacity(expected_len);
    while out.len() < expected_len {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out with {} of {} bytes read", out.len(), expected_len);
        }
        let chunk = handle.stream_read(stream_id, expected_len - out.len()).await?;
        if chunk.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        } else {
            out.extend_from_slice(&chunk);
        }
    }
    Ok(out)
}
