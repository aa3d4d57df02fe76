// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The overlay node: one UDP socket, one cooperative event loop, no
//! shared mutable state (§5). Everything that looks like concurrent
//! access from the outside — starting a search, opening a connection,
//! reading a stream — is a `Command` sent over a channel and executed
//! by `Node::run` on its own task, the way the original's single
//! event-loop thread owns every `Node`, `Bucket` and `SecureStream`.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    config::NodeConfig,
    crypto::{
        handshake::{EphemeralKeypair, build_handshake_blob, derive_session_key, verify_handshake_blob},
        secure_socket::SecureSocket,
    },
    error::OverlayError,
    events::{IoStats, NodeEvent},
    id::Identifier,
    identity::Identity,
    network::Network,
    node::{
        request_table::{PendingKind, PendingRequest, RequestTable},
        services::{ConnectionFilter, IncomingConnection, ServiceRegistry},
    },
    search::{ALPHA, SearchKind, SearchQuery},
    stream::SecureStream,
    wire::message::{Connect, Ping, RequestBody, Rendezvous, SearchRequest, SearchResponse},
};

/// Commands accepted from a `NodeHandle`; every one of them is executed
/// to completion inside `Node::run`'s single task, never touching
/// routing/session state from any other thread.
pub enum Command {
    Ping { peer_id: Identifier, peer_addr: SocketAddr, net_id: Identifier, reply: oneshot::Sender<bool> },
    FindNode { target: Identifier, net_id: Identifier, reply: oneshot::Sender<Option<SocketAddr>> },
    FindNeighbours { target: Identifier, net_id: Identifier, reply: oneshot::Sender<Vec<(Identifier, SocketAddr)>> },
    Connect {
        peer_id: Identifier,
        peer_addr: SocketAddr,
        service_id: Identifier,
        net_id: Identifier,
        reply: oneshot::Sender<Result<Identifier, OverlayError>>,
    },
    Rendezvous { target: Identifier, net_id: Identifier, reply: oneshot::Sender<bool> },
    RegisterService {
        service_id: Identifier,
        tx: mpsc::UnboundedSender<IncomingConnection>,
        filter: Option<ConnectionFilter>,
        reply: oneshot::Sender<Result<(), OverlayError>>,
    },
    UnregisterService { service_id: Identifier },
    StreamWrite { stream_id: Identifier, data: Vec<u8>, reply: oneshot::Sender<Result<usize, OverlayError>> },
    StreamRead { stream_id: Identifier, max: usize, reply: oneshot::Sender<Result<Vec<u8>, OverlayError>> },
    StreamClose { stream_id: Identifier },
    StreamReset { stream_id: Identifier },
    /// §4.D "every 5s: update I/O rate statistics" — the most recent
    /// 5s snapshot, computed by `on_stats_tick`.
    IoStats { reply: oneshot::Sender<IoStats> },
    Shutdown,
}

/// Cheap, cloneable front door to a running `Node`. Every call is a
/// message send plus (for request-like calls) awaiting a `oneshot`
/// reply from the node's own task.
#[derive(Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl NodeHandle {
    /// §6 `ping(...)`: send a PING to a known address and wait for the
    /// response, folding the peer into the named network's routing
    /// table on success. Returns whether a response arrived before the
    /// 2s request timeout.
    pub async fn ping(&self, peer_id: Identifier, peer_addr: SocketAddr, net_id: Identifier) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Ping { peer_id, peer_addr, net_id, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn find_node(&self, target: Identifier, net_id: Identifier) -> Option<SocketAddr> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::FindNode { target, net_id, reply }).ok()?;
        rx.await.ok().flatten()
    }

    pub async fn find_neighbours(&self, target: Identifier, net_id: Identifier) -> Vec<(Identifier, SocketAddr)> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::FindNeighbours { target, net_id, reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn connect(
        &self,
        peer_id: Identifier,
        peer_addr: SocketAddr,
        service_id: Identifier,
        net_id: Identifier,
    ) -> Result<Identifier, OverlayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Connect { peer_id, peer_addr, service_id, net_id, reply })
            .map_err(|_| OverlayError::UnknownService)?;
        rx.await.map_err(|_| OverlayError::Timeout)?
    }

    pub async fn rendezvous(&self, target: Identifier, net_id: Identifier) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Rendezvous { target, net_id, reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn register_service(
        &self,
        service_id: Identifier,
    ) -> Result<mpsc::UnboundedReceiver<IncomingConnection>, OverlayError> {
        self.register_service_with_filter(service_id, None).await
    }

    /// Same as `register_service`, but gates each incoming `CONNECT`
    /// through `filter` (§6 `allow_connection(peer) → bool`) before the
    /// handshake's response half is sent.
    pub async fn register_service_with_filter(
        &self,
        service_id: Identifier,
        filter: Option<ConnectionFilter>,
    ) -> Result<mpsc::UnboundedReceiver<IncomingConnection>, OverlayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::RegisterService { service_id, tx, filter, reply })
            .map_err(|_| OverlayError::UnknownService)?;
        reply_rx.await.map_err(|_| OverlayError::Timeout)??;
        Ok(rx)
    }

    pub fn unregister_service(&self, service_id: Identifier) {
        let _ = self.tx.send(Command::UnregisterService { service_id });
    }

    pub async fn stream_write(&self, stream_id: Identifier, data: Vec<u8>) -> Result<usize, OverlayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::StreamWrite { stream_id, data, reply })
            .map_err(|_| OverlayError::UnknownCookie)?;
        rx.await.map_err(|_| OverlayError::Timeout)?
    }

    pub async fn stream_read(&self, stream_id: Identifier, max: usize) -> Result<Vec<u8>, OverlayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::StreamRead { stream_id, max, reply })
            .map_err(|_| OverlayError::UnknownCookie)?;
        rx.await.map_err(|_| OverlayError::Timeout)?
    }

    pub fn close_stream(&self, stream_id: Identifier) {
        let _ = self.tx.send(Command::StreamClose { stream_id });
    }

    pub fn reset_stream(&self, stream_id: Identifier) {
        let _ = self.tx.send(Command::StreamReset { stream_id });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// §4.D "every 5s: update I/O rate statistics" — the rates observed
    /// over the most recently completed 5s window.
    pub async fn io_stats(&self) -> IoStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::IoStats { reply }).is_err() {
            return IoStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// A search in flight against the wire, as opposed to `search::SearchQuery`
/// which is the pure candidate-tracking state it wraps.
struct ActiveSearch {
    query: SearchQuery,
    net_id: Identifier,
    /// Outstanding SEARCH requests sent for this query that haven't
    /// been answered or expired yet; `next_many` returning nothing
    /// doesn't mean the walk is done while this is still above zero.
    in_flight: usize,
    /// Signalled once when the search completes or stalls; `None` once
    /// already taken (FindNeighbours-only queries used internally by
    /// maintenance have no caller waiting).
    reply: Option<oneshot::Sender<Option<SocketAddr>>>,
    reply_neighbours: Option<oneshot::Sender<Vec<(Identifier, SocketAddr)>>>,
}

pub struct Node {
    identity: Identity,
    local_id: Identifier,
    socket: UdpSocket,
    networks: HashMap<Identifier, Network>,
    pending: RequestTable,
    searches: HashMap<Identifier, ActiveSearch>,
    connections: HashMap<Identifier, SecureStream>,
    services: ServiceRegistry,
    cfg: NodeConfig,
    events: mpsc::UnboundedSender<NodeEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    root_was_connected: bool,
    /// Bytes moved since the last 5s stats tick (§4.D); reset by
    /// `on_stats_tick`.
    bytes_sent_since_tick: u64,
    bytes_received_since_tick: u64,
    last_stats_tick: std::time::Instant,
    io_stats: IoStats,
}

impl Node {
    /// Bind a UDP socket at `bind_addr` and build a node around a fresh
    /// or supplied identity. Returns the node (to be driven by `run`),
    /// a handle for issuing commands, and the node-scoped event stream.
    pub async fn new(
        bind_addr: SocketAddr,
        identity: Identity,
        cfg: NodeConfig,
    ) -> Result<(Node, NodeHandle, mpsc::UnboundedReceiver<NodeEvent>), OverlayError> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(OverlayError::BindFailure)?;
        let local_id = identity.fingerprint();
        let mut networks = HashMap::new();
        networks.insert(local_id_of_root(), Network::root(local_id));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let node = Node {
            identity,
            local_id,
            socket,
            networks,
            pending: RequestTable::new(),
            searches: HashMap::new(),
            connections: HashMap::new(),
            services: ServiceRegistry::new(),
            cfg,
            events: event_tx,
            commands: command_rx,
            cancel: CancellationToken::new(),
            root_was_connected: false,
            bytes_sent_since_tick: 0,
            bytes_received_since_tick: 0,
            last_stats_tick: std::time::Instant::now(),
            io_stats: IoStats::default(),
        };
        Ok((node, NodeHandle { tx: command_tx }, event_rx))
    }

    pub fn local_id(&self) -> Identifier {
        self.local_id
    }

    /// The address the node's socket is actually bound to (useful when
    /// `bind_addr` used an ephemeral port).
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap_or_else(|_| "0.0.0.0:0".parse().expect("valid fallback addr"))
    }

    /// Join an additional network under `prefix` (§4.H); the root
    /// network always exists from `new`.
    pub fn join_network(&mut self, prefix: impl Into<String>) -> Identifier {
        let network = Network::new(prefix, self.local_id);
        let id = network.id;
        self.networks.entry(id).or_insert(network);
        id
    }

    /// Seed the routing table with a known bootstrap peer (§4.C):
    /// unverified until it answers a `PING`.
    pub fn add_bootstrap(&mut self, net_id: Identifier, peer_id: Identifier, addr: SocketAddr) {
        if let Some(net) = self.networks.get_mut(&net_id) {
            net.buckets.add_candidate(peer_id, addr);
        }
    }

    /// Drive the node until `Command::Shutdown` or cancellation. Meant
    /// to be handed to `tokio::spawn`.
    pub async fn run(mut self) {
        let mut request_expiry = tokio::time::interval(self.cfg.request_expiry_interval);
        let mut bucket_maintenance = tokio::time::interval(self.cfg.bucket_maintenance_interval);
        let mut stream_ticker = tokio::time::interval(self.cfg.stream_packet_timer_interval);
        let mut stats_ticker = tokio::time::interval(self.cfg.stats_interval);
        let mut nat_keepalive = tokio::time::interval(
            self.cfg.nat_keepalive_interval.unwrap_or(Duration::from_secs(u64::MAX)),
        );
        let mut recv_buf = vec![0u8; crate::wire::message::MAX_MESSAGE];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                datagram = self.socket.recv_from(&mut recv_buf) => {
                    match datagram {
                        Ok((n, from)) => {
                            self.bytes_received_since_tick += n as u64;
                            self.on_datagram(&recv_buf[..n], from, std::time::Instant::now()).await;
                        },
                        Err(e) => warn!("udp recv failed: {e}"),
                    }
                },
                Some(command) = self.commands.recv() => {
                    if matches!(command, Command::Shutdown) {
                        break;
                    }
                    self.on_command(command, std::time::Instant::now()).await;
                },
                _ = request_expiry.tick() => self.on_request_expiry(std::time::Instant::now()).await,
                _ = bucket_maintenance.tick() => self.on_bucket_maintenance(std::time::Instant::now()).await,
                _ = stream_ticker.tick() => self.on_stream_tick(std::time::Instant::now()).await,
                _ = stats_ticker.tick() => self.on_stats_tick(std::time::Instant::now()),
                _ = nat_keepalive.tick(), if self.cfg.nat_keepalive_interval.is_some() => {
                    self.on_nat_keepalive(std::time::Instant::now()).await;
                },
            }
        }
        debug!("node {} event loop exiting", self.local_id);
    }

    // ---- datagram dispatch --------------------------------------------

    async fn on_datagram(&mut self, datagram: &[u8], from: SocketAddr, now: std::time::Instant) {
        if datagram.len() < crate::id::ID_LEN {
            return;
        }
        let (cookie_bytes, body) = datagram.split_at(crate::id::ID_LEN);
        let mut cookie_arr = [0u8; crate::id::ID_LEN];
        cookie_arr.copy_from_slice(cookie_bytes);
        let cookie = Identifier::from_bytes(cookie_arr);

        if self.connections.contains_key(&cookie) {
            self.on_session_datagram(cookie, body, now).await;
            return;
        }
        if self.pending.contains(&cookie) {
            self.on_response(cookie, body, from, now).await;
            return;
        }
        self.on_request(cookie, body, from, now).await;
    }

    async fn on_session_datagram(&mut self, stream_id: Identifier, body: &[u8], now: std::time::Instant) {
        let Some(stream) = self.connections.get_mut(&stream_id) else { return };
        let events = stream.on_datagram(now, body);
        let peer_id = stream.peer_id();
        let closed = stream.state() == crate::stream::StreamState::Closed;
        for event in events {
            trace!(?event, peer = %peer_id, "stream event");
            if event == crate::events::StreamEvent::Reset || event == crate::events::StreamEvent::Error {
                let _ = self.events.send(NodeEvent::ConnectionFailed { service: Identifier::ZERO, peer: peer_id });
            }
        }
        if closed {
            self.connections.remove(&stream_id);
        }
    }

    async fn on_request(&mut self, cookie: Identifier, body: &[u8], from: SocketAddr, now: std::time::Instant) {
        let request = match RequestBody::decode(body) {
            Ok(r) => r,
            Err(_) => return,
        };
        match request {
            RequestBody::Ping(ping) => self.handle_ping_request(cookie, ping, from).await,
            RequestBody::Search(search) => self.handle_search_request(cookie, search, from).await,
            RequestBody::Connect(connect) => self.handle_connect_request(cookie, connect, from).await,
            RequestBody::Rendezvous(rendezvous) => self.handle_rendezvous(rendezvous, from, now).await,
        }
    }

    async fn handle_ping_request(&mut self, cookie: Identifier, ping: Ping, from: SocketAddr) {
        if let Some(net) = self.networks.get_mut(&ping.net_id) {
            net.buckets.add_candidate(ping.sender_id, from);
            self.check_root_connectivity();
        }
        let response = Ping { sender_id: self.local_id, net_id: ping.net_id };
        self.send_response(cookie, from, |out| response.encode(out)).await;
    }

    async fn handle_search_request(&mut self, cookie: Identifier, search: SearchRequest, from: SocketAddr) {
        let Some(net) = self.networks.get(&search.net_id) else { return };
        let triples = net
            .buckets
            .get_nearest(&search.target, crate::wire::message::K)
            .into_iter()
            .map(|record| crate::wire::message::Triple { id: record.id, addr: record.addr })
            .collect();
        let response = SearchResponse { triples };
        self.send_response(cookie, from, |out| response.encode(out)).await;
    }

    async fn handle_connect_request(&mut self, cookie: Identifier, connect: Connect, from: SocketAddr) {
        if !self.services.is_registered(&connect.service_id) {
            return;
        }
        let verified = match verify_handshake_blob(&connect.handshake, None) {
            Ok(v) => v,
            Err(e) => {
                debug!("CONNECT handshake rejected: {e}");
                return;
            },
        };
        let peer_id = verified.identity.fingerprint();
        if peer_id == self.local_id {
            // Self-connect guard (supplemented feature): never loop a
            // service connection back to ourselves.
            return;
        }
        if !self.services.allow_connection(&connect.service_id, peer_id) {
            debug!("CONNECT from {peer_id} rejected by service filter");
            return;
        }

        let eph = EphemeralKeypair::generate();
        let our_blob = build_handshake_blob(&self.identity, &eph);
        let Ok((key, iv)) = derive_session_key(eph, &verified.eph_pub) else { return };

        self.send_response(cookie, from, |out| our_blob.encode(out)).await;

        let socket = SecureSocket::new(cookie, peer_id, key, iv);
        let stream = SecureStream::new(socket, from, 0, std::time::Instant::now());
        self.connections.insert(cookie, stream);
        self.services.notify(&connect.service_id, IncomingConnection { peer_id, stream_id: cookie });
        let _ = self.events.send(NodeEvent::ConnectionEstablished { service: connect.service_id, peer: peer_id });
    }

    /// Both the relay hop and the final hop run this: if the
    /// notification names us, start punching toward `addr`; otherwise
    /// forward it on toward `target` if we know it (§4.G rendezvous).
    /// Rendezvous is root-network only — see DESIGN.md.
    async fn handle_rendezvous(&mut self, rendezvous: Rendezvous, from: SocketAddr, now: std::time::Instant) {
        if rendezvous.target == self.local_id {
            self.send_ping_for_reping(rendezvous.target, rendezvous.addr, now, true).await;
            return;
        }
        let Some(root) = self.networks.get(&local_id_of_root()) else { return };
        let Some(record) = root.buckets.get_node(&rendezvous.target) else { return };
        let addr = record.addr;
        // Overwrite the requester's self-reported address with what we
        // actually observed it from, so the target punches toward the
        // NAT-translated address rather than a possibly-private one.
        let forwarded = Rendezvous { target: rendezvous.target, addr: from };
        self.send_one_way(addr, |out| forwarded.encode(out)).await;
    }

    async fn on_response(&mut self, cookie: Identifier, body: &[u8], from: SocketAddr, now: std::time::Instant) {
        let Some(pending) = self.pending.remove(&cookie) else { return };
        let net_id = pending.net_id;
        match pending.kind {
            PendingKind::Ping { node_id, reply } => {
                // The stashed `node_id` is the id we *expected* to find at
                // `from` when this request was sent. A rendezvous-triggered
                // re-ping has no such expectation (RENDEZVOUS carries no
                // sender id), so prefer whatever the response itself
                // claims and fall back to the stashed id only if the body
                // doesn't parse.
                let verified_id = Ping::decode(body).map(|p| p.sender_id).unwrap_or(node_id);
                self.on_ping_response(verified_id, net_id, from, reply)
            },
            PendingKind::Search { search_cookie } => self.on_search_response(search_cookie, net_id, body, now),
            PendingKind::Connect { service_id, expected_peer, eph } => {
                self.on_connect_response(cookie, service_id, expected_peer, eph, body, from)
            },
            PendingKind::Rendezvous { .. } => {},
        }
    }

    fn on_ping_response(
        &mut self,
        node_id: Identifier,
        net_id: Identifier,
        from: SocketAddr,
        reply: Option<oneshot::Sender<bool>>,
    ) {
        if let Some(net) = self.networks.get_mut(&net_id) {
            net.buckets.add(node_id, from);
            self.check_root_connectivity();
        }
        if let Some(reply) = reply {
            let _ = reply.send(true);
        }
    }

    /// A `SEARCH` response for `search_cookie`'s active search: fold the
    /// returned triples straight into the one running `SearchQuery` (no
    /// per-request copy to merge back), then pump the walk forward.
    fn on_search_response(&mut self, search_cookie: Identifier, _net_id: Identifier, body: &[u8], now: std::time::Instant) {
        let Ok(response) = SearchResponse::decode(body) else { return };
        let Some(active) = self.searches.get_mut(&search_cookie) else { return };
        active.in_flight = active.in_flight.saturating_sub(1);
        for triple in response.triples {
            if triple.id != self.local_id {
                active.query.update(triple.id, triple.addr);
            }
        }
        self.pump_search(search_cookie, now);
    }

    fn on_connect_response(
        &mut self,
        cookie: Identifier,
        service_id: Identifier,
        expected_peer: Identifier,
        eph: EphemeralKeypair,
        body: &[u8],
        from: SocketAddr,
    ) {
        let Ok((blob, _)) = crate::wire::message::HandshakeBlob::decode(body) else {
            let _ = self.events.send(NodeEvent::ConnectionFailed { service: service_id, peer: Identifier::ZERO });
            return;
        };
        // §4.E step 4: the initiator pins the fingerprint it dialed, so
        // a third party answering at that address cannot pass itself
        // off as the intended peer.
        let Ok(verified) = verify_handshake_blob(&blob, Some(&expected_peer)) else {
            let _ = self.events.send(NodeEvent::ConnectionFailed { service: service_id, peer: expected_peer });
            return;
        };
        let peer_id = verified.identity.fingerprint();
        let Ok((key, iv)) = derive_session_key(eph, &verified.eph_pub) else {
            let _ = self.events.send(NodeEvent::ConnectionFailed { service: service_id, peer: peer_id });
            return;
        };
        let stream_id = cookie;
        let socket = SecureSocket::new(stream_id, peer_id, key, iv);
        let stream = SecureStream::new(socket, from, 0, std::time::Instant::now());
        self.connections.insert(stream_id, stream);
        let _ = self.events.send(NodeEvent::ConnectionEstablished { service: service_id, peer: peer_id });
    }

    // ---- commands -------------------------------------------------------

    async fn on_command(&mut self, command: Command, now: std::time::Instant) {
        match command {
            Command::Ping { peer_id, peer_addr, net_id, reply } => {
                self.start_ping(peer_id, peer_addr, net_id, Some(reply), now).await;
            },
            Command::FindNode { target, net_id, reply } => self.start_search(target, net_id, SearchKind::FindNode, Some(reply), None),
            Command::FindNeighbours { target, net_id, reply } => {
                self.start_search(target, net_id, SearchKind::FindNeighbours, None, Some(reply))
            },
            Command::Connect { peer_id, peer_addr, service_id, net_id, reply } => {
                self.start_connect(peer_id, peer_addr, service_id, net_id, reply, now).await
            },
            Command::Rendezvous { target, net_id, reply } => self.start_rendezvous(target, net_id, reply).await,
            Command::RegisterService { service_id, tx, filter, reply } => {
                let _ = reply.send(self.services.register(service_id, tx, filter));
            },
            Command::UnregisterService { service_id } => self.services.unregister(&service_id),
            Command::StreamWrite { stream_id, data, reply } => {
                let result = self
                    .connections
                    .get_mut(&stream_id)
                    .ok_or(OverlayError::UnknownCookie)
                    .and_then(|s| s.write(&data));
                let _ = reply.send(result);
            },
            Command::StreamRead { stream_id, max, reply } => {
                let result = self.connections.get_mut(&stream_id).ok_or(OverlayError::UnknownCookie).map(|s| {
                    let mut buf = vec![0u8; max];
                    let n = s.read(&mut buf);
                    buf.truncate(n);
                    buf
                });
                let _ = reply.send(result);
            },
            Command::StreamClose { stream_id } => {
                if let Some(stream) = self.connections.get_mut(&stream_id) {
                    stream.close();
                }
            },
            Command::StreamReset { stream_id } => {
                if let Some(mut stream) = self.connections.remove(&stream_id)
                    && let Some(record) = stream.reset()
                {
                    self.bytes_sent_since_tick += record.len() as u64;
                    let _ = self.socket.send_to(&record, stream.peer_addr()).await;
                }
            },
            Command::IoStats { reply } => {
                let _ = reply.send(self.io_stats);
            },
            Command::Shutdown => {},
        }
    }

    fn start_search(
        &mut self,
        target: Identifier,
        net_id: Identifier,
        kind: SearchKind,
        reply: Option<oneshot::Sender<Option<SocketAddr>>>,
        reply_neighbours: Option<oneshot::Sender<Vec<(Identifier, SocketAddr)>>>,
    ) {
        let Some(net) = self.networks.get(&net_id) else {
            if let Some(reply) = reply {
                let _ = reply.send(None);
            }
            if let Some(reply) = reply_neighbours {
                let _ = reply.send(Vec::new());
            }
            return;
        };
        let mut query = SearchQuery::new(target, kind, self.local_id);
        query.seed(net.buckets.get_nearest(&target, crate::wire::message::K).into_iter().map(|r| (r.id, r.addr)));

        let cookie = Identifier::random();
        self.searches.insert(cookie, ActiveSearch { query, net_id, in_flight: 0, reply, reply_neighbours });
        let now = std::time::Instant::now();
        self.pump_search(cookie, now);
    }

    /// Fan out up to `ALPHA` unqueried SEARCH requests for an active
    /// query, or finish it once the walk has nothing left to try and no
    /// request for it is still outstanding.
    fn pump_search(&mut self, search_cookie: Identifier, now: std::time::Instant) {
        let Some(active) = self.searches.get_mut(&search_cookie) else { return };
        if active.query.is_complete() {
            self.finish_search(search_cookie);
            return;
        }
        let net_id = active.net_id;
        let target = active.query.target;
        let targets = active.query.next_many(ALPHA);
        if targets.is_empty() {
            if active.in_flight == 0 {
                self.finish_search(search_cookie);
            }
            return;
        }
        let sent = targets.len();
        for (_, addr) in targets {
            let cookie = Identifier::random();
            let request = SearchRequest { target, net_id };
            let mut out = Vec::new();
            out.extend_from_slice(cookie.as_bytes());
            request.encode(&mut out);
            if self.socket.try_send_to(&out, addr).is_ok() {
                self.bytes_sent_since_tick += out.len() as u64;
            }
            self.pending.insert(cookie, PendingRequest { peer_addr: addr, net_id, sent_at: now, kind: PendingKind::Search { search_cookie } });
        }
        if let Some(active) = self.searches.get_mut(&search_cookie) {
            active.in_flight += sent;
        }
    }

    fn finish_search(&mut self, search_cookie: Identifier) {
        let Some(active) = self.searches.remove(&search_cookie) else { return };
        if let Some(reply) = active.reply {
            let _ = reply.send(active.query.found_target());
        }
        if let Some(reply) = active.reply_neighbours {
            let _ = reply.send(active.query.best().iter().map(|c| (c.id, c.addr)).collect());
        }
        if active.query.found_target().is_none() {
            let _ = self.events.send(NodeEvent::NodeNotFound { target: active.query.target });
        } else if let Some(addr) = active.query.found_target() {
            let _ = self.events.send(NodeEvent::NodeFound { target: active.query.target, addr });
        }
    }

    async fn start_connect(
        &mut self,
        peer_id: Identifier,
        peer_addr: SocketAddr,
        service_id: Identifier,
        net_id: Identifier,
        reply: oneshot::Sender<Result<Identifier, OverlayError>>,
        now: std::time::Instant,
    ) {
        if peer_id == self.local_id {
            let _ = reply.send(Err(OverlayError::HandshakeFailure("refusing to connect to self")));
            return;
        }
        let cookie = Identifier::random();
        let eph = EphemeralKeypair::generate();
        let blob = build_handshake_blob(&self.identity, &eph);
        let request = Connect { service_id, handshake: blob };
        let mut out = Vec::new();
        out.extend_from_slice(cookie.as_bytes());
        request.encode(&mut out);
        if self.socket.send_to(&out, peer_addr).await.is_err() {
            let _ = reply.send(Err(OverlayError::BindFailure(std::io::Error::other("send failed"))));
            return;
        }
        self.bytes_sent_since_tick += out.len() as u64;
        self.pending.insert(
            cookie,
            PendingRequest { peer_addr, net_id, sent_at: now, kind: PendingKind::Connect { service_id, expected_peer: peer_id, eph } },
        );
        let _ = reply.send(Ok(cookie));
    }

    async fn start_rendezvous(&mut self, target: Identifier, net_id: Identifier, reply: oneshot::Sender<bool>) {
        let Some(net) = self.networks.get(&net_id) else {
            let _ = reply.send(false);
            return;
        };
        let relays = net.buckets.get_nearest(&target, crate::wire::message::K);
        let sent = !relays.is_empty();
        // §4.G: the originator sends RENDEZVOUS{target, 0, 0} — the relay
        // fills in the observed source address, since that's the only
        // address worth punching toward behind a NAT.
        let zero_addr: SocketAddr = "0.0.0.0:0".parse().expect("valid fallback addr");
        for relay in relays {
            let notification = Rendezvous { target, addr: zero_addr };
            self.send_one_way(relay.addr, |out| notification.encode(out)).await;
        }
        let _ = reply.send(sent);
        let event = if sent { NodeEvent::RendezvousSent { target } } else { NodeEvent::RendezvousFailed { target } };
        let _ = self.events.send(event);
    }

    // ---- maintenance ------------------------------------------------------

    async fn on_request_expiry(&mut self, now: std::time::Instant) {
        let expired = self.pending.expire(now, self.cfg.request_timeout);
        let mut timed_out_searches = Vec::new();
        for (_, request) in expired {
            match request.kind {
                PendingKind::Ping { node_id, reply } => {
                    if let Some(net) = self.networks.get_mut(&request.net_id) {
                        net.buckets.ping_lost(&node_id);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(false);
                    }
                },
                // §4.D: a timed-out SEARCH advances the query to the
                // next candidate rather than retrying the same peer.
                PendingKind::Search { search_cookie } => timed_out_searches.push(search_cookie),
                PendingKind::Connect { service_id, .. } => {
                    let _ = self.events.send(NodeEvent::ConnectionFailed { service: service_id, peer: Identifier::ZERO });
                },
                PendingKind::Rendezvous { .. } => {},
            }
        }
        for search_cookie in timed_out_searches {
            if let Some(active) = self.searches.get_mut(&search_cookie) {
                active.in_flight = active.in_flight.saturating_sub(1);
            }
            self.pump_search(search_cookie, now);
        }
        self.check_root_connectivity();
    }

    async fn on_bucket_maintenance(&mut self, now: std::time::Instant) {
        let net_ids: Vec<Identifier> = self.networks.keys().copied().collect();
        for net_id in net_ids {
            let stale: Vec<(Identifier, SocketAddr)> = {
                let Some(net) = self.networks.get(&net_id) else { continue };
                net.buckets
                    .get_older_than(self.cfg.reping_age)
                    .into_iter()
                    .filter_map(|id| net.buckets.get_node(&id).map(|r| (id, r.addr)))
                    .collect()
            };
            if let Some(net) = self.networks.get_mut(&net_id) {
                net.buckets.remove_older_than(self.cfg.expire_age);
            }
            for (id, addr) in stale {
                self.send_ping_for_reping(id, addr, now, false).await;
            }
            // Self-lookup keeps the table's closest region fresh
            // (supplemented feature, see SPEC_FULL.md).
            self.start_search(self.local_id, net_id, SearchKind::FindNeighbours, None, None);
        }
        self.check_root_connectivity();
    }

    async fn on_stream_tick(&mut self, now: std::time::Instant) {
        let mut closed = Vec::new();
        for (stream_id, stream) in self.connections.iter_mut() {
            let (records, _events) = stream.tick(now, &self.cfg);
            for record in records {
                self.bytes_sent_since_tick += record.len() as u64;
                let _ = self.socket.send_to(&record, stream.peer_addr()).await;
            }
            if stream.state() == crate::stream::StreamState::Closed {
                closed.push(*stream_id);
            }
        }
        for stream_id in closed {
            self.connections.remove(&stream_id);
        }
    }

    /// §4.D "every 5s: update I/O rate statistics": turn the byte
    /// counters accumulated since the last tick into a bytes/sec rate
    /// and reset them for the next window.
    fn on_stats_tick(&mut self, now: std::time::Instant) {
        let elapsed = now.duration_since(self.last_stats_tick).as_secs_f64();
        if elapsed > 0.0 {
            self.io_stats = IoStats {
                bytes_sent_per_sec: self.bytes_sent_since_tick as f64 / elapsed,
                bytes_received_per_sec: self.bytes_received_since_tick as f64 / elapsed,
            };
            trace!(io_stats = ?self.io_stats, "updated io rate statistics");
        }
        self.bytes_sent_since_tick = 0;
        self.bytes_received_since_tick = 0;
        self.last_stats_tick = now;
    }

    async fn on_nat_keepalive(&mut self, now: std::time::Instant) {
        let Some(root) = self.networks.get(&local_id_of_root()) else { return };
        let targets: Vec<(Identifier, SocketAddr)> =
            root.buckets.verified().into_iter().map(|r| (r.id, r.addr)).collect();
        for (id, addr) in targets {
            self.send_ping_for_reping(id, addr, now, false).await;
        }
    }

    async fn send_ping_for_reping(&mut self, node_id: Identifier, addr: SocketAddr, now: std::time::Instant, _is_punch: bool) {
        self.send_ping(node_id, addr, local_id_of_root(), None, now).await;
    }

    /// §6 `ping(...)`: caller-initiated PING against a known `(id, addr)`,
    /// replying once the response arrives or the request times out.
    async fn start_ping(
        &mut self,
        peer_id: Identifier,
        peer_addr: SocketAddr,
        net_id: Identifier,
        reply: Option<oneshot::Sender<bool>>,
        now: std::time::Instant,
    ) {
        self.send_ping(peer_id, peer_addr, net_id, reply, now).await;
    }

    async fn send_ping(
        &mut self,
        node_id: Identifier,
        addr: SocketAddr,
        net_id: Identifier,
        reply: Option<oneshot::Sender<bool>>,
        now: std::time::Instant,
    ) {
        let cookie = Identifier::random();
        let ping = Ping { sender_id: self.local_id, net_id };
        let mut out = Vec::new();
        out.extend_from_slice(cookie.as_bytes());
        ping.encode(&mut out);
        let _ = self.socket.send_to(&out, addr).await;
        self.bytes_sent_since_tick += out.len() as u64;
        self.pending.insert(
            cookie,
            PendingRequest { peer_addr: addr, net_id, sent_at: now, kind: PendingKind::Ping { node_id, reply } },
        );
    }

    // ---- small helpers ----------------------------------------------------

    async fn send_response(&mut self, cookie: Identifier, to: SocketAddr, encode: impl FnOnce(&mut Vec<u8>)) {
        let mut out = Vec::with_capacity(crate::id::ID_LEN);
        out.extend_from_slice(cookie.as_bytes());
        encode(&mut out);
        let _ = self.socket.send_to(&out, to).await;
        self.bytes_sent_since_tick += out.len() as u64;
    }

    async fn send_one_way(&mut self, to: SocketAddr, encode: impl FnOnce(&mut Vec<u8>)) {
        let cookie = Identifier::random();
        let mut out = Vec::with_capacity(crate::id::ID_LEN);
        out.extend_from_slice(cookie.as_bytes());
        encode(&mut out);
        let _ = self.socket.send_to(&out, to).await;
        self.bytes_sent_since_tick += out.len() as u64;
    }

    fn check_root_connectivity(&mut self) {
        let Some(root) = self.networks.get(&local_id_of_root()) else { return };
        let connected = root.buckets.verified_count() > 0;
        if connected != self.root_was_connected {
            self.root_was_connected = connected;
            let event = if connected { NodeEvent::Connected } else { NodeEvent::Disconnected };
            let _ = self.events.send(event);
        }
    }
}

/// The root network's id is the hash of the empty prefix; computed once
/// and reused rather than re-hashing on every lookup.
fn local_id_of_root() -> Identifier {
    crate::network::network_id("")
}
