// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-code runtime parameters for a `Node` (§4.D "Maintenance loops",
//! §5). File/CLI/env *loading* of these values is out of scope (§1) and
//! left to the embedder — this struct is plain data with no `serde`
//! attached; wrap it yourself if you want a config file.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How often expired pending requests are reaped (§4.D: 500ms).
    pub request_expiry_interval: Duration,
    /// Age at which a pending request is considered timed out (§3: 2s).
    pub request_timeout: Duration,
    /// Bucket maintenance tick (§4.D: 60s).
    pub bucket_maintenance_interval: Duration,
    /// Age at which a verified record is re-pinged (§4.D: 15min).
    pub reping_age: Duration,
    /// Age at which a verified record is dropped outright (§4.D: 20min).
    pub expire_age: Duration,
    /// NAT keep-alive tick toward the k nearest neighbours (§4.D: 10s).
    /// `None` disables the keep-alive (matches "when enabled").
    pub nat_keepalive_interval: Option<Duration>,
    /// I/O rate statistics tick (§4.D: 5s).
    pub stats_interval: Duration,
    /// Stream keep-alive tick (§4.F: 5s).
    pub stream_keepalive_interval: Duration,
    /// Stream retransmit tick (§4.F: 100ms).
    pub stream_packet_timer_interval: Duration,
    /// Stream idle timeout (§4.F: 30s).
    pub stream_idle_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            request_expiry_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
            bucket_maintenance_interval: Duration::from_secs(60),
            reping_age: Duration::from_secs(15 * 60),
            expire_age: Duration::from_secs(20 * 60),
            nat_keepalive_interval: Some(Duration::from_secs(10)),
            stats_interval: Duration::from_secs(5),
            stream_keepalive_interval: Duration::from_secs(5),
            stream_packet_timer_interval: Duration::from_millis(100),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}
