// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Datagram wire format (§4.D, §6 "External Interfaces — Wire").
//!
//! Every datagram on the UDP bus begins with a 20-byte cookie. What
//! follows depends on context: a one-byte discriminator for new requests,
//! nothing extra for responses (the cookie alone identifies the pending
//! request), and an 8-byte sequence number for session traffic (handled
//! in `crate::crypto::secure_socket`, not here).
//!
//! All multi-byte scalars are big-endian, matching the RFC 7143 BHS
//! convention the teacher's `models::common` module follows for iSCSI.

use crate::{
    error::OverlayError,
    id::{ID_LEN, Identifier},
    wire::addr::{ADDR_LEN, decode_socket_addr, encode_socket_addr},
};

/// Cookie / hash / fingerprint width on the wire.
pub const COOKIE_LEN: usize = ID_LEN;
pub const HASH_LEN: usize = ID_LEN;

/// Maximum UDP message size this protocol will ever send or accept.
pub const MAX_MESSAGE: usize = 8192;

/// Payload budget once the cookie is stripped off.
pub const MAX_DATA: usize = MAX_MESSAGE - COOKIE_LEN;

/// Wire layout of one SEARCH-response entry: `id(20) | ipv6(16) | port(2)`.
pub const TRIPLE_LEN: usize = ID_LEN + ADDR_LEN + 2;

/// Bucket capacity / replication factor.
pub const K: usize = 8;

/// Upper bound on triples in a single SEARCH response, sized so a SEARCH
/// request padded to this size cannot be used to amplify traffic toward a
/// spoofed victim (response is never larger than the request that
/// solicited it).
pub const MAX_TRIPLES: usize = (MAX_MESSAGE - COOKIE_LEN - 1) / TRIPLE_LEN;

/// Discriminator byte following the cookie on new requests.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Ping = 0,
    Search = 1,
    Connect = 2,
    Rendezvous = 3,
}

impl TryFrom<u8> for RequestKind {
    type Error = OverlayError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RequestKind::Ping),
            1 => Ok(RequestKind::Search),
            2 => Ok(RequestKind::Connect),
            3 => Ok(RequestKind::Rendezvous),
            _ => Err(OverlayError::BadDatagram),
        }
    }
}

fn take<'a>(buf: &'a [u8], n: usize) -> Result<(&'a [u8], &'a [u8]), OverlayError> {
    if buf.len() < n {
        return Err(OverlayError::BadDatagram);
    }
    Ok(buf.split_at(n))
}

fn take_id(buf: &[u8]) -> Result<(Identifier, &[u8]), OverlayError> {
    let (head, rest) = take(buf, ID_LEN)?;
    let mut bytes = [0u8; ID_LEN];
    bytes.copy_from_slice(head);
    Ok((Identifier::from_bytes(bytes), rest))
}

/// `PING` request/response body (after the cookie): `senderId | netId`.
#[derive(Debug, Clone)]
pub struct Ping {
    pub sender_id: Identifier,
    pub net_id: Identifier,
}

impl Ping {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(RequestKind::Ping as u8);
        out.extend_from_slice(self.sender_id.as_bytes());
        out.extend_from_slice(self.net_id.as_bytes());
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (sender_id, rest) = take_id(body)?;
        let (net_id, _) = take_id(rest)?;
        Ok(Ping { sender_id, net_id })
    }
}

/// `SEARCH` request body: `targetId | netId | padding`. The request is
/// padded so its total datagram size equals the maximum possible response
/// size (anti-amplification, §4.D).
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub target: Identifier,
    pub net_id: Identifier,
}

impl SearchRequest {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(RequestKind::Search as u8);
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(self.net_id.as_bytes());
        let unpadded = COOKIE_LEN + 1 + ID_LEN + ID_LEN;
        let max_response = COOKIE_LEN + MAX_TRIPLES * TRIPLE_LEN;
        let pad_len = max_response.saturating_sub(unpadded);
        out.resize(out.len() + pad_len, 0);
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (target, rest) = take_id(body)?;
        let (net_id, _) = take_id(rest)?;
        Ok(SearchRequest { target, net_id })
    }
}

/// One `(id, addr)` entry in a SEARCH response.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub id: Identifier,
    pub addr: std::net::SocketAddr,
}

/// `SEARCH` response body: zero or more triples, no discriminator (the
/// cookie alone identifies this as a response to a pending SEARCH).
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub triples: Vec<Triple>,
}

impl SearchResponse {
    pub fn encode(&self, out: &mut Vec<u8>) {
        for t in self.triples.iter().take(MAX_TRIPLES) {
            out.extend_from_slice(t.id.as_bytes());
            let (ip, port) = encode_socket_addr(&t.addr);
            out.extend_from_slice(&ip);
            out.extend_from_slice(&port.to_be_bytes());
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        if body.len() % TRIPLE_LEN != 0 {
            return Err(OverlayError::BadDatagram);
        }
        let mut triples = Vec::with_capacity(body.len() / TRIPLE_LEN);
        for chunk in body.chunks_exact(TRIPLE_LEN) {
            let (id, rest) = take_id(chunk)?;
            let (ip_bytes, rest) = take(rest, ADDR_LEN)?;
            let (port_bytes, _) = take(rest, 2)?;
            let mut ip = [0u8; ADDR_LEN];
            ip.copy_from_slice(ip_bytes);
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
            triples.push(Triple { id, addr: decode_socket_addr(&ip, port) });
        }
        Ok(SearchResponse { triples })
    }
}

/// `{identityPub, ephPub, Sign_identity(ephPub)}`, each length-prefixed by
/// a big-endian `u16` (§4.E).
#[derive(Debug, Clone)]
pub struct HandshakeBlob {
    pub identity_pub: Vec<u8>,
    pub eph_pub: Vec<u8>,
    pub sig: Vec<u8>,
}

impl HandshakeBlob {
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_len_prefixed(out, &self.identity_pub);
        encode_len_prefixed(out, &self.eph_pub);
        encode_len_prefixed(out, &self.sig);
    }

    pub fn decode(body: &[u8]) -> Result<(Self, &[u8]), OverlayError> {
        let (identity_pub, rest) = decode_len_prefixed(body)?;
        let (eph_pub, rest) = decode_len_prefixed(rest)?;
        let (sig, rest) = decode_len_prefixed(rest)?;
        Ok((HandshakeBlob { identity_pub, eph_pub, sig }, rest))
    }
}

fn encode_len_prefixed(out: &mut Vec<u8>, data: &[u8]) {
    let len = data.len() as u16;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
}

fn decode_len_prefixed(buf: &[u8]) -> Result<(Vec<u8>, &[u8]), OverlayError> {
    let (len_bytes, rest) = take(buf, 2)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let (data, rest) = take(rest, len)?;
    Ok((data.to_vec(), rest))
}

/// `CONNECT` request/response body: `serviceId | handshakeBlob`.
#[derive(Debug, Clone)]
pub struct Connect {
    pub service_id: Identifier,
    pub handshake: HandshakeBlob,
}

impl Connect {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(RequestKind::Connect as u8);
        out.extend_from_slice(self.service_id.as_bytes());
        self.handshake.encode(out);
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (service_id, rest) = take_id(body)?;
        let (handshake, _) = HandshakeBlob::decode(rest)?;
        Ok(Connect { service_id, handshake })
    }
}

/// `RENDEZVOUS` notification body: `targetId | ip(16) | port(2)`.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    pub target: Identifier,
    pub addr: std::net::SocketAddr,
}

impl Rendezvous {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(RequestKind::Rendezvous as u8);
        out.extend_from_slice(self.target.as_bytes());
        let (ip, port) = encode_socket_addr(&self.addr);
        out.extend_from_slice(&ip);
        out.extend_from_slice(&port.to_be_bytes());
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (target, rest) = take_id(body)?;
        let (ip_bytes, rest) = take(rest, ADDR_LEN)?;
        let (port_bytes, _) = take(rest, 2)?;
        let mut ip = [0u8; ADDR_LEN];
        ip.copy_from_slice(ip_bytes);
        let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
        Ok(Rendezvous { target, addr: decode_socket_addr(&ip, port) })
    }
}

/// A datagram after its cookie has been stripped off: either a new
/// request (tagged by discriminator) or a bare response payload whose
/// interpretation is supplied by the pending-request table.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Ping(Ping),
    Search(SearchRequest),
    Connect(Connect),
    Rendezvous(Rendezvous),
}

impl RequestBody {
    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (&kind_byte, rest) = body.split_first().ok_or(OverlayError::BadDatagram)?;
        match RequestKind::try_from(kind_byte)? {
            RequestKind::Ping => Ok(RequestBody::Ping(Ping::decode(rest)?)),
            RequestKind::Search => Ok(RequestBody::Search(SearchRequest::decode(rest)?)),
            RequestKind::Connect => Ok(RequestBody::Connect(Connect::decode(rest)?)),
            RequestKind::Rendezvous => Ok(RequestBody::Rendezvous(Rendezvous::decode(rest)?)),
        }
    }
}
