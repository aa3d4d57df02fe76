// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire address encoding: every address on the bus travels as a 16-byte
//! IPv6 address, IPv4 mapped as `::ffff:A.B.C.D` (§1 "IPv4/IPv6 dual-stack
//! ... the wire encodes 16-byte IPv6-mapped addresses uniformly").

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

pub const ADDR_LEN: usize = 16;

pub fn encode_ip(addr: &std::net::IpAddr) -> [u8; ADDR_LEN] {
    match addr {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        std::net::IpAddr::V6(v6) => v6.octets(),
    }
}

pub fn decode_ip(bytes: &[u8; ADDR_LEN]) -> std::net::IpAddr {
    let v6 = Ipv6Addr::from(*bytes);
    match v6.to_ipv4_mapped() {
        Some(v4) => std::net::IpAddr::V4(v4),
        None => std::net::IpAddr::V6(v6),
    }
}

pub fn encode_socket_addr(addr: &SocketAddr) -> ([u8; ADDR_LEN], u16) {
    (encode_ip(&addr.ip()), addr.port())
}

pub fn decode_socket_addr(ip: &[u8; ADDR_LEN], port: u16) -> SocketAddr {
    match decode_ip(ip) {
        std::net::IpAddr::V4(v4) => SocketAddr::V4(SocketAddrV4::new(v4, port)),
        std::net::IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, port, 0, 0)),
    }
}
