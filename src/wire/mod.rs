// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Datagram wire format: addressing and message encode/decode (§4.D, §6).

pub mod addr;
pub mod message;
