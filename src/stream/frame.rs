// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frames carried inside a secure stream's encrypted payload (§4.F).
//! These are encoded, then handed to `SecureSocket::encrypt_record` —
//! they never appear on the wire in the clear.

use crate::error::OverlayError;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// A run of in-order-numbered application bytes starting at `seq`.
    /// An empty payload doubles as a keep-alive.
    Data { seq: u32, payload: Vec<u8> },
    /// Cumulative acknowledgement plus the current receive window.
    Ack { ack: u32, window: u16 },
    /// Hard abort: the receiver must discard all buffered state.
    Reset,
    /// Graceful half-close: no more `Data` frames will follow `seq`.
    Fin { seq: u32 },
}

#[repr(u8)]
enum Tag {
    Data = 0,
    Ack = 1,
    Reset = 2,
    Fin = 3,
}

impl StreamFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            StreamFrame::Data { seq, payload } => {
                out.push(Tag::Data as u8);
                out.extend_from_slice(&seq.to_be_bytes());
                out.extend_from_slice(payload);
            },
            StreamFrame::Ack { ack, window } => {
                out.push(Tag::Ack as u8);
                out.extend_from_slice(&ack.to_be_bytes());
                out.extend_from_slice(&window.to_be_bytes());
            },
            StreamFrame::Reset => {
                out.push(Tag::Reset as u8);
            },
            StreamFrame::Fin { seq } => {
                out.push(Tag::Fin as u8);
                out.extend_from_slice(&seq.to_be_bytes());
            },
        }
        out
    }

    pub fn decode(body: &[u8]) -> Result<Self, OverlayError> {
        let (&tag, rest) = body.split_first().ok_or(OverlayError::BadDatagram)?;
        match tag {
            t if t == Tag::Data as u8 => {
                let seq_bytes: [u8; 4] =
                    rest.get(0..4).ok_or(OverlayError::BadDatagram)?.try_into().expect("4 bytes");
                Ok(StreamFrame::Data { seq: u32::from_be_bytes(seq_bytes), payload: rest[4..].to_vec() })
            },
            t if t == Tag::Ack as u8 => {
                if rest.len() != 6 {
                    return Err(OverlayError::BadDatagram);
                }
                let ack = u32::from_be_bytes(rest[0..4].try_into().expect("4 bytes"));
                let window = u16::from_be_bytes(rest[4..6].try_into().expect("2 bytes"));
                Ok(StreamFrame::Ack { ack, window })
            },
            t if t == Tag::Reset as u8 => Ok(StreamFrame::Reset),
            t if t == Tag::Fin as u8 => {
                if rest.len() != 4 {
                    return Err(OverlayError::BadDatagram);
                }
                let seq = u32::from_be_bytes(rest.try_into().expect("4 bytes"));
                Ok(StreamFrame::Fin { seq })
            },
            _ => Err(OverlayError::BadDatagram),
        }
    }
}
