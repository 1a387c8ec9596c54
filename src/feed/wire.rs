//! Wire Protocol for the Market Data Feed
//!
//! Two fixed-size messages, no framing:
//! - Request (client -> server): 2 bytes
//! - Record (server -> client): 17 bytes
//!
//! Multi-byte integers are big-endian (network byte order).

use serde::Serialize;

/// Request packet size in bytes
pub const REQUEST_SIZE: usize = 2;

/// Record packet size in bytes
/// 4+1+4+4+4 = 17 bytes
pub const RECORD_SIZE: usize = 17;

/// Width of the symbol tag
pub const SYMBOL_LEN: usize = 4;

/// Largest sequence number a re-send request can name faithfully.
pub const MAX_RESEND_SEQUENCE: i32 = u8::MAX as i32;

/// Command opcodes (byte 0 of a request)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Stream every record, then close
    StreamAll = 1,
    /// Re-send one sequence number, then close
    Resend = 2,
}

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::StreamAll),
            2 => Some(Self::Resend),
            _ => None,
        }
    }
}

/// Encode a 2-byte command.
///
/// The parameter byte is the target sequence truncated to 8 bits, so a
/// re-send for `300` asks the server for `44`. The request size is fixed
/// by the protocol; callers that care should compare against
/// [`MAX_RESEND_SEQUENCE`].
#[inline]
pub fn encode_request(opcode: Opcode, sequence: i32) -> [u8; REQUEST_SIZE] {
    [opcode as u8, sequence as u8]
}

/// One decoded market event.
///
/// Layout (big-endian):
/// ```text
/// Offset  Size  Field
/// 0       4     symbol
/// 4       1     side
/// 5       4     size (i32)
/// 9       4     price (i32)
/// 13      4     sequence (i32)
/// Total: 17 bytes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarketRecord {
    pub symbol: [u8; SYMBOL_LEN],
    pub side: u8,
    pub size: i32,
    pub price: i32,
    pub sequence: i32,
}

impl MarketRecord {
    pub fn new(symbol: &str, side: char, size: i32, price: i32, sequence: i32) -> Self {
        let mut tag = [0u8; SYMBOL_LEN];
        for (dst, src) in tag.iter_mut().zip(symbol.bytes()) {
            *dst = src;
        }
        Self {
            symbol: tag,
            side: side as u8,
            size,
            price,
            sequence,
        }
    }

    /// Symbol as text. Bytes are opaque on the wire; trailing NULs are dropped
    /// and invalid UTF-8 is replaced.
    pub fn symbol_str(&self) -> String {
        let end = self
            .symbol
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.symbol[..end]).into_owned()
    }

    /// Side marker as a character
    #[inline]
    pub fn side_char(&self) -> char {
        self.side as char
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.symbol);
        buf[4] = self.side;
        buf[5..9].copy_from_slice(&self.size.to_be_bytes());
        buf[9..13].copy_from_slice(&self.price.to_be_bytes());
        buf[13..17].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }
}

/// Decode a 17-byte record.
pub fn decode_record(buf: &[u8; RECORD_SIZE]) -> MarketRecord {
    let be_i32 = |at: usize| i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    MarketRecord {
        symbol: [buf[0], buf[1], buf[2], buf[3]],
        side: buf[4],
        size: be_i32(5),
        price: be_i32(9),
        sequence: be_i32(13),
    }
}

/// Export shape of a record (JSON keys match the downstream consumers).
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(rename = "assetCode")]
    pub asset_code: String,
    #[serde(rename = "orderDirection")]
    pub order_direction: String,
    pub size: i32,
    pub cost: i32,
    #[serde(rename = "sequenceNum")]
    pub sequence_num: i32,
}

impl From<&MarketRecord> for RecordView {
    fn from(r: &MarketRecord) -> Self {
        Self {
            asset_code: r.symbol_str(),
            order_direction: r.side_char().to_string(),
            size: r.size,
            cost: r.price,
            sequence_num: r.sequence,
        }
    }
}
