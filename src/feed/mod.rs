//! Market Data Feed Module
//!
//! Session protocol engine for the fixed-length binary feed:
//! - Wire codec: 2-byte requests, 17-byte records
//! - Transport: blocking exact-length reads over TCP
//! - Store + gap recovery: one re-send session per missing sequence
//! - Session: stream, backfill, sort, export

pub mod config;
pub mod error;
pub mod recovery;
pub mod session;
pub mod store;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use config::FeedClientConfig;
pub use error::FeedError;
pub use recovery::{BackfillOutcome, GapRecovery, GapRecoveryConfig, RecoveryTally};
pub use session::{FeedSession, RecordSink, SessionOutcome, SessionState, SessionSummary};
pub use store::{DuplicatePolicy, RecordStore};
pub use transport::{Connector, ReceiveOutcome, TcpConnector, TcpSession, Transport};
pub use wire::{decode_record, encode_request, MarketRecord, Opcode, RECORD_SIZE, REQUEST_SIZE};
