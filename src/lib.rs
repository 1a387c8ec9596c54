//! Feed Recovery Library
//!
//! Client for the fixed-length binary market data feed: pulls the full
//! stream, backfills sequence gaps one re-send at a time, and hands a
//! sequence-ordered dataset to an exporter.

pub mod export;
pub mod feed;
pub mod report;

pub use export::JsonFileExporter;
pub use report::SessionReport;
