//! JSON file exporter for the final dataset.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use tracing::info;

use crate::feed::{
    wire::{MarketRecord, RecordView},
    FeedError, RecordSink,
};

/// Writes records as a pretty-printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    path: PathBuf,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_all(&self, records: &[MarketRecord]) -> io::Result<()> {
        let views: Vec<RecordView> = records.iter().map(RecordView::from).collect();
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &views)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl RecordSink for JsonFileExporter {
    fn export(&mut self, records: &[MarketRecord]) -> Result<(), FeedError> {
        info!("Writing {} records to {}", records.len(), self.path.display());
        self.write_all(records).map_err(|source| FeedError::Export {
            path: self.path.clone(),
            source,
        })
    }
}
