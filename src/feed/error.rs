//! Feed client error taxonomy
//!
//! `Closed` is deliberately absent: orderly end-of-data is a
//! [`ReceiveOutcome`](super::transport::ReceiveOutcome), not a failure.

use std::{io, path::PathBuf};

#[derive(Debug)]
pub enum FeedError {
    /// Transport could not be established
    Connection { endpoint: String, source: io::Error },
    /// Outbound write failed
    Send(io::Error),
    /// Inbound read failed for a reason other than orderly closure
    Receive(io::Error),
    /// Exporter could not persist the dataset
    Export { path: PathBuf, source: io::Error },
}

impl FeedError {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { endpoint, source } => {
                write!(f, "connection to {} failed: {}", endpoint, source)
            }
            Self::Send(e) => write!(f, "send failed: {}", e),
            Self::Receive(e) => write!(f, "receive failed: {}", e),
            Self::Export { path, source } => {
                write!(f, "export to {} failed: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection { source, .. } | Self::Export { source, .. } => Some(source),
            Self::Send(e) | Self::Receive(e) => Some(e),
        }
    }
}
