//! Transport Session
//!
//! One connection-oriented channel per session. The protocol has no length
//! prefix, so reads are always exact-length: a short read is never success.
//! Core logic is written once against [`Transport`] / [`Connector`]; the TCP
//! implementation below is the only production one.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::{debug, warn};

use super::error::FeedError;
use super::wire::{decode_record, MarketRecord, RECORD_SIZE};

/// Result of an exact-length read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Buffer filled completely
    Complete,
    /// Remote signalled orderly closure before the buffer was filled
    Closed,
}

/// A single open channel to the feed source.
pub trait Transport {
    /// Write exactly `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<(), FeedError>;

    /// Block until `buf` is full, the remote closes, or the read fails.
    /// Interrupted reads are retried and never surface.
    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<ReceiveOutcome, FeedError>;

    /// Release the channel. Idempotent.
    fn close(&mut self);

    /// Read and decode one record. `Ok(None)` means orderly closure.
    fn receive_record(&mut self) -> Result<Option<MarketRecord>, FeedError> {
        let mut buf = [0u8; RECORD_SIZE];
        match self.receive_exact(&mut buf)? {
            ReceiveOutcome::Complete => Ok(Some(decode_record(&buf))),
            ReceiveOutcome::Closed => Ok(None),
        }
    }
}

/// Opens fresh sessions to one configured endpoint.
pub trait Connector {
    type Session: Transport;

    fn connect(&self) -> Result<Self::Session, FeedError>;

    /// Endpoint label for logs
    fn endpoint(&self) -> String;
}

/// Fill `buf` from `reader`, retrying on `Interrupted`.
///
/// Zero-byte reads mean orderly closure; bytes already accumulated are
/// discarded because a partial record carries no usable data.
pub fn read_exact_or_closed<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<ReceiveOutcome, FeedError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    debug!(
                        "Channel closed mid-record ({} of {} bytes), discarding",
                        filled,
                        buf.len()
                    );
                }
                return Ok(ReceiveOutcome::Closed);
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FeedError::Receive(e)),
        }
    }
    Ok(ReceiveOutcome::Complete)
}

/// TCP connector configuration
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub host: String,
    pub port: u16,
    /// `None` blocks until the OS gives up
    pub connect_timeout: Option<Duration>,
    /// `None` blocks indefinitely on reads
    pub read_timeout: Option<Duration>,
    pub tcp_nodelay: bool,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
            read_timeout: None,
            tcp_nodelay: true,
        }
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            ));
        }
        Ok(addrs)
    }

    fn open_stream(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.resolve()? {
            let attempt = match self.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)))
    }
}

impl Connector for TcpConnector {
    type Session = TcpSession;

    fn connect(&self) -> Result<TcpSession, FeedError> {
        let endpoint = self.endpoint();
        let stream = self.open_stream().map_err(|source| FeedError::Connection {
            endpoint: endpoint.clone(),
            source,
        })?;

        // Socket options are best effort
        if let Err(e) = stream.set_nodelay(self.tcp_nodelay) {
            warn!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }
        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            warn!("Failed to set read timeout on {}: {}", endpoint, e);
        }

        debug!("Connected to {}", endpoint);
        Ok(TcpSession {
            stream: Some(stream),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Blocking TCP session. Closed on drop if the owner did not close it.
#[derive(Debug)]
pub struct TcpSession {
    stream: Option<TcpStream>,
}

impl TcpSession {
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

fn not_connected() -> io::Error {
    io::Error::from(io::ErrorKind::NotConnected)
}

impl Transport for TcpSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), FeedError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FeedError::Send(not_connected()))?;
        // write_all retries on Interrupted and handles partial writes
        stream.write_all(bytes).map_err(FeedError::Send)?;
        stream.flush().map_err(FeedError::Send)
    }

    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<ReceiveOutcome, FeedError> {
        match self.stream.as_mut() {
            Some(stream) => read_exact_or_closed(stream, buf),
            None => Err(FeedError::Receive(not_connected())),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.close();
    }
}
