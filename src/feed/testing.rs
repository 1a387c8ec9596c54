//! In-memory feed source for unit tests.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io,
    rc::Rc,
};

use super::error::FeedError;
use super::transport::{Connector, ReceiveOutcome, Transport};
use super::wire::{MarketRecord, Opcode};

#[derive(Debug, Default)]
pub struct FeedLog {
    pub connects: usize,
    pub refused: usize,
    pub closes: usize,
    /// `receive_exact` calls across all sessions
    pub reads: usize,
    pub requests: Vec<[u8; 2]>,
}

impl FeedLog {
    /// Every accepted session was closed exactly once
    pub fn all_closed(&self) -> bool {
        self.connects - self.refused == self.closes
    }
}

struct FeedData {
    stream: Vec<MarketRecord>,
    resend: HashMap<u8, MarketRecord>,
    stream_error: bool,
    resend_error: bool,
    send_error: bool,
}

pub struct FakeFeed {
    data: Rc<FeedData>,
    refuse: Box<dyn Fn(usize) -> bool>,
    log: Rc<RefCell<FeedLog>>,
}

impl FakeFeed {
    /// Serves `stream` for opcode 1 and re-sends keyed by the 8-bit parameter.
    pub fn new(stream: Vec<MarketRecord>, resend: Vec<MarketRecord>) -> Self {
        let resend = resend
            .into_iter()
            .map(|r| (r.sequence as u8, r))
            .collect();
        Self {
            data: Rc::new(FeedData {
                stream,
                resend,
                stream_error: false,
                resend_error: false,
                send_error: false,
            }),
            refuse: Box::new(|_| false),
            log: Rc::new(RefCell::new(FeedLog::default())),
        }
    }

    /// Refuse the connect attempt with the given 0-based index
    pub fn refusing(mut self, refuse: impl Fn(usize) -> bool + 'static) -> Self {
        self.refuse = Box::new(refuse);
        self
    }

    /// End the full stream with a receive error instead of a close
    pub fn with_stream_error(mut self) -> Self {
        if let Some(data) = Rc::get_mut(&mut self.data) {
            data.stream_error = true;
        }
        self
    }

    /// End every re-send with a receive error instead of a close
    pub fn with_resend_error(mut self) -> Self {
        if let Some(data) = Rc::get_mut(&mut self.data) {
            data.resend_error = true;
        }
        self
    }

    /// Report every send as failed. Replies are still queued, so a caller
    /// that reads anyway gets data.
    pub fn with_send_error(mut self) -> Self {
        if let Some(data) = Rc::get_mut(&mut self.data) {
            data.send_error = true;
        }
        self
    }

    /// Answer re-send parameter `param` with `record`, whatever its sequence
    pub fn with_resend_reply(mut self, param: u8, record: MarketRecord) -> Self {
        if let Some(data) = Rc::get_mut(&mut self.data) {
            data.resend.insert(param, record);
        }
        self
    }

    pub fn log(&self) -> Rc<RefCell<FeedLog>> {
        self.log.clone()
    }
}

impl Connector for FakeFeed {
    type Session = FakeSession;

    fn connect(&self) -> Result<FakeSession, FeedError> {
        let mut log = self.log.borrow_mut();
        let attempt = log.connects;
        log.connects += 1;
        if (self.refuse)(attempt) {
            log.refused += 1;
            return Err(FeedError::Connection {
                endpoint: self.endpoint(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        Ok(FakeSession {
            data: self.data.clone(),
            log: self.log.clone(),
            replies: VecDeque::new(),
            error_at_end: false,
            closed: false,
        })
    }

    fn endpoint(&self) -> String {
        "fake:0".to_string()
    }
}

pub struct FakeSession {
    data: Rc<FeedData>,
    log: Rc<RefCell<FeedLog>>,
    replies: VecDeque<MarketRecord>,
    error_at_end: bool,
    closed: bool,
}

impl Transport for FakeSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), FeedError> {
        let request = [bytes[0], bytes[1]];
        self.log.borrow_mut().requests.push(request);
        match Opcode::from_u8(request[0]) {
            Some(Opcode::StreamAll) => {
                self.replies = self.data.stream.iter().copied().collect();
                self.error_at_end = self.data.stream_error;
            }
            Some(Opcode::Resend) => {
                self.replies = self.data.resend.get(&request[1]).copied().into_iter().collect();
                self.error_at_end = self.data.resend_error;
            }
            None => {}
        }
        if self.data.send_error {
            return Err(FeedError::Send(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<ReceiveOutcome, FeedError> {
        self.log.borrow_mut().reads += 1;
        match self.replies.pop_front() {
            Some(record) => {
                buf.copy_from_slice(&record.to_bytes());
                Ok(ReceiveOutcome::Complete)
            }
            None if self.error_at_end => Err(FeedError::Receive(io::Error::from(
                io::ErrorKind::ConnectionReset,
            ))),
            None => Ok(ReceiveOutcome::Closed),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.borrow_mut().closes += 1;
        }
    }
}

/// Records with the given sequence numbers
pub fn records(seqs: &[i32]) -> Vec<MarketRecord> {
    seqs.iter()
        .map(|&s| MarketRecord::new("MSFT", if s % 2 == 0 { 'B' } else { 'S' }, s * 10, 100 + s, s))
        .collect()
}
