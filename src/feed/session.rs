//! Session Orchestrator
//!
//! Drives one run end to end:
//! IDLE -> CONNECTING -> STREAMING -> GAP_SCAN -> BACKFILLING -> SORTING -> EXPORTING -> DONE
//!
//! Only a failed initial connect ends the run early (ABORTED). Every other
//! transport failure is absorbed by the phase that saw it.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::FeedError;
use super::recovery::{GapRecovery, GapRecoveryConfig, RecoveryTally};
use super::store::{DuplicatePolicy, RecordStore};
use super::transport::{Connector, Transport};
use super::wire::{encode_request, MarketRecord, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Constructed, `run` not yet called
    Idle,
    Connecting,
    Streaming,
    GapScan,
    Backfilling,
    Sorting,
    Exporting,
    Done,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// Consumer of the final, sequence-ordered dataset.
pub trait RecordSink {
    fn export(&mut self, records: &[MarketRecord]) -> Result<(), FeedError>;
}

impl RecordSink for Vec<MarketRecord> {
    fn export(&mut self, records: &[MarketRecord]) -> Result<(), FeedError> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// What a completed run produced
#[derive(Debug)]
pub struct SessionSummary {
    /// Records kept from the initial stream
    pub streamed: usize,
    /// Records handed to the sink (stream plus backfill)
    pub total_records: usize,
    pub duplicates: u64,
    pub tally: RecoveryTally,
    pub elapsed: Duration,
    /// Set when the sink rejected the dataset; the run still reaches DONE
    pub export_error: Option<FeedError>,
}

#[derive(Debug)]
pub enum SessionOutcome {
    Done(SessionSummary),
    Aborted(FeedError),
}

impl SessionOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

pub struct FeedSession<C: Connector> {
    connector: C,
    recovery: GapRecovery,
    duplicate_policy: DuplicatePolicy,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<C: Connector> FeedSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            recovery: GapRecovery::default(),
            duplicate_policy: DuplicatePolicy::default(),
            state: SessionState::Idle,
            history: Vec::new(),
        }
    }

    pub fn with_recovery(mut self, config: GapRecoveryConfig) -> Self {
        self.recovery = GapRecovery::new(config);
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn enter(&mut self, state: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Run the full session against `sink`.
    pub fn run(&mut self, sink: &mut dyn RecordSink) -> SessionOutcome {
        let started = Instant::now();
        self.state = SessionState::Idle;
        self.history.clear();

        self.enter(SessionState::Connecting);
        let endpoint = self.connector.endpoint();
        let session = match self.connector.connect() {
            Ok(session) => session,
            Err(e) => {
                error!("Initial connection to {} failed, aborting: {}", endpoint, e);
                self.enter(SessionState::Aborted);
                return SessionOutcome::Aborted(e);
            }
        };
        info!("Connected to data server at {}", endpoint);

        self.enter(SessionState::Streaming);
        let mut store = RecordStore::with_policy(self.duplicate_policy);
        let streamed = stream_all(session, &mut store);

        self.enter(SessionState::GapScan);
        let max_sequence = store.max_sequence();
        info!("Highest sequence observed: {}", max_sequence);

        self.enter(SessionState::Backfilling);
        let tally = self.recovery.run(&self.connector, &mut store, max_sequence);

        self.enter(SessionState::Sorting);
        let duplicates = store.duplicates();
        let records = store.into_sorted();

        self.enter(SessionState::Exporting);
        let export_error = match sink.export(&records) {
            Ok(()) => {
                info!("Exported {} records", records.len());
                None
            }
            Err(e) => {
                error!("Export failed: {}", e);
                Some(e)
            }
        };

        self.enter(SessionState::Done);
        SessionOutcome::Done(SessionSummary {
            streamed,
            total_records: records.len(),
            duplicates,
            tally,
            elapsed: started.elapsed(),
            export_error,
        })
    }
}

/// Request the full stream and read records until closure or error.
/// The session is closed before returning. Returns records kept.
fn stream_all<T: Transport>(mut session: T, store: &mut RecordStore) -> usize {
    info!("Requesting initial data stream");
    if let Err(e) = session.send(&encode_request(Opcode::StreamAll, 0)) {
        // Non-fatal: the read loop will see the consequence
        warn!("Stream request failed: {}", e);
    }

    let mut kept = 0;
    loop {
        match session.receive_record() {
            Ok(Some(record)) => {
                debug!(seq = record.sequence, symbol = %record.symbol_str(), "Received record");
                if store.add(record) {
                    kept += 1;
                }
            }
            Ok(None) => {
                info!("Initial data stream complete ({} records)", kept);
                break;
            }
            Err(e) => {
                warn!("Initial stream ended by receive error after {} records: {}", kept, e);
                break;
            }
        }
    }

    session.close();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{records, FakeFeed};

    fn session(feed: FakeFeed) -> FeedSession<FakeFeed> {
        FeedSession::new(feed).with_recovery(GapRecoveryConfig {
            backfill_delay: Duration::ZERO,
        })
    }

    fn seqs(records: &[MarketRecord]) -> Vec<i32> {
        records.iter().map(|r| r.sequence).collect()
    }

    fn done(outcome: SessionOutcome) -> SessionSummary {
        match outcome {
            SessionOutcome::Done(summary) => summary,
            SessionOutcome::Aborted(e) => panic!("unexpected abort: {}", e),
        }
    }

    #[test]
    fn test_gap_filled() {
        let feed = FakeFeed::new(records(&[1, 2, 4, 5]), records(&[3]));
        let log = feed.log();
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), vec![1, 2, 3, 4, 5]);
        assert_eq!(summary.tally.missing, 1);
        assert_eq!(summary.tally.recovered, 1);
        assert_eq!(summary.streamed, 4);
        assert_eq!(summary.total_records, 5);
        assert_eq!(log.borrow().requests, vec![[1, 0], [2, 3]]);
        assert!(log.borrow().all_closed());
    }

    #[test]
    fn test_gap_left_when_backfill_connect_fails() {
        // First connect (initial stream) succeeds, every later one is refused
        let feed = FakeFeed::new(records(&[1, 2, 4, 5]), records(&[3])).refusing(|i| i > 0);
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), vec![1, 2, 4, 5]);
        assert_eq!(summary.tally.missing, 1);
        assert_eq!(summary.tally.recovered, 0);
    }

    #[test]
    fn test_output_ascending_for_any_arrival_order() {
        let feed = FakeFeed::new(records(&[9, 3, 7, 1, 5]), records(&[2, 4, 6, 8]));
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), (1..=9).collect::<Vec<_>>());
        assert!(out.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(summary.tally.recovered, 4);
    }

    #[test]
    fn test_empty_stream_reaches_done() {
        let feed = FakeFeed::new(vec![], vec![]);
        let log = feed.log();
        let mut s = session(feed);
        let mut out = Vec::new();

        let summary = done(s.run(&mut out));

        assert!(out.is_empty());
        assert_eq!(summary.tally.max_sequence, 0);
        assert_eq!(summary.tally.missing, 0);
        assert_eq!(log.borrow().connects, 1);
        assert_eq!(s.state(), SessionState::Done);
    }

    #[test]
    fn test_initial_connect_failure_aborts() {
        let feed = FakeFeed::new(records(&[1, 2]), vec![]).refusing(|_| true);
        let log = feed.log();
        let mut s = session(feed);
        let mut out = Vec::new();

        let outcome = s.run(&mut out);

        assert!(matches!(outcome, SessionOutcome::Aborted(ref e) if e.is_connection()));
        assert!(out.is_empty());
        assert_eq!(s.state(), SessionState::Aborted);
        assert_eq!(s.history(), &[SessionState::Connecting, SessionState::Aborted]);
        assert_eq!(log.borrow().connects, 1);
    }

    #[test]
    fn test_state_trail() {
        let mut s = session(FakeFeed::new(records(&[1]), vec![]));
        let mut out = Vec::new();
        assert!(s.run(&mut out).is_done());
        assert_eq!(
            s.history(),
            &[
                SessionState::Connecting,
                SessionState::Streaming,
                SessionState::GapScan,
                SessionState::Backfilling,
                SessionState::Sorting,
                SessionState::Exporting,
                SessionState::Done,
            ]
        );
        assert!(s.state().is_terminal());
    }

    #[test]
    fn test_run_starts_from_idle() {
        let mut s = session(FakeFeed::new(vec![], vec![]));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.state().is_terminal());
        assert!(s.history().is_empty());

        let mut out = Vec::new();
        assert!(s.run(&mut out).is_done());
        assert_eq!(s.history().first(), Some(&SessionState::Connecting));
        assert!(!s.history().contains(&SessionState::Idle));
    }

    #[test]
    fn test_receive_error_keeps_partial_stream() {
        let feed = FakeFeed::new(records(&[1, 2, 3]), vec![]).with_stream_error();
        let log = feed.log();
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), vec![1, 2, 3]);
        assert_eq!(summary.streamed, 3);
        assert!(log.borrow().all_closed());
    }

    #[test]
    fn test_stream_send_failure_still_reads() {
        let feed = FakeFeed::new(records(&[1, 2]), vec![]).with_send_error();
        let log = feed.log();
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), vec![1, 2]);
        assert_eq!(summary.streamed, 2);
        let log = log.borrow();
        // Two records plus the closing read
        assert_eq!(log.reads, 3);
        assert!(log.all_closed());
    }

    #[test]
    fn test_backfill_receive_error_does_not_stop_run() {
        let feed = FakeFeed::new(records(&[1, 3]), vec![]).with_resend_error();
        let log = feed.log();
        let mut s = session(feed);
        let mut out = Vec::new();

        let summary = done(s.run(&mut out));

        assert_eq!(seqs(&out), vec![1, 3]);
        assert_eq!(summary.tally.unrecovered, vec![2]);
        assert_eq!(s.state(), SessionState::Done);
        assert!(log.borrow().all_closed());
    }

    #[test]
    fn test_duplicate_policy_applies_to_stream() {
        let feed = FakeFeed::new(records(&[1, 2, 2]), vec![]);
        let mut out = Vec::new();

        let summary = done(
            session(feed)
                .with_duplicate_policy(DuplicatePolicy::Drop)
                .run(&mut out),
        );

        assert_eq!(seqs(&out), vec![1, 2]);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn test_duplicates_kept_by_default() {
        let feed = FakeFeed::new(records(&[2, 1, 2]), vec![]);
        let mut out = Vec::new();

        let summary = done(session(feed).run(&mut out));

        assert_eq!(seqs(&out), vec![1, 2, 2]);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.tally.missing, 0);
    }

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn export(&mut self, _records: &[MarketRecord]) -> Result<(), FeedError> {
            Err(FeedError::Export {
                path: "out.json".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    #[test]
    fn test_export_failure_is_reported_not_aborted() {
        let mut s = session(FakeFeed::new(records(&[1]), vec![]));

        let summary = done(s.run(&mut FailingSink));

        assert!(summary.export_error.is_some());
        assert_eq!(s.state(), SessionState::Done);
    }
}
