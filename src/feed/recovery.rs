//! Gap Recovery Engine
//!
//! Walks `[1, max_sequence]` once, in ascending order, and re-requests every
//! sequence the store has not seen. One fresh session per missing sequence,
//! one attempt each, fixed pacing between attempts.

use std::{thread, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::RecordStore;
use super::transport::{Connector, Transport};
use super::wire::{encode_request, MarketRecord, Opcode, MAX_RESEND_SEQUENCE, REQUEST_SIZE};

/// Default pause between backfill attempts
pub const DEFAULT_BACKFILL_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct GapRecoveryConfig {
    /// Fixed pause after each attempt that reached the server. Does not grow.
    pub backfill_delay: Duration,
}

impl Default for GapRecoveryConfig {
    fn default() -> Self {
        Self {
            backfill_delay: DEFAULT_BACKFILL_DELAY,
        }
    }
}

/// Outcome of a single backfill attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Recovered(MarketRecord),
    ConnectFailed,
    /// Server closed without a record, or the read failed
    NotRecovered,
}

/// Recovery counts for the session report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryTally {
    pub max_sequence: i32,
    pub missing: u64,
    pub recovered: u64,
    pub connect_failures: u64,
    /// Missing sequences that stayed missing, ascending
    pub unrecovered: Vec<i32>,
}

impl RecoveryTally {
    pub fn is_complete(&self) -> bool {
        self.recovered == self.missing
    }

    /// Percentage of missing sequences recovered (100 when none were missing)
    pub fn success_rate_pct(&self) -> f64 {
        if self.missing == 0 {
            100.0
        } else {
            self.recovered as f64 * 100.0 / self.missing as f64
        }
    }
}

pub struct GapRecovery {
    config: GapRecoveryConfig,
}

impl GapRecovery {
    pub fn new(config: GapRecoveryConfig) -> Self {
        Self { config }
    }

    /// Backfill every gap in `[1, max_sequence]`, adding recovered records to `store`.
    pub fn run<C: Connector>(
        &self,
        connector: &C,
        store: &mut RecordStore,
        max_sequence: i32,
    ) -> RecoveryTally {
        let mut tally = RecoveryTally {
            max_sequence,
            ..RecoveryTally::default()
        };

        if max_sequence <= 0 {
            return tally;
        }

        info!("Validating data integrity over [1, {}]", max_sequence);
        if max_sequence > MAX_RESEND_SEQUENCE {
            warn!(
                "Max sequence {} exceeds {}: re-send requests above it are truncated to 8 bits and will ask for the wrong record",
                max_sequence, MAX_RESEND_SEQUENCE
            );
        }

        // Membership is checked as the walk advances: a record recovered
        // earlier in the loop fills a later gap.
        for seq in 1..=max_sequence {
            if store.contains(seq) {
                continue;
            }
            tally.missing += 1;
            info!(seq, "Requesting sequence");

            match self.backfill_one(connector, seq) {
                BackfillOutcome::Recovered(record) => {
                    if record.sequence != seq {
                        warn!(
                            requested = seq,
                            received = record.sequence,
                            "Re-send returned a different sequence"
                        );
                    }
                    info!(seq = record.sequence, symbol = %record.symbol_str(), "Data recovered");
                    store.add(record);
                    tally.recovered += 1;
                }
                BackfillOutcome::ConnectFailed => {
                    tally.connect_failures += 1;
                    tally.unrecovered.push(seq);
                    // No session was opened, so no pacing
                    continue;
                }
                BackfillOutcome::NotRecovered => {
                    tally.unrecovered.push(seq);
                }
            }

            debug!("Backfill progress: {}/{}", seq, max_sequence);
            if !self.config.backfill_delay.is_zero() {
                thread::sleep(self.config.backfill_delay);
            }
        }

        if tally.missing == 0 {
            info!("No gaps in [1, {}]", max_sequence);
        } else if tally.is_complete() {
            info!("Recovered all {} missing records", tally.missing);
        } else {
            warn!(
                "Recovered {} of {} missing records (unrecovered: {:?})",
                tally.recovered, tally.missing, tally.unrecovered
            );
        }
        tally
    }

    /// One attempt: connect, request, read one record, close.
    pub fn backfill_one<C: Connector>(&self, connector: &C, seq: i32) -> BackfillOutcome {
        let mut session = match connector.connect() {
            Ok(session) => session,
            Err(e) => {
                warn!(seq, "Connection attempt failed: {}", e);
                return BackfillOutcome::ConnectFailed;
            }
        };

        let request: [u8; REQUEST_SIZE] = encode_request(Opcode::Resend, seq);
        if let Err(e) = session.send(&request) {
            // Non-fatal: the read below will report what happened
            warn!(seq, "Re-send request failed: {}", e);
        }

        let outcome = match session.receive_record() {
            Ok(Some(record)) => BackfillOutcome::Recovered(record),
            Ok(None) => {
                warn!(seq, "Server closed without a record");
                BackfillOutcome::NotRecovered
            }
            Err(e) => {
                warn!(seq, "Re-send read failed: {}", e);
                BackfillOutcome::NotRecovered
            }
        };

        session.close();
        outcome
    }
}

impl Default for GapRecovery {
    fn default() -> Self {
        Self::new(GapRecoveryConfig::default())
    }
}
