//! Session Report Generation
//!
//! Summarises a completed run for the operator.

use serde::Serialize;

use crate::feed::{RecoveryTally, SessionSummary};

/// Full session report
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub timestamp: i64,
    pub total_records: usize,
    pub streamed_records: usize,
    pub duplicate_arrivals: u64,
    pub duration_secs: f64,
    /// Records per second, duration floored at one second
    pub records_per_sec: f64,
    pub recovery: RecoveryTally,
    pub recovery_success_pct: f64,
    pub output_path: Option<String>,
    pub export_error: Option<String>,
}

impl SessionReport {
    pub fn from_summary(summary: &SessionSummary, output_path: Option<String>) -> Self {
        let whole_secs = summary.elapsed.as_secs().max(1);
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            total_records: summary.total_records,
            streamed_records: summary.streamed,
            duplicate_arrivals: summary.duplicates,
            duration_secs: summary.elapsed.as_secs_f64(),
            records_per_sec: summary.total_records as f64 / whole_secs as f64,
            recovery: summary.tally.clone(),
            recovery_success_pct: summary.tally.success_rate_pct(),
            output_path,
            export_error: summary.export_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Generate executive summary (text)
    pub fn executive_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!(
            "=== Feed Session Report ===\n\
             Timestamp: {}\n\n",
            chrono::DateTime::from_timestamp(self.timestamp, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
        ));

        summary.push_str(&format!(
            "RECORDS:\n\
             - Total: {}\n\
             - From initial stream: {}\n\
             - Duplicate arrivals: {}\n\
             - Session duration: {:.1}s\n\
             - Processing rate: {:.0} records/s\n",
            self.total_records,
            self.streamed_records,
            self.duplicate_arrivals,
            self.duration_secs,
            self.records_per_sec,
        ));

        let r = &self.recovery;
        summary.push_str(&format!(
            "\nRECOVERY:\n\
             - Expected sequences: {}\n\
             - Missing: {}\n\
             - Recovered: {}\n\
             - Connect failures: {}\n\
             - Success rate: {:.1}%\n",
            r.max_sequence, r.missing, r.recovered, r.connect_failures, self.recovery_success_pct,
        ));
        if !r.unrecovered.is_empty() {
            summary.push_str(&format!("- Still missing: {:?}\n", r.unrecovered));
        }

        match (&self.output_path, &self.export_error) {
            (_, Some(err)) => summary.push_str(&format!("\nEXPORT FAILED: {}\n", err)),
            (Some(path), None) => summary.push_str(&format!("\nData saved to {}\n", path)),
            (None, None) => {}
        }

        summary
    }
}
