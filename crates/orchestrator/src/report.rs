//! Run reports
//!
//! Everything the tester tells the operator, in one serializable structure.
//! The text renderer in the CLI prints the traditional line-oriented form;
//! `serde_json` gives the machine-readable one.

use serde::Serialize;
use uuid::Uuid;
use xlatbench_engine::LatencySummary;

#[derive(Debug, Clone, Serialize)]
pub struct DirectionReport {
    pub direction: &'static str,
    /// Sender-side wall time of the transmission loop, seconds.
    pub elapsed_secs: f64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// The sender overran its pacing tolerance; results are unreliable.
    pub invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreliminaryReport {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub valid_entries: usize,
    pub state_table_size: usize,
    /// Fewer tuples learned than the table holds; reported as an error,
    /// the measurement still ran.
    pub underfilled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<DirectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<DirectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preliminary: Option<PreliminaryReport>,
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            forward: None,
            reverse: None,
            preliminary: None,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
