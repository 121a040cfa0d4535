//! Error types for the xlatbench tester
//!
//! Everything the tester can report to the operator is covered by one enum.
//! Pacing overruns are deliberately not here: an overrun marks the run
//! invalid in the sender's report but does not abort it.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cycle counters of two cores disagree; no cross-core timestamp
    /// arithmetic is safe, so the test must not start.
    #[error("cycle counter of core {remote} is not synchronized with core {local}")]
    ClockDesync { local: usize, remote: usize },

    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("link on '{interface}' did not come up after {trials} trials")]
    LinkDown { interface: String, trials: u32 },

    /// The preliminary phase filled fewer state-table entries than the table
    /// holds. Reported as an error; the measurement may still proceed.
    #[error("state table underfilled after the preliminary phase: {valid} of {expected} entries")]
    PreliminaryUnderfill { valid: usize, expected: usize },

    /// A latency frame carried an id outside the timestamp vectors. Fatal:
    /// storing the timestamp would corrupt memory.
    #[error("latency frame with invalid id {id} received (only {limit} timestamps)")]
    MalformedProbe { id: u16, limit: u16 },

    #[error("worker '{0}' panicked")]
    WorkerPanic(String),
}

/// Result type alias for tester operations
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_line_oriented() {
        let e = BenchError::PreliminaryUnderfill {
            valid: 90,
            expected: 100,
        };
        assert!(e.to_string().contains("90 of 100"));
        let e = BenchError::MalformedProbe { id: 700, limit: 500 };
        assert!(e.to_string().contains("700"));
    }
}
