//! Xlatbench Orchestrator - phases, workers, reports
//!
//! The orchestrator computes the common start timestamp, launches up to four
//! pinned workers per phase (left/right sender and receiver), joins them,
//! and reduces their reports. In stateful mode it first runs the
//! preliminary phase that fills the Responder's state table, then the
//! measurement proper.

mod report;
mod run;
mod schedule;

pub use report::{DirectionReport, PreliminaryReport, RunReport};
pub use run::{run_test, TestBed};
pub use schedule::Schedule;
