//! Xlatbench Engine - the concurrent sender/receiver pipeline
//!
//! Workers here run pinned to dedicated cores and never block: pacing is a
//! busy-wait against the cycle counter, TX back-pressure is a tight retry
//! loop, and the only shared mutable state is the seqlock-protected state
//! table. Everything a worker needs is built before its first frame goes
//! out; the hot loops neither allocate nor take locks.

pub mod affinity;
pub mod clock;
pub mod initiator;
pub mod latency;
pub mod permute;
pub mod receiver;
pub mod responder;
pub mod seq;
pub mod sender;
pub mod state;

pub use clock::Timebase;
pub use latency::{evaluate_latency, LatencySummary};
pub use sender::{FlowSpec, SenderCommon, SenderReport, SliceVariation, StatelessSender};
pub use state::StateTable;
