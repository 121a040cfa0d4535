//! Responder side of a stateful test
//!
//! The learning receiver records the four-tuple of every foreground frame
//! it accepts into the state-table ring; during the preliminary phase this
//! populates the table, during the measurement it keeps tracking whatever
//! the DUT currently maps. The responder sender replays learned tuples as
//! the destinations of its foreground frames, selected by the configured
//! tuple mode; background frames keep the ordinary variation path.

use crate::clock::Timebase;
use crate::latency::LatencyOverlay;
use crate::receiver::{LatencyTap, ReceiverReport};
use crate::sender::{
    apply_tuple, close_run, DirectionEngine, FgTemplate, FlowSpec, SenderCommon, SenderReport,
};
use crate::state::StateTable;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;
use xlatbench_common::error::BenchResult;
use xlatbench_common::types::{Direction, FourTuple, TupleSelect, TEMPLATE_COPIES, TOLERANCE};
use xlatbench_net::frame::{classify, read_four_tuple, FrameKind};
use xlatbench_net::port::{RecvFrame, RxQueue, TxQueue};

/// How the sender walks the state table.
enum TupleCursor {
    /// The very first entry, over and over.
    Fixed(FourTuple),
    Walk { next: usize, reverse: bool },
    Random(SmallRng),
}

impl TupleCursor {
    fn new(select: TupleSelect, table: &StateTable) -> Self {
        match select {
            TupleSelect::First => TupleCursor::Fixed(table.load(0)),
            TupleSelect::Increase => TupleCursor::Walk {
                next: 0,
                reverse: false,
            },
            TupleSelect::Decrease => TupleCursor::Walk {
                next: table.len() - 1,
                reverse: true,
            },
            TupleSelect::Random => TupleCursor::Random(SmallRng::from_entropy()),
        }
    }

    #[inline]
    fn next(&mut self, table: &StateTable) -> FourTuple {
        match self {
            TupleCursor::Fixed(ft) => *ft,
            TupleCursor::Walk { next, reverse } => {
                let ft = table.load(*next);
                if *reverse {
                    *next = if *next == 0 { table.len() - 1 } else { *next - 1 };
                } else {
                    *next = (*next + 1) % table.len();
                }
                ft
            }
            TupleCursor::Random(rng) => table.load(rng.gen_range(0..table.len())),
        }
    }
}

/// Measurement-phase sender on the Responder side.
pub struct ResponderSender {
    pub common: SenderCommon,
    pub flow: FlowSpec,
    pub select: TupleSelect,
    pub table: Arc<StateTable>,
    pub latency: Option<LatencyOverlay>,
}

impl ResponderSender {
    pub fn run(mut self, tx: &mut dyn TxQueue) -> BenchResult<SenderReport> {
        let frames_to_send = self.common.duration as u64 * self.common.frame_rate as u64;
        // Foreground templates are rewritten per frame in every tuple mode,
        // so the copy rotation is always on.
        let mut engine =
            DirectionEngine::new(&self.common, &self.flow, TEMPLATE_COPIES, FgTemplate::ZeroTuple)?;
        let mut cursor = TupleCursor::new(self.select, &self.table);
        let mut overlay = self.latency.take();
        let tb = self.common.tb;
        let (n, m) = (self.common.n as u64, self.common.m as u64);
        let start = self.common.start;
        let rate = self.common.frame_rate;

        for k in 0..frames_to_send {
            let deadline = tb.due(start, k, rate);
            let is_fg = k % n < m;
            match overlay.as_mut().filter(|o| o.due(k)) {
                Some(ov) => {
                    let t = ov.next_template();
                    if t.is_v4() {
                        // Foreground probes carry a learned tuple too.
                        let ft = cursor.next(&self.table);
                        apply_tuple(t, &ft);
                    } else {
                        engine.mutate_external(t);
                    }
                    tb.wait_until(deadline);
                    while !tx.try_transmit(t.frame()) {}
                    ov.record_send(tb.now());
                }
                None => {
                    let f = if is_fg {
                        let ft = cursor.next(&self.table);
                        engine.prepare_tuple(&ft)
                    } else {
                        let subnet = engine.pick_subnet();
                        engine.prepare(false, subnet)
                    };
                    tb.wait_until(deadline);
                    while !tx.try_transmit(f) {}
                }
            }
            engine.advance();
        }

        let limit = self.common.duration as f64 * TOLERANCE;
        Ok(close_run(
            &tb,
            start,
            self.flow.direction,
            frames_to_send,
            limit,
            overlay.map(LatencyOverlay::into_send_ts),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct LearnReport {
    pub fg_received: u64,
    pub bg_received: u64,
    pub receive_ts: Option<Vec<u64>>,
}

impl LearnReport {
    #[inline]
    #[must_use]
    pub fn received(&self) -> u64 {
        self.fg_received + self.bg_received
    }
}

/// Receiver on the Responder side: counts like the plain receiver, but
/// additionally records each accepted IPv4 foreground frame's four-tuple at
/// the ring's write index.
pub struct LearningReceiver {
    pub tb: Timebase,
    pub finish_at: u64,
    pub direction: Direction,
    pub table: Arc<StateTable>,
    pub latency: Option<LatencyTap>,
}

impl LearningReceiver {
    pub fn run(mut self, rx: &mut dyn RxQueue) -> BenchResult<LearnReport> {
        let mut burst: Vec<RecvFrame> = RecvFrame::burst();
        let mut fg_received: u64 = 0;
        let mut bg_received: u64 = 0;
        let mut index = 0usize;
        let size = self.table.len();

        while self.tb.now() < self.finish_at {
            let frames = rx.recv_burst(&mut burst);
            for f in &burst[..frames] {
                match classify(f.bytes()) {
                    FrameKind::TestV4 => {
                        fg_received += 1;
                        self.table.store(index, read_four_tuple(f.bytes()));
                        index = (index + 1) % size;
                    }
                    FrameKind::TestV6 => bg_received += 1,
                    FrameKind::ProbeV4(id) => {
                        let now = self.tb.now();
                        match &mut self.latency {
                            Some(tap) => tap.record(id, now)?,
                            None => continue,
                        }
                        fg_received += 1;
                        self.table.store(index, read_four_tuple(f.bytes()));
                        index = (index + 1) % size;
                    }
                    FrameKind::ProbeV6(id) => {
                        let now = self.tb.now();
                        match &mut self.latency {
                            Some(tap) => tap.record(id, now)?,
                            None => continue,
                        }
                        bg_received += 1;
                    }
                    FrameKind::Other => {}
                }
            }
        }
        info!(
            "{} frames received: {}",
            self.direction.label(),
            fg_received + bg_received
        );
        Ok(LearnReport {
            fg_received,
            bg_received,
            receive_ts: self.latency.map(LatencyTap::into_receive_ts),
        })
    }
}

/// Convert a learning receiver's report into a plain one.
impl From<LearnReport> for ReceiverReport {
    fn from(r: LearnReport) -> Self {
        ReceiverReport {
            received: r.received(),
            receive_ts: r.receive_ts,
        }
    }
}
