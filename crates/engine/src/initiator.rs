//! Initiator sender: the stateful preliminary phase
//!
//! Drives the DUT with frames whose four-tuples are to become state-table
//! entries on the Responder side. The cadence is the ordinary paced loop at
//! the preliminary rate; what differs is where the foreground four-tuple
//! components come from: counters enumerating all combinations, or a
//! pre-generated unique random permutation that guarantees one distinct
//! combination per foreground frame. Background frames keep the ordinary
//! port-variation path.

use crate::permute::{PairCombo, QuadCombo};
use crate::sender::{
    close_run, DirectionEngine, FgTemplate, FlowSpec, SenderCommon, SenderReport,
};
use xlatbench_common::error::BenchResult;
use xlatbench_common::types::{PortRange, TEMPLATE_COPIES, TOLERANCE};
use xlatbench_net::port::TxQueue;

/// Nested counters over ports and (optionally) IP slices. The source port
/// is the fastest-running coordinate; each counter advances its neighbour
/// when it wraps.
struct NestedCounters {
    sport: u16,
    dport: u16,
    sip: u16,
    dip: u16,
    sport_r: PortRange,
    dport_r: PortRange,
    sip_r: PortRange,
    dip_r: PortRange,
    increasing: bool,
    with_ports: bool,
    with_ips: bool,
}

impl NestedCounters {
    fn new(
        increasing: bool,
        with_ports: bool,
        with_ips: bool,
        sport_r: PortRange,
        dport_r: PortRange,
        sip_r: PortRange,
        dip_r: PortRange,
    ) -> Self {
        let pick = |r: PortRange| if increasing { r.min } else { r.max };
        Self {
            sport: pick(sport_r),
            dport: pick(dport_r),
            sip: pick(sip_r),
            dip: pick(dip_r),
            sport_r,
            dport_r,
            sip_r,
            dip_r,
            increasing,
            with_ports,
            with_ips,
        }
    }

    fn next(&mut self) -> (Option<(u16, u16)>, Option<(u16, u16)>) {
        let out = (
            self.with_ports.then_some((self.sport, self.dport)),
            self.with_ips.then_some((self.sip, self.dip)),
        );
        let step = |v: &mut u16, r: PortRange, increasing: bool| -> bool {
            if increasing {
                if *v == r.max {
                    *v = r.min;
                    true
                } else {
                    *v += 1;
                    false
                }
            } else if *v == r.min {
                *v = r.max;
                true
            } else {
                *v -= 1;
                false
            }
        };
        if self.with_ports {
            if step(&mut self.sport, self.sport_r, self.increasing)
                && step(&mut self.dport, self.dport_r, self.increasing)
                && self.with_ips
                && step(&mut self.sip, self.sip_r, self.increasing)
            {
                step(&mut self.dip, self.dip_r, self.increasing);
            }
        } else if step(&mut self.sip, self.sip_r, self.increasing) {
            step(&mut self.dip, self.dip_r, self.increasing);
        }
        out
    }
}

/// Where the foreground four-tuple components of the preliminary frames
/// come from.
pub enum Enumeration {
    /// Plain port/IP variation, like the stateless sender.
    None,
    /// Counters over the combination space: the (sport, dport) pairs when
    /// `with_ports`, extended by (or reduced to) the IP slice pairs when
    /// `with_ips`. `increasing` selects the direction.
    Counters {
        increasing: bool,
        with_ports: bool,
        with_ips: bool,
    },
    /// Pre-generated unique (sport, dport) pairs.
    PortPairs(Vec<PairCombo>),
    /// Pre-generated unique (source, destination) IP slice pairs; ports
    /// still follow their variation modes.
    IpPairs(Vec<PairCombo>),
    /// Pre-generated unique (sip, dip, sport, dport) combinations.
    Quads(Vec<QuadCombo>),
}

pub struct InitiatorSender {
    /// Common block with the preliminary rate and start timestamp.
    pub common: SenderCommon,
    pub flow: FlowSpec,
    /// "N": how many preliminary frames to send.
    pub pre_frames: u32,
    pub enumeration: Enumeration,
}

impl InitiatorSender {
    pub fn run(self, tx: &mut dyn TxQueue) -> BenchResult<SenderReport> {
        let frames_to_send = self.pre_frames as u64;
        let enumerating = !matches!(self.enumeration, Enumeration::None);
        let copies = if self.flow.varies() || enumerating {
            TEMPLATE_COPIES
        } else {
            1
        };
        // Enumerated ports overwrite the port fields of every foreground
        // frame, so those fields must start at zero in the templates.
        let enumerates_ports = matches!(
            self.enumeration,
            Enumeration::Counters {
                with_ports: true,
                ..
            } | Enumeration::PortPairs(_)
                | Enumeration::Quads(_)
        );
        let fg_mode = if enumerates_ports {
            FgTemplate::ZeroPorts
        } else {
            FgTemplate::AsConfigured
        };
        let mut engine = DirectionEngine::new(&self.common, &self.flow, copies, fg_mode)?;
        // Counter state; only consulted in the `Counters` enumeration mode.
        let (increasing, with_ports, with_ips) = match &self.enumeration {
            Enumeration::Counters {
                increasing,
                with_ports,
                with_ips,
            } => (*increasing, *with_ports, *with_ips),
            _ => (true, true, false),
        };
        let slices = self.flow.slices;
        let mut counters = NestedCounters::new(
            increasing,
            with_ports,
            with_ips,
            self.flow.sport_range,
            self.flow.dport_range,
            slices.map(|s| s.src_range).unwrap_or(PortRange::new(0, 0)),
            slices.map(|s| s.dst_range).unwrap_or(PortRange::new(0, 0)),
        );
        let mut cursor = 0usize;

        let tb = self.common.tb;
        let (n, m) = (self.common.n as u64, self.common.m as u64);
        let start = self.common.start;
        let rate = self.common.frame_rate;

        for k in 0..frames_to_send {
            let deadline = tb.due(start, k, rate);
            let is_fg = k % n < m;
            let subnet = engine.pick_subnet();
            let f = if is_fg {
                // The combination consumed by this foreground frame.
                let (ports, slices) = match &self.enumeration {
                    Enumeration::None => (None, None),
                    Enumeration::Counters { .. } => counters.next(),
                    Enumeration::PortPairs(pairs) => {
                        let p = pairs[cursor];
                        cursor += 1;
                        (Some((p.src, p.dst)), None)
                    }
                    Enumeration::IpPairs(pairs) => {
                        let p = pairs[cursor];
                        cursor += 1;
                        (None, Some((p.src, p.dst)))
                    }
                    Enumeration::Quads(quads) => {
                        let q = quads[cursor];
                        cursor += 1;
                        (Some((q.sport, q.dport)), Some((q.sip, q.dip)))
                    }
                };
                engine.prepare_with(true, subnet, ports, slices)
            } else {
                engine.prepare(false, subnet)
            };
            tb.wait_until(deadline);
            while !tx.try_transmit(f) {}
            engine.advance();
        }

        // No 'duration' here; the limit follows from the frame count.
        let limit = frames_to_send as f64 / rate as f64 * TOLERANCE;
        Ok(close_run(
            &tb,
            start,
            self.flow.direction,
            frames_to_send,
            limit,
            None,
        ))
        // The unique-combination arrays die with `self` here, right after
        // their single pass.
    }
}
