//! Paced frame transmission
//!
//! One sender owns one direction: it pre-builds its foreground and
//! background template banks, then runs the naive paced loop — busy-wait
//! until frame k's deadline, rewrite the varying fields of the next template
//! copy, push to the NIC until accepted. Simple and fast; everything
//! expensive happened before the start timestamp.

use crate::clock::Timebase;
use crate::latency::LatencyOverlay;
use crate::seq::FieldSequence;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{info, warn};
use xlatbench_common::error::BenchResult;
use xlatbench_common::types::{
    Direction, IpVersion, MacAddr, PortRange, VarMode, TEMPLATE_COPIES, TOLERANCE,
};
use xlatbench_net::checksum;
use xlatbench_net::frame;
use xlatbench_net::port::TxQueue;
use xlatbench_net::template::{FrameTemplate, SliceOffsets, TemplateBank};

/// Parameters shared by both directions' senders.
#[derive(Debug, Clone, Copy)]
pub struct SenderCommon {
    /// Frame size carrying IPv6, FCS included.
    pub ipv6_frame_size: u16,
    /// Frame size carrying IPv4, always 20 bytes less.
    pub ipv4_frame_size: u16,
    pub frame_rate: u32,
    pub duration: u16,
    /// Foreground modulus: frame k is foreground iff `k % n < m`.
    pub n: u32,
    pub m: u32,
    pub tb: Timebase,
    /// Counter value of the first frame's deadline.
    pub start: u64,
}

/// 16-bit IP-slice variation of one direction.
#[derive(Debug, Clone, Copy)]
pub struct SliceVariation {
    pub var_src: VarMode,
    pub var_dst: VarMode,
    pub src_range: PortRange,
    pub dst_range: PortRange,
    /// Byte offset of the varied slice inside the IPv4 address (1-2).
    pub v4_src_offset: usize,
    pub v4_dst_offset: usize,
    /// Byte offset of the varied slice inside the IPv6 address (6-14).
    pub v6_src_offset: usize,
    pub v6_dst_offset: usize,
}

/// Everything one direction's sender needs to know about its traffic.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub direction: Direction,
    /// Foreground IP version; background frames are always IPv6.
    pub ip_version: IpVersion,
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub src_ipv4: Ipv4Addr,
    pub dst_ipv4: Ipv4Addr,
    pub src_ipv6: Ipv6Addr,
    pub dst_ipv6: Ipv6Addr,
    pub src_bg: Ipv6Addr,
    pub dst_bg: Ipv6Addr,
    pub num_dest_nets: u16,
    pub var_sport: VarMode,
    pub var_dport: VarMode,
    pub sport_range: PortRange,
    pub dport_range: PortRange,
    pub slices: Option<SliceVariation>,
}

impl FlowSpec {
    /// Anything at all rewritten per frame?
    #[inline]
    #[must_use]
    pub fn varies(&self) -> bool {
        self.var_sport.varies() || self.var_dport.varies() || self.slices.is_some()
    }

    pub(crate) fn fg_slice_offsets(&self) -> SliceOffsets {
        match self.slices {
            Some(s) if self.ip_version.is_v4() => SliceOffsets {
                src: s.v4_src_offset,
                dst: s.v4_dst_offset,
            },
            Some(s) => SliceOffsets {
                src: s.v6_src_offset,
                dst: s.v6_dst_offset,
            },
            None => SliceOffsets::default(),
        }
    }

    pub(crate) fn bg_slice_offsets(&self) -> SliceOffsets {
        match self.slices {
            Some(s) => SliceOffsets {
                src: s.v6_src_offset,
                dst: s.v6_dst_offset,
            },
            None => SliceOffsets::default(),
        }
    }

    /// Foreground frame for one destination network. `zero_ports` builds
    /// the port fields as zero even when they are configured fixed, for
    /// senders that overwrite them on every frame.
    pub(crate) fn build_fg_frame(
        &self,
        common: &SenderCommon,
        subnet: usize,
        zero_ports: bool,
    ) -> Vec<u8> {
        let var_sport = zero_ports || self.var_sport.varies();
        let var_dport = zero_ports || self.var_dport.varies();
        match self.ip_version {
            IpVersion::V4 => {
                let mut dst = self.dst_ipv4.octets();
                if self.num_dest_nets > 1 {
                    dst[2] = subnet as u8; // 198.18.x.2 style network index
                }
                frame::build_test_frame_v4(
                    common.ipv4_frame_size,
                    self.dst_mac,
                    self.src_mac,
                    self.src_ipv4,
                    Ipv4Addr::from(dst),
                    var_sport,
                    var_dport,
                )
            }
            IpVersion::V6 => {
                let mut dst = self.dst_ipv6.octets();
                if self.num_dest_nets > 1 {
                    dst[7] = subnet as u8; // 2001:2:0:00xx::1 style network index
                }
                frame::build_test_frame_v6(
                    common.ipv6_frame_size,
                    self.dst_mac,
                    self.src_mac,
                    self.src_ipv6,
                    Ipv6Addr::from(dst),
                    var_sport,
                    var_dport,
                )
            }
        }
    }

    /// Background frame (always IPv6) for one destination network.
    pub(crate) fn build_bg_frame(&self, common: &SenderCommon, subnet: usize) -> Vec<u8> {
        let mut dst = self.dst_bg.octets();
        if self.num_dest_nets > 1 {
            dst[7] = subnet as u8;
        }
        frame::build_test_frame_v6(
            common.ipv6_frame_size,
            self.dst_mac,
            self.src_mac,
            self.src_bg,
            Ipv6Addr::from(dst),
            self.var_sport.varies(),
            self.var_dport.varies(),
        )
    }
}

/// How a sender's foreground templates are pre-built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FgTemplate {
    /// Fields follow the configured variation modes.
    AsConfigured,
    /// Ports start at zero regardless of the modes; the sender forces a
    /// value into them on every foreground frame (port enumeration).
    ZeroPorts,
    /// Addresses and ports all start at zero; a learned tuple is spliced
    /// in per frame (the Responder).
    ZeroTuple,
}

/// Template banks plus field sequences of one direction; the part of a
/// sender that rewrites frames.
pub(crate) struct DirectionEngine {
    fg: TemplateBank,
    bg: TemplateBank,
    sport_seq: Option<FieldSequence>,
    dport_seq: Option<FieldSequence>,
    src_slice_seq: Option<FieldSequence>,
    dst_slice_seq: Option<FieldSequence>,
    net_rng: Option<SmallRng>,
    nets: usize,
    rot: usize,
    copies: usize,
    fg_is_v4: bool,
}

impl DirectionEngine {
    pub(crate) fn new(
        common: &SenderCommon,
        flow: &FlowSpec,
        copies: usize,
        fg_mode: FgTemplate,
    ) -> BenchResult<Self> {
        let nets = flow.num_dest_nets as usize;
        let fg = match fg_mode {
            // The Responder's foreground template carries a learned tuple,
            // so it starts all-zero and uses a single network.
            FgTemplate::ZeroTuple => {
                TemplateBank::build(1, copies, SliceOffsets::default(), |_| {
                    frame::build_test_frame_v4(
                        common.ipv4_frame_size,
                        flow.dst_mac,
                        flow.src_mac,
                        Ipv4Addr::UNSPECIFIED,
                        Ipv4Addr::UNSPECIFIED,
                        true,
                        true,
                    )
                })?
            }
            mode => TemplateBank::build(nets, copies, flow.fg_slice_offsets(), |subnet| {
                flow.build_fg_frame(common, subnet, mode == FgTemplate::ZeroPorts)
            })?,
        };
        let bg = TemplateBank::build(nets, copies, flow.bg_slice_offsets(), |subnet| {
            flow.build_bg_frame(common, subnet)
        })?;
        let (src_slice_seq, dst_slice_seq) = match flow.slices {
            Some(s) => (
                FieldSequence::from_mode(s.var_src, s.src_range),
                FieldSequence::from_mode(s.var_dst, s.dst_range),
            ),
            None => (None, None),
        };
        Ok(Self {
            fg,
            bg,
            sport_seq: FieldSequence::from_mode(flow.var_sport, flow.sport_range),
            dport_seq: FieldSequence::from_mode(flow.var_dport, flow.dport_range),
            src_slice_seq,
            dst_slice_seq,
            net_rng: (nets > 1).then(SmallRng::from_entropy),
            nets,
            rot: 0,
            copies,
            fg_is_v4: flow.ip_version.is_v4(),
        })
    }

    /// Uniform random destination network, 0 with a single one.
    #[inline]
    pub(crate) fn pick_subnet(&mut self) -> usize {
        match &mut self.net_rng {
            Some(rng) => rng.gen_range(0..self.nets),
            None => 0,
        }
    }

    /// Move to the next template copy. Called once per sent frame.
    #[inline]
    pub(crate) fn advance(&mut self) {
        self.rot = (self.rot + 1) % self.copies;
    }

    /// Prepare the next copy of the foreground or background template with
    /// the standard field variations applied.
    #[inline]
    pub(crate) fn prepare(&mut self, is_fg: bool, subnet: usize) -> &[u8] {
        self.prepare_with(is_fg, subnet, None, None)
    }

    /// Like [`Self::prepare`], but the preliminary phase can force the
    /// foreground ports and/or IP slices instead of the per-field sequences.
    #[inline]
    pub(crate) fn prepare_with(
        &mut self,
        is_fg: bool,
        subnet: usize,
        ports: Option<(u16, u16)>,
        slices: Option<(u16, u16)>,
    ) -> &[u8] {
        let fg_v4 = self.fg_is_v4 && is_fg;
        let t = if is_fg {
            self.fg.get_mut(subnet, self.rot)
        } else {
            self.bg.get_mut(subnet, self.rot)
        };
        mutate_template(
            t,
            fg_v4,
            ports,
            slices,
            &mut self.sport_seq,
            &mut self.dport_seq,
            &mut self.src_slice_seq,
            &mut self.dst_slice_seq,
        );
        t.frame()
    }

    /// Apply the standard variations to a template owned elsewhere (a
    /// latency probe). The field sequences keep running across probe and
    /// ordinary frames.
    #[inline]
    pub(crate) fn mutate_external(&mut self, t: &mut FrameTemplate) {
        mutate_template(
            t,
            t.is_v4(),
            None,
            None,
            &mut self.sport_seq,
            &mut self.dport_seq,
            &mut self.src_slice_seq,
            &mut self.dst_slice_seq,
        );
    }

    /// The Responder's foreground rewrite: splice a learned tuple into the
    /// next foreground copy.
    #[inline]
    pub(crate) fn prepare_tuple(&mut self, ft: &xlatbench_common::FourTuple) -> &[u8] {
        let t = self.fg.get_mut(0, self.rot);
        apply_tuple(t, ft);
        t.frame()
    }
}

/// Splice a four-tuple into an IPv4 template: incremental UDP checksum over
/// the twelve tuple bytes, IPv4 header checksum from scratch (the address
/// fields changed in bulk).
#[inline]
pub(crate) fn apply_tuple(t: &mut FrameTemplate, ft: &xlatbench_common::FourTuple) {
    t.write_tuple(ft);
    t.set_udp_checksum(checksum::finish_udp(t.udp_sum_start() + ft.ones_sum(), true));
    t.set_ipv4_checksum(checksum::ipv4_header_checksum(t.ipv4_header()));
}

/// The per-frame field rewrite. Fields start at zero in every template copy
/// generation, so each write adds its value to the cached checksum sums.
#[allow(clippy::too_many_arguments)]
#[inline]
fn mutate_template(
    t: &mut FrameTemplate,
    fg_v4: bool,
    forced_ports: Option<(u16, u16)>,
    forced_slices: Option<(u16, u16)>,
    sport_seq: &mut Option<FieldSequence>,
    dport_seq: &mut Option<FieldSequence>,
    src_slice_seq: &mut Option<FieldSequence>,
    dst_slice_seq: &mut Option<FieldSequence>,
) {
    let mut ip_acc = 0u32;
    let mut slices_written = false;
    if let Some((s, d)) = forced_slices {
        let (fs, fd) = (t.src_slice, t.dst_slice);
        t.set_u16(fs, s);
        t.set_u16(fd, d);
        ip_acc += s as u32 + d as u32;
        slices_written = true;
    } else {
        if let Some(seq) = src_slice_seq {
            let v = seq.next();
            let f = t.src_slice;
            t.set_u16(f, v);
            ip_acc += v as u32;
            slices_written = true;
        }
        if let Some(seq) = dst_slice_seq {
            let v = seq.next();
            let f = t.dst_slice;
            t.set_u16(f, v);
            ip_acc += v as u32;
            slices_written = true;
        }
    }
    if slices_written && fg_v4 {
        // Only the IPv4 header carries an IP checksum.
        t.set_ipv4_checksum(checksum::finish(t.ipv4_sum_start() + ip_acc));
    }

    let mut udp_acc = t.udp_sum_start() + ip_acc;
    let mut ports_written = false;
    if let Some((sp, dp)) = forced_ports {
        let (fs, fd) = (t.sport, t.dport);
        t.set_u16(fs, sp);
        t.set_u16(fd, dp);
        udp_acc += sp as u32 + dp as u32;
        ports_written = true;
    } else {
        if let Some(seq) = sport_seq {
            let v = seq.next();
            let f = t.sport;
            t.set_u16(f, v);
            udp_acc += v as u32;
            ports_written = true;
        }
        if let Some(seq) = dport_seq {
            let v = seq.next();
            let f = t.dport;
            t.set_u16(f, v);
            udp_acc += v as u32;
            ports_written = true;
        }
    }
    if ports_written || slices_written {
        t.set_udp_checksum(checksum::finish_udp(udp_acc, fg_v4));
    }
}

/// Outcome of one sender's run.
#[derive(Debug, Clone)]
pub struct SenderReport {
    pub sent: u64,
    pub elapsed_secs: f64,
    /// The sender overran its tolerated window; results are not trustworthy.
    pub invalid: bool,
    /// Probe send timestamps, present on latency runs.
    pub send_ts: Option<Vec<u64>>,
}

/// Elapsed-time bookkeeping shared by all sender kinds.
pub(crate) fn close_run(
    tb: &Timebase,
    start: u64,
    direction: Direction,
    sent: u64,
    limit_secs: f64,
    send_ts: Option<Vec<u64>>,
) -> SenderReport {
    let elapsed_secs = tb.ticks_to_secs(tb.now().saturating_sub(start));
    info!(
        "{} sender's sending took {:.10} seconds",
        direction.label(),
        elapsed_secs
    );
    let invalid = elapsed_secs > limit_secs;
    if invalid {
        warn!(
            "{} sending exceeded the {:.10} seconds limit, the test is invalid",
            direction.label(),
            limit_secs
        );
    } else {
        info!("{} frames sent: {}", direction.label(), sent);
    }
    SenderReport {
        sent,
        elapsed_secs,
        invalid,
        send_ts,
    }
}

/// The stateless sender: paced foreground/background traffic with optional
/// port and IP-slice variation, optionally tagged with latency probes.
pub struct StatelessSender {
    pub common: SenderCommon,
    pub flow: FlowSpec,
    pub latency: Option<LatencyOverlay>,
}

impl StatelessSender {
    pub fn run(mut self, tx: &mut dyn TxQueue) -> BenchResult<SenderReport> {
        let frames_to_send = self.common.duration as u64 * self.common.frame_rate as u64;
        let copies = if self.flow.varies() { TEMPLATE_COPIES } else { 1 };
        let mut engine =
            DirectionEngine::new(&self.common, &self.flow, copies, FgTemplate::AsConfigured)?;
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
                    engine.mutate_external(t);
                    tb.wait_until(deadline);
                    while !tx.try_transmit(t.frame()) {}
                    ov.record_send(tb.now());
                }
                None => {
                    let subnet = engine.pick_subnet();
                    let f = engine.prepare(is_fg, subnet);
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use xlatbench_net::frame::{checksums_valid, classify, FrameKind};
    use xlatbench_net::port::{mem, RecvFrame, RxQueue};

    pub(crate) fn test_flow(direction: Direction, ip_version: IpVersion) -> FlowSpec {
        FlowSpec {
            direction,
            ip_version,
            dst_mac: MacAddr([2, 0, 0, 0, 0, 0x11]),
            src_mac: MacAddr([2, 0, 0, 0, 0, 0x01]),
            src_ipv4: Ipv4Addr::new(198, 18, 0, 1),
            dst_ipv4: Ipv4Addr::new(198, 19, 0, 1),
            src_ipv6: "2001:2::1".parse().unwrap(),
            dst_ipv6: "2001:2:0:8000::1".parse().unwrap(),
            src_bg: "2001:2::1".parse().unwrap(),
            dst_bg: "2001:2:0:8000::1".parse().unwrap(),
            num_dest_nets: 1,
            var_sport: VarMode::Fixed,
            var_dport: VarMode::Fixed,
            sport_range: PortRange::new(1024, 65535),
            dport_range: PortRange::new(1, 49151),
            slices: None,
        }
    }

    pub(crate) fn test_common(tb: Timebase, rate: u32, duration: u16, n: u32, m: u32) -> SenderCommon {
        SenderCommon {
            ipv6_frame_size: 84,
            ipv4_frame_size: 64,
            frame_rate: rate,
            duration,
            n,
            m,
            tb,
            start: tb.now() + tb.ms_to_ticks(10),
        }
    }

    fn drain(rx: &mut dyn RxQueue) -> Vec<Vec<u8>> {
        let mut burst: Vec<RecvFrame> = RecvFrame::burst();
        let mut out = Vec::new();
        loop {
            let got = rx.recv_burst(&mut burst);
            if got == 0 {
                break;
            }
            for f in &burst[..got] {
                out.push(f.bytes().to_vec());
            }
        }
        out
    }

    #[test]
    fn fixed_port_run_sends_expected_mix() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(8192);
        let sender = StatelessSender {
            common: test_common(tb, 2000, 1, 2, 1),
            flow: test_flow(Direction::Forward, IpVersion::V6),
            latency: None,
        };
        let report = sender.run(&mut tx).unwrap();
        assert_eq!(report.sent, 2000);
        assert!(!report.invalid);
        assert!(report.send_ts.is_none());

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2000);
        let fg = frames
            .iter()
            .filter(|f| classify(f) == FrameKind::TestV6)
            .count();
        assert_eq!(fg, 2000); // fg and bg are both v6 here
        for f in frames.iter().take(64) {
            assert!(checksums_valid(f));
            let sp = u16::from_be_bytes([f[54], f[55]]);
            let dp = u16::from_be_bytes([f[56], f[57]]);
            assert_eq!(sp, frame::RFC2544_SPORT);
            assert_eq!(dp, frame::RFC2544_DPORT);
        }
    }

    #[test]
    fn v4_foreground_v6_background_split() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(8192);
        let sender = StatelessSender {
            common: test_common(tb, 1000, 1, 4, 3),
            flow: test_flow(Direction::Forward, IpVersion::V4),
            latency: None,
        };
        sender.run(&mut tx).unwrap();
        let frames = drain(&mut rx);
        let v4 = frames
            .iter()
            .filter(|f| classify(f) == FrameKind::TestV4)
            .count();
        let v6 = frames
            .iter()
            .filter(|f| classify(f) == FrameKind::TestV6)
            .count();
        // k % 4 < 3: exactly 750 foreground frames.
        assert_eq!(v4, 750);
        assert_eq!(v6, 250);
    }

    #[test]
    fn increasing_sport_sequence_on_wire() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(8192);
        let mut flow = test_flow(Direction::Forward, IpVersion::V6);
        flow.var_sport = VarMode::Increase;
        flow.sport_range = PortRange::new(1024, 1026);
        let sender = StatelessSender {
            common: test_common(tb, 1000, 1, 2, 2), // all foreground
            flow,
            latency: None,
        };
        sender.run(&mut tx).unwrap();
        let frames = drain(&mut rx);
        let sports: Vec<u16> = frames
            .iter()
            .take(6)
            .map(|f| u16::from_be_bytes([f[54], f[55]]))
            .collect();
        assert_eq!(sports, vec![1024, 1025, 1026, 1024, 1025, 1026]);
        for f in &frames {
            assert!(checksums_valid(f));
        }
    }

    #[test]
    fn random_ports_roughly_uniform() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(70000);
        let mut flow = test_flow(Direction::Forward, IpVersion::V6);
        flow.var_dport = VarMode::Random;
        flow.dport_range = PortRange::new(1, 8);
        let sender = StatelessSender {
            common: test_common(tb, 32000, 2, 2, 2),
            flow,
            latency: None,
        };
        sender.run(&mut tx).unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 64000);
        let mut histogram = [0u32; 9];
        for f in &frames {
            let dp = u16::from_be_bytes([f[56], f[57]]);
            histogram[dp as usize] += 1;
        }
        // 8000 expected per bucket; allow a generous band.
        for count in &histogram[1..=8] {
            assert!((6500..=9500).contains(count), "skewed bucket: {count}");
        }
    }

    #[test]
    fn ip_slice_variation_updates_both_checksums() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(8192);
        let mut flow = test_flow(Direction::Forward, IpVersion::V4);
        // Slices start out masked to zero.
        flow.src_ipv4 = Ipv4Addr::new(198, 18, 0, 0);
        flow.dst_ipv4 = Ipv4Addr::new(198, 19, 0, 0);
        flow.src_bg = "2001:2::".parse().unwrap();
        flow.dst_bg = "2001:2:0:8000::".parse().unwrap();
        flow.slices = Some(SliceVariation {
            var_src: VarMode::Increase,
            var_dst: VarMode::Random,
            src_range: PortRange::new(1, 100),
            dst_range: PortRange::new(1, 100),
            v4_src_offset: 2,
            v4_dst_offset: 2,
            v6_src_offset: 14,
            v6_dst_offset: 14,
        });
        let sender = StatelessSender {
            common: test_common(tb, 1000, 1, 2, 1),
            flow,
            latency: None,
        };
        sender.run(&mut tx).unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1000);
        for f in &frames {
            assert!(checksums_valid(f), "bad checksum in varied-IP frame");
        }
        // Foreground frames carry the increasing source slice.
        let first_fg: Vec<u16> = frames
            .iter()
            .filter(|f| classify(f) == FrameKind::TestV4)
            .take(3)
            .map(|f| u16::from_be_bytes([f[28], f[29]]))
            .collect();
        assert_eq!(first_fg, vec![1, 3, 5]); // bg frames consume the odd steps
    }

    #[test]
    fn multi_subnet_destinations_stay_in_range() {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(8192);
        let mut flow = test_flow(Direction::Forward, IpVersion::V4);
        flow.num_dest_nets = 4;
        let sender = StatelessSender {
            common: test_common(tb, 2000, 1, 2, 1),
            flow,
            latency: None,
        };
        sender.run(&mut tx).unwrap();
        let frames = drain(&mut rx);
        let mut seen = [false; 4];
        for f in &frames {
            match classify(f) {
                FrameKind::TestV4 => {
                    let net = f[frame::V4_DST_OFFSET + 2];
                    assert!(net < 4);
                    seen[net as usize] = true;
                }
                FrameKind::TestV6 => {
                    let net = f[frame::V6_DST_OFFSET + 7];
                    assert!(net < 4);
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert!(seen.iter().all(|&b| b), "not all subnets were used");
    }
}
