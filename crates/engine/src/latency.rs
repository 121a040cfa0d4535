//! Latency overlay: probe frames, timestamps, percentiles
//!
//! A latency run tags K of the ordinary test frames as probes: same wire
//! format, lowercase payload tag, and a probe id the receiver uses to index
//! its timestamp vector. Probes are spread evenly over the measurement
//! window after an initial untagged `delay`; the i-th probe replaces the
//! `start + i*rate*(duration-delay)/K`-th frame. Each probe is pre-built
//! once, so the send path only rewrites the varying fields like any other
//! template.

use crate::sender::{FlowSpec, SenderCommon};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::params::LatencyParams;
use xlatbench_common::types::IpVersion;
use xlatbench_net::frame;
use xlatbench_net::template::FrameTemplate;

/// Placement of the K probes inside the frame stream.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSchedule {
    start_frame: u64,
    window_frames: u64,
    count: u64,
    sent: u64,
    next_at: u64,
}

impl ProbeSchedule {
    #[must_use]
    pub fn new(common: &SenderCommon, lat: &LatencyParams) -> Self {
        let start_frame = lat.delay as u64 * common.frame_rate as u64;
        let window_frames =
            (common.duration - lat.delay) as u64 * common.frame_rate as u64;
        Self {
            start_frame,
            window_frames,
            count: lat.num_timestamps as u64,
            sent: 0,
            next_at: start_frame,
        }
    }

    /// Frame ordinal of probe `i`.
    #[inline]
    #[must_use]
    pub fn ordinal(&self, i: u64) -> u64 {
        self.start_frame + i * self.window_frames / self.count
    }

    /// Is frame `k` the next probe?
    #[inline]
    #[must_use]
    pub fn due(&self, k: u64) -> bool {
        self.sent < self.count && k == self.next_at
    }

    #[inline]
    fn advance(&mut self) {
        self.sent += 1;
        self.next_at = self.ordinal(self.sent);
    }
}

/// The sender-side half of a latency measurement: pre-built probe templates,
/// their schedule, and the send timestamp vector.
pub struct LatencyOverlay {
    sched: ProbeSchedule,
    probes: Vec<FrameTemplate>,
    send_ts: Vec<u64>,
}

impl LatencyOverlay {
    /// Pre-build one probe per timestamp. A probe is foreground or
    /// background according to the class of the frame slot it will occupy;
    /// its destination network is uniform random. `zero_fg` makes the
    /// foreground probes carry all-zero addresses and ports, for the
    /// Responder whose probes get a learned tuple spliced in at send time.
    pub fn build(
        common: &SenderCommon,
        flow: &FlowSpec,
        lat: &LatencyParams,
        zero_fg: bool,
    ) -> BenchResult<Self> {
        let sched = ProbeSchedule::new(common, lat);
        let count = lat.num_timestamps as usize;
        let mut probes = Vec::new();
        probes
            .try_reserve_exact(count)
            .map_err(|_| BenchError::AllocationFailed("latency probe templates".into()))?;
        let mut send_ts = Vec::new();
        send_ts
            .try_reserve_exact(count)
            .map_err(|_| BenchError::AllocationFailed("send timestamp vector".into()))?;
        let mut net_rng = SmallRng::from_entropy();
        let (n, m) = (common.n as u64, common.m as u64);

        for i in 0..count {
            let is_fg = sched.ordinal(i as u64) % n < m;
            let subnet = if flow.num_dest_nets > 1 {
                net_rng.gen_range(0..flow.num_dest_nets as usize)
            } else {
                0
            };
            let buf = if is_fg {
                build_fg_probe(common, flow, subnet, i as u16, zero_fg)
            } else {
                build_bg_probe(common, flow, subnet, i as u16)
            };
            let offsets = if is_fg && !zero_fg {
                flow.fg_slice_offsets()
            } else if is_fg {
                Default::default()
            } else {
                flow.bg_slice_offsets()
            };
            probes.push(FrameTemplate::new(buf, offsets));
        }
        Ok(Self {
            sched,
            probes,
            send_ts,
        })
    }

    #[inline]
    #[must_use]
    pub fn due(&self, k: u64) -> bool {
        self.sched.due(k)
    }

    /// The template of the probe due now. Must be followed by
    /// [`Self::record_send`] once the frame left.
    #[inline]
    pub fn next_template(&mut self) -> &mut FrameTemplate {
        &mut self.probes[self.sched.sent as usize]
    }

    /// Timestamp the probe that was just transmitted.
    #[inline]
    pub fn record_send(&mut self, now: u64) {
        self.send_ts.push(now);
        self.sched.advance();
    }

    /// Send timestamps by probe id, once the run is over.
    #[must_use]
    pub fn into_send_ts(self) -> Vec<u64> {
        self.send_ts
    }
}

fn build_fg_probe(
    common: &SenderCommon,
    flow: &FlowSpec,
    subnet: usize,
    id: u16,
    zero_fg: bool,
) -> Vec<u8> {
    match flow.ip_version {
        IpVersion::V4 => {
            let (src, dst) = if zero_fg {
                (Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED)
            } else {
                let mut dst = flow.dst_ipv4.octets();
                if flow.num_dest_nets > 1 {
                    dst[2] = subnet as u8;
                }
                (flow.src_ipv4, Ipv4Addr::from(dst))
            };
            frame::build_latency_frame_v4(
                common.ipv4_frame_size,
                flow.dst_mac,
                flow.src_mac,
                src,
                dst,
                zero_fg || flow.var_sport.varies(),
                zero_fg || flow.var_dport.varies(),
                id,
            )
        }
        IpVersion::V6 => {
            let mut dst = flow.dst_ipv6.octets();
            if flow.num_dest_nets > 1 {
                dst[7] = subnet as u8;
            }
            frame::build_latency_frame_v6(
                common.ipv6_frame_size,
                flow.dst_mac,
                flow.src_mac,
                flow.src_ipv6,
                Ipv6Addr::from(dst),
                flow.var_sport.varies(),
                flow.var_dport.varies(),
                id,
            )
        }
    }
}

fn build_bg_probe(common: &SenderCommon, flow: &FlowSpec, subnet: usize, id: u16) -> Vec<u8> {
    let mut dst = flow.dst_bg.octets();
    if flow.num_dest_nets > 1 {
        dst[7] = subnet as u8;
    }
    frame::build_latency_frame_v6(
        common.ipv6_frame_size,
        flow.dst_mac,
        flow.src_mac,
        flow.src_bg,
        Ipv6Addr::from(dst),
        flow.var_sport.varies(),
        flow.var_dport.varies(),
        id,
    )
}

/// Typical (median) and worst-case (99.9th percentile) latency of one
/// direction, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencySummary {
    pub typical_ms: f64,
    pub worst_case_ms: f64,
}

/// Reduce the two timestamp vectors of a direction. A zero receive
/// timestamp means the probe was lost and contributes `penalty_ms`.
#[must_use]
pub fn evaluate_latency(
    send_ts: &[u64],
    receive_ts: &[u64],
    hz: u64,
    penalty_ms: f64,
) -> LatencySummary {
    let mut latency: Vec<f64> = send_ts
        .iter()
        .zip(receive_ts)
        .map(|(&s, &r)| {
            if r != 0 {
                1000.0 * (r.saturating_sub(s)) as f64 / hz as f64
            } else {
                penalty_ms
            }
        })
        .collect();
    if latency.len() < 2 {
        let only = latency.first().copied().unwrap_or(penalty_ms);
        return LatencySummary {
            typical_ms: only,
            worst_case_ms: only,
        };
    }
    latency.sort_by(|a, b| a.total_cmp(b));
    let k = latency.len();
    let typical_ms = if k % 2 == 1 {
        latency[k / 2]
    } else {
        (latency[k / 2 - 1] + latency[k / 2]) / 2.0
    };
    let worst_case_ms = latency[(0.999 * k as f64).ceil() as usize - 1];
    LatencySummary {
        typical_ms,
        worst_case_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timebase;
    use xlatbench_common::types::{Direction, MacAddr, PortRange, VarMode};

    fn flow() -> FlowSpec {
        FlowSpec {
            direction: Direction::Forward,
            ip_version: IpVersion::V6,
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

    fn common(rate: u32, duration: u16) -> SenderCommon {
        let tb = Timebase::init();
        SenderCommon {
            ipv6_frame_size: 84,
            ipv4_frame_size: 64,
            frame_rate: rate,
            duration,
            n: 2,
            m: 1,
            tb,
            start: 0,
        }
    }

    #[test]
    fn schedule_spreads_probes_evenly() {
        let c = common(1_000_000, 60);
        let lat = LatencyParams {
            delay: 5,
            num_timestamps: 500,
        };
        let sched = ProbeSchedule::new(&c, &lat);
        assert_eq!(sched.ordinal(0), 5_000_000);
        assert_eq!(sched.ordinal(1), 5_000_000 + 110_000);
        assert_eq!(sched.ordinal(499), 5_000_000 + 499 * 110_000);
        assert!(sched.ordinal(499) < 60_000_000);
    }

    #[test]
    fn schedule_fires_once_per_probe() {
        let c = common(100, 2);
        let lat = LatencyParams {
            delay: 1,
            num_timestamps: 10,
        };
        let mut sched = ProbeSchedule::new(&c, &lat);
        let mut fired = 0;
        for k in 0..200u64 {
            if sched.due(k) {
                fired += 1;
                sched.advance();
            }
        }
        assert_eq!(fired, 10);
    }

    #[test]
    fn overlay_probe_ids_are_sequential() {
        let c = common(100, 2);
        let lat = LatencyParams {
            delay: 0,
            num_timestamps: 8,
        };
        let mut overlay = LatencyOverlay::build(&c, &flow(), &lat, false).unwrap();
        for i in 0..8u16 {
            let t = overlay.next_template();
            match xlatbench_net::frame::classify(t.frame()) {
                xlatbench_net::frame::FrameKind::ProbeV6(id) => assert_eq!(id, i),
                other => panic!("not a probe: {other:?}"),
            }
            overlay.record_send(i as u64 + 1);
        }
        assert_eq!(overlay.into_send_ts().len(), 8);
    }

    #[test]
    fn evaluation_median_and_percentile() {
        let hz = 1000; // 1 tick = 1 ms
        let send: Vec<u64> = (1..=1000).collect();
        let recv: Vec<u64> = send.iter().map(|s| s + 5).collect();
        let summary = evaluate_latency(&send, &recv, hz, 100.0);
        // 5 ticks at 1000 Hz are 5 ms, for every probe alike.
        assert!((summary.typical_ms - 5.0).abs() < 1e-9);
        assert!((summary.worst_case_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn lost_probes_take_penalty() {
        let hz = 1_000_000;
        let send = vec![100, 200, 300, 400];
        let recv = vec![1100, 0, 1300, 0];
        let summary = evaluate_latency(&send, &recv, hz, 7000.0);
        // Two real values of 1 ms, two penalties of 7000 ms; even count:
        // median = (1 + 7000) / 2.
        assert!((summary.typical_ms - 3500.5).abs() < 1e-6);
        assert!((summary.worst_case_ms - 7000.0).abs() < 1e-9);
    }

    #[test]
    fn single_probe_is_its_own_percentile() {
        let summary = evaluate_latency(&[10], &[20], 1000, 50.0);
        assert!((summary.typical_ms - 10.0).abs() < 1e-9);
        assert!((summary.worst_case_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn worst_case_is_ordered_after_median() {
        let hz = 1_000_000_000;
        let send: Vec<u64> = (0..1000).map(|i| i * 1000).collect();
        let recv: Vec<u64> = send
            .iter()
            .enumerate()
            .map(|(i, s)| s + 1000 + (i as u64 % 97) * 13)
            .collect();
        let summary = evaluate_latency(&send, &recv, hz, 1000.0);
        assert!(summary.worst_case_ms >= summary.typical_ms);
    }
}
