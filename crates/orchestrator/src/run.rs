//! Test execution: spawn, pin, join
//!
//! One call runs one complete test. The orchestrator thread does no traffic
//! work itself; it builds the per-direction flows, verifies the worker
//! cores' clocks, computes the shared deadlines, launches the workers and
//! reduces what they hand back. Stateful tests run the preliminary phase on
//! the same cores first, then reuse the queues for the measurement.

use crate::report::{DirectionReport, PreliminaryReport, RunReport};
use crate::schedule::Schedule;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};
use xlatbench_common::config::Config;
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::params::TestParams;
use xlatbench_common::types::{Direction, EnumMode, StatefulMode, VarMode};
use xlatbench_engine::affinity;
use xlatbench_engine::initiator::{Enumeration, InitiatorSender};
use xlatbench_engine::latency::LatencyOverlay;
use xlatbench_engine::permute;
use xlatbench_engine::receiver::{LatencyTap, Receiver, ReceiverReport};
use xlatbench_engine::responder::{LearningReceiver, ResponderSender};
use xlatbench_engine::sender::{FlowSpec, SenderCommon, SenderReport, SliceVariation};
use xlatbench_engine::{evaluate_latency, StateTable, StatelessSender, Timebase};
use xlatbench_net::port::{mem, RxQueue, TxQueue};

/// The two ports of the tester, as four queue endpoints, plus the timebase.
pub struct TestBed {
    pub left_tx: Box<dyn TxQueue>,
    pub right_rx: Box<dyn RxQueue>,
    pub right_tx: Box<dyn TxQueue>,
    pub left_rx: Box<dyn RxQueue>,
    pub tb: Timebase,
    /// Delay between worker launch and the first frame (ms).
    pub start_delay_ms: u64,
}

impl TestBed {
    /// Self-test bed: both directions are ideal in-memory wires.
    #[must_use]
    pub fn loopback(capacity: usize, start_delay_ms: u64) -> Self {
        let (left_tx, right_rx) = mem::link(capacity);
        let (right_tx, left_rx) = mem::link(capacity);
        Self {
            left_tx: Box::new(left_tx),
            right_rx: Box::new(right_rx),
            right_tx: Box::new(right_tx),
            left_rx: Box::new(left_rx),
            tb: Timebase::init(),
            start_delay_ms,
        }
    }
}

/// Run one complete test and collect the report.
pub fn run_test(cfg: &Config, params: &TestParams, bed: TestBed) -> BenchResult<RunReport> {
    match cfg.stateful {
        StatefulMode::Stateless => run_stateless(cfg, params, bed),
        mode => run_stateful(cfg, params, bed, mode),
    }
}

fn run_stateless(cfg: &Config, params: &TestParams, bed: TestBed) -> BenchResult<RunReport> {
    let TestBed {
        left_tx,
        right_rx,
        right_tx,
        left_rx,
        tb,
        start_delay_ms,
    } = bed;

    for core in active_cores(cfg)? {
        tb.check_sync(core)?;
    }
    let sched = Schedule::compute(&tb, params, start_delay_ms);
    let mut report = RunReport::new();

    let mut forward = None;
    if cfg.forward {
        forward = Some(launch_direction(
            cfg,
            params,
            &tb,
            &sched,
            Direction::Forward,
            left_tx,
            right_rx,
        )?);
    }
    let mut reverse = None;
    if cfg.reverse {
        reverse = Some(launch_direction(
            cfg,
            params,
            &tb,
            &sched,
            Direction::Reverse,
            right_tx,
            left_rx,
        )?);
    }

    info!("testing initiated");
    if let Some((sh, rh)) = forward {
        let s = join("forward sender", sh)?;
        let r = join("forward receiver", rh)?;
        report.forward = Some(direction_report(Direction::Forward, params, &tb, s, r));
    }
    if let Some((sh, rh)) = reverse {
        let s = join("reverse sender", sh)?;
        let r = join("reverse receiver", rh)?;
        report.reverse = Some(direction_report(Direction::Reverse, params, &tb, s, r));
    }
    info!("test finished");
    Ok(report)
}

type SenderHandle = JoinHandle<BenchResult<SenderReport>>;
type ReceiverHandle = JoinHandle<BenchResult<ReceiverReport>>;

/// Spawn the sender/receiver pair of one stateless direction.
fn launch_direction(
    cfg: &Config,
    params: &TestParams,
    tb: &Timebase,
    sched: &Schedule,
    direction: Direction,
    mut tx: Box<dyn TxQueue>,
    mut rx: Box<dyn RxQueue>,
) -> BenchResult<(SenderHandle, ReceiverHandle)> {
    let (s_core, r_core) = direction_cores(cfg, direction)?;
    let flow = flow_for(cfg, direction);
    let common = sender_common(params, *tb, sched.start);
    let latency = match &params.latency {
        Some(l) => Some(LatencyOverlay::build(&common, &flow, l, false)?),
        None => None,
    };
    let sender = StatelessSender {
        common,
        flow,
        latency,
    };
    let sh = spawn(&format!("{direction}-sender"), s_core, move || {
        sender.run(&mut *tx)
    })?;
    let receiver = Receiver {
        tb: *tb,
        finish_at: sched.finish_receiving,
        direction,
        latency: params.latency.map(|l| LatencyTap::new(l.num_timestamps)),
    };
    let rh = spawn(&format!("{direction}-receiver"), r_core, move || {
        receiver.run(&mut *rx)
    })?;
    Ok((sh, rh))
}

fn run_stateful(
    cfg: &Config,
    params: &TestParams,
    bed: TestBed,
    mode: StatefulMode,
) -> BenchResult<RunReport> {
    let stateful = params.stateful.as_ref().ok_or_else(|| {
        BenchError::InvalidConfiguration("stateful test without stateful parameters".into())
    })?;
    let TestBed {
        left_tx,
        right_rx,
        right_tx,
        left_rx,
        tb,
        start_delay_ms,
    } = bed;

    // Orientation: which side initiates, which responds.
    let (init_dir, resp_dir) = match mode {
        StatefulMode::InitiatorRight => (Direction::Reverse, Direction::Forward),
        _ => (Direction::Forward, Direction::Reverse),
    };
    let (mut init_tx, mut learn_rx, resp_tx, plain_rx) = match mode {
        StatefulMode::InitiatorRight => (right_tx, left_rx, left_tx, right_rx),
        _ => (left_tx, right_rx, right_tx, left_rx),
    };
    let (init_s_core, learn_r_core) = direction_cores(cfg, init_dir)?;
    let (resp_s_core, plain_r_core) = direction_cores(cfg, resp_dir)?;
    for core in active_cores(cfg)? {
        tb.check_sync(core)?;
    }

    let table = Arc::new(StateTable::new(stateful.state_table_size as usize)?);
    // Unique-combination arrays are generated before any deadline is fixed;
    // permutation over a large space takes its time.
    let enumeration = build_enumeration(cfg, mode)?;
    let sched = Schedule::compute(&tb, params, start_delay_ms);
    let mut report = RunReport::new();

    // Phase 1: the preliminary run that teaches the Responder its state.
    let initiator = InitiatorSender {
        common: SenderCommon {
            ipv6_frame_size: params.ipv6_frame_size,
            ipv4_frame_size: params.ipv4_frame_size,
            frame_rate: stateful.pre_rate,
            duration: 0, // unused: the frame count rules this phase
            n: params.n,
            m: params.m,
            tb,
            start: sched.start_pre,
        },
        flow: flow_for(cfg, init_dir),
        pre_frames: stateful.pre_frames,
        enumeration,
    };
    let learner = LearningReceiver {
        tb,
        finish_at: sched.finish_receiving_pre,
        direction: init_dir,
        table: table.clone(),
        latency: None,
    };
    info!("preliminary frame sending initiated");
    let ih = spawn("initiator-sender", init_s_core, move || {
        let r = initiator.run(&mut *init_tx)?;
        Ok((r, init_tx))
    })?;
    let lh = spawn("responder-receiver", learn_r_core, move || {
        let r = learner.run(&mut *learn_rx)?;
        Ok((r, learn_rx))
    })?;
    let (pre_sent, init_tx) = join("initiator sender", ih)?;
    let (pre_recv, learn_rx) = join("responder receiver", lh)?;

    let valid_entries = (pre_recv.fg_received as usize).min(table.len());
    let underfilled = valid_entries < table.len();
    if underfilled {
        error!(
            "{}",
            BenchError::PreliminaryUnderfill {
                valid: valid_entries,
                expected: table.len(),
            }
        );
    } else {
        info!("preliminary phase finished");
    }
    report.preliminary = Some(PreliminaryReport {
        frames_sent: pre_sent.sent,
        frames_received: pre_recv.received(),
        valid_entries,
        state_table_size: table.len(),
        underfilled,
    });

    // Phase 2: the measurement. The initiator side sends ordinary traffic
    // into the learning receiver; the responder side replays learned tuples
    // into the plain receiver.
    let mut init_pair = None;
    if direction_active(cfg, init_dir) {
        let (mut tx, mut rx) = (init_tx, learn_rx);
        let flow = flow_for(cfg, init_dir);
        let common = sender_common(params, tb, sched.start);
        let latency = match &params.latency {
            Some(l) => Some(LatencyOverlay::build(&common, &flow, l, false)?),
            None => None,
        };
        let sender = StatelessSender {
            common,
            flow,
            latency,
        };
        let sh = spawn(&format!("{init_dir}-sender"), init_s_core, move || {
            sender.run(&mut *tx)
        })?;
        let learner = LearningReceiver {
            tb,
            finish_at: sched.finish_receiving,
            direction: init_dir,
            table: table.clone(),
            latency: params.latency.map(|l| LatencyTap::new(l.num_timestamps)),
        };
        let rh = spawn(&format!("{init_dir}-receiver"), learn_r_core, move || {
            learner.run(&mut *rx).map(ReceiverReport::from)
        })?;
        init_pair = Some((sh, rh));
    }
    let mut resp_pair = None;
    if direction_active(cfg, resp_dir) {
        let (mut tx, mut rx) = (resp_tx, plain_rx);
        let flow = flow_for(cfg, resp_dir);
        let common = sender_common(params, tb, sched.start);
        let latency = match &params.latency {
            Some(l) => Some(LatencyOverlay::build(&common, &flow, l, true)?),
            None => None,
        };
        let sender = ResponderSender {
            common,
            flow,
            select: cfg.responder_tuples,
            table: table.clone(),
            latency,
        };
        let sh = spawn(&format!("{resp_dir}-sender"), resp_s_core, move || {
            sender.run(&mut *tx)
        })?;
        let receiver = Receiver {
            tb,
            finish_at: sched.finish_receiving,
            direction: resp_dir,
            latency: params.latency.map(|l| LatencyTap::new(l.num_timestamps)),
        };
        let rh = spawn(&format!("{resp_dir}-receiver"), plain_r_core, move || {
            receiver.run(&mut *rx)
        })?;
        resp_pair = Some((sh, rh));
    }

    info!("testing initiated");
    if let Some((sh, rh)) = init_pair {
        let s = join("initiator-side sender", sh)?;
        let r = join("initiator-side receiver", rh)?;
        let rep = direction_report(init_dir, params, &tb, s, r);
        match init_dir {
            Direction::Forward => report.forward = Some(rep),
            Direction::Reverse => report.reverse = Some(rep),
        }
    }
    if let Some((sh, rh)) = resp_pair {
        let s = join("responder-side sender", sh)?;
        let r = join("responder-side receiver", rh)?;
        let rep = direction_report(resp_dir, params, &tb, s, r);
        match resp_dir {
            Direction::Forward => report.forward = Some(rep),
            Direction::Reverse => report.reverse = Some(rep),
        }
    }
    info!("test finished");
    Ok(report)
}

/// Which unique-combination source the preliminary sender uses.
fn build_enumeration(cfg: &Config, mode: StatefulMode) -> BenchResult<Enumeration> {
    let initiator_left = mode != StatefulMode::InitiatorRight;
    let (sport, dport) = if initiator_left {
        (cfg.fwd_sport_range(), cfg.fwd_dport_range())
    } else {
        (cfg.rev_sport_range(), cfg.rev_dport_range())
    };
    let (sip, dip) = if initiator_left {
        (cfg.ip_left_range(), cfg.ip_right_range())
    } else {
        (cfg.ip_right_range(), cfg.ip_left_range())
    };
    Ok(match (cfg.enumerate_ports, cfg.enumerate_ips) {
        (EnumMode::None, EnumMode::None) => Enumeration::None,
        (EnumMode::Permutation, EnumMode::Permutation) => {
            Enumeration::Quads(permute::unique_quads(sip, dip, sport, dport)?)
        }
        (EnumMode::Permutation, _) => {
            Enumeration::PortPairs(permute::unique_pairs(sport, dport)?)
        }
        (_, EnumMode::Permutation) => Enumeration::IpPairs(permute::unique_pairs(sip, dip)?),
        (ports @ (EnumMode::Increase | EnumMode::Decrease), ips) => Enumeration::Counters {
            increasing: ports == EnumMode::Increase,
            with_ports: true,
            with_ips: ips.active(),
        },
        (EnumMode::None, ips) => Enumeration::Counters {
            increasing: ips == EnumMode::Increase,
            with_ports: false,
            with_ips: true,
        },
    })
}

fn sender_common(params: &TestParams, tb: Timebase, start: u64) -> SenderCommon {
    SenderCommon {
        ipv6_frame_size: params.ipv6_frame_size,
        ipv4_frame_size: params.ipv4_frame_size,
        frame_rate: params.frame_rate,
        duration: params.duration,
        n: params.n,
        m: params.m,
        tb,
        start,
    }
}

/// Per-side address block of the configuration.
struct SideAddrs {
    real4: Ipv4Addr,
    virt4: Ipv4Addr,
    real6: Ipv6Addr,
    virt6: Ipv6Addr,
}

fn side_addrs(cfg: &Config, left: bool) -> SideAddrs {
    if left {
        SideAddrs {
            real4: cfg.ipv4_left_real,
            virt4: cfg.ipv4_left_virtual,
            real6: cfg.ipv6_left_real,
            virt6: cfg.ipv6_left_virtual,
        }
    } else {
        SideAddrs {
            real4: cfg.ipv4_right_real,
            virt4: cfg.ipv4_right_virtual,
            real6: cfg.ipv6_right_real,
            virt6: cfg.ipv6_right_virtual,
        }
    }
}

/// Assemble the flow of one direction from the configuration: the sender
/// side's real addresses towards the receiver side's real or virtual ones,
/// depending on whether the receiver side shares the sender's IP version.
fn flow_for(cfg: &Config, direction: Direction) -> FlowSpec {
    let sender_left = direction == Direction::Forward;
    let a = side_addrs(cfg, sender_left);
    let b = side_addrs(cfg, !sender_left);
    // Version of the receiving side decides between its real and virtual
    // addresses.
    let vb = if sender_left {
        cfg.ip_right_version
    } else {
        cfg.ip_left_version
    };

    let (dst_mac, src_mac) = if sender_left {
        (cfg.mac_left_dut, cfg.mac_left_tester)
    } else {
        (cfg.mac_right_dut, cfg.mac_right_tester)
    };

    let slices = if cfg.ip_varies() {
        let (var_src, var_dst) = if sender_left {
            (cfg.ip_left_varies, cfg.ip_right_varies)
        } else {
            (cfg.ip_right_varies, cfg.ip_left_varies)
        };
        let (src_range, dst_range) = if sender_left {
            (cfg.ip_left_range(), cfg.ip_right_range())
        } else {
            (cfg.ip_right_range(), cfg.ip_left_range())
        };
        let (v4_src_offset, v4_dst_offset, v6_src_offset, v6_dst_offset) = if sender_left {
            (
                cfg.ipv4_left_offset,
                cfg.ipv4_right_offset,
                cfg.ipv6_left_offset,
                cfg.ipv6_right_offset,
            )
        } else {
            (
                cfg.ipv4_right_offset,
                cfg.ipv4_left_offset,
                cfg.ipv6_right_offset,
                cfg.ipv6_left_offset,
            )
        };
        Some(SliceVariation {
            var_src,
            var_dst,
            src_range,
            dst_range,
            v4_src_offset,
            v4_dst_offset,
            v6_src_offset,
            v6_dst_offset,
        })
    } else {
        None
    };

    let (var_sport, var_dport) = if sender_left {
        (cfg.fwd_var_sport, cfg.fwd_var_dport)
    } else {
        (cfg.rev_var_sport, cfg.rev_var_dport)
    };
    let (sport_range, dport_range) = if sender_left {
        (cfg.fwd_sport_range(), cfg.fwd_dport_range())
    } else {
        (cfg.rev_sport_range(), cfg.rev_dport_range())
    };

    FlowSpec {
        direction,
        ip_version: if sender_left {
            cfg.ip_left_version
        } else {
            cfg.ip_right_version
        },
        dst_mac,
        src_mac,
        src_ipv4: a.real4,
        dst_ipv4: if vb.is_v4() { b.real4 } else { b.virt4 },
        src_ipv6: a.real6,
        dst_ipv6: if vb.is_v4() { b.virt6 } else { b.real6 },
        src_bg: a.real6,
        dst_bg: b.real6,
        num_dest_nets: if sender_left {
            cfg.num_right_nets
        } else {
            cfg.num_left_nets
        },
        var_sport,
        var_dport,
        sport_range,
        dport_range,
        slices,
    }
}

fn direction_report(
    direction: Direction,
    params: &TestParams,
    tb: &Timebase,
    s: SenderReport,
    r: ReceiverReport,
) -> DirectionReport {
    let latency = match (&s.send_ts, &r.receive_ts, &params.latency) {
        (Some(send_ts), Some(receive_ts), Some(l)) => {
            let penalty_ms =
                1000.0 * (params.duration - l.delay) as f64 + params.global_timeout as f64;
            Some(evaluate_latency(send_ts, receive_ts, tb.hz(), penalty_ms))
        }
        _ => None,
    };
    DirectionReport {
        direction: direction.label(),
        elapsed_secs: s.elapsed_secs,
        frames_sent: s.sent,
        frames_received: r.received,
        invalid: s.invalid,
        latency,
    }
}

fn direction_active(cfg: &Config, direction: Direction) -> bool {
    match direction {
        Direction::Forward => cfg.forward,
        Direction::Reverse => cfg.reverse,
    }
}

fn direction_cores(cfg: &Config, direction: Direction) -> BenchResult<(usize, usize)> {
    let (s, r, s_name, r_name) = match direction {
        Direction::Forward => (
            cfg.cpu_left_sender,
            cfg.cpu_right_receiver,
            "cpu_left_sender",
            "cpu_right_receiver",
        ),
        Direction::Reverse => (
            cfg.cpu_right_sender,
            cfg.cpu_left_receiver,
            "cpu_right_sender",
            "cpu_left_receiver",
        ),
    };
    let missing =
        |name: &str| BenchError::InvalidConfiguration(format!("{name} was not specified"));
    Ok((s.ok_or_else(|| missing(s_name))?, r.ok_or_else(|| missing(r_name))?))
}

/// Cores of all active workers, for the clock sanity check.
fn active_cores(cfg: &Config) -> BenchResult<Vec<usize>> {
    let mut cores = Vec::new();
    if cfg.forward || cfg.stateful == StatefulMode::InitiatorLeft {
        let (s, r) = direction_cores(cfg, Direction::Forward)?;
        cores.push(s);
        cores.push(r);
    }
    if cfg.reverse || cfg.stateful == StatefulMode::InitiatorRight {
        let (s, r) = direction_cores(cfg, Direction::Reverse)?;
        cores.push(s);
        cores.push(r);
    }
    cores.sort_unstable();
    cores.dedup();
    Ok(cores)
}

fn spawn<T, F>(name: &str, core: usize, f: F) -> BenchResult<JoinHandle<BenchResult<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> BenchResult<T> + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            affinity::pin_to_core(core);
            f()
        })
        .map_err(BenchError::Io)
}

fn join<T>(name: &str, handle: JoinHandle<BenchResult<T>>) -> BenchResult<T> {
    handle
        .join()
        .map_err(|_| BenchError::WorkerPanic(name.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlatbench_common::params::{LatencyParams, StatefulParams};
    use xlatbench_common::types::{IpVersion, TupleSelect};

    fn loopback_config() -> Config {
        Config {
            loopback: true,
            cpu_left_sender: Some(0),
            cpu_right_receiver: Some(0),
            cpu_right_sender: Some(0),
            cpu_left_receiver: Some(0),
            ..Config::default()
        }
    }

    #[test]
    fn stateless_loopback_run_counts_every_frame() {
        let cfg = loopback_config();
        let params = TestParams::new(84, 1000, 1, 200, 2, 1);
        params.validate(&cfg).unwrap();
        let report = run_test(&cfg, &params, TestBed::loopback(4096, 10)).unwrap();

        let fwd = report.forward.expect("forward direction ran");
        assert_eq!(fwd.frames_sent, 1000);
        assert_eq!(fwd.frames_received, 1000);
        assert!(!fwd.invalid);
        assert!(fwd.latency.is_none());

        let rev = report.reverse.expect("reverse direction ran");
        assert_eq!(rev.frames_sent, 1000);
        assert_eq!(rev.frames_received, 1000);
        assert!(report.preliminary.is_none());
    }

    #[test]
    fn latency_loopback_run_times_every_probe() {
        let cfg = loopback_config();
        let params = TestParams::new(84, 1000, 1, 200, 2, 1).with_latency(LatencyParams {
            delay: 0,
            num_timestamps: 100,
        });
        params.validate(&cfg).unwrap();
        let report = run_test(&cfg, &params, TestBed::loopback(4096, 10)).unwrap();

        let fwd = report.forward.unwrap();
        assert_eq!(fwd.frames_received, 1000); // probes count as test frames
        let lat = fwd.latency.expect("latency summary present");
        assert!(lat.worst_case_ms >= lat.typical_ms);
        // Nothing was lost on the ideal wire, so no penalty values: the
        // loopback round trip is far below a second.
        assert!(lat.worst_case_ms < 1000.0);
        assert!(lat.typical_ms >= 0.0);
        assert!(report.reverse.unwrap().latency.is_some());
    }

    #[test]
    fn stateful_loopback_run_fills_table_then_measures() {
        let mut cfg = loopback_config();
        cfg.ip_left_version = IpVersion::V4;
        cfg.ip_right_version = IpVersion::V4;
        cfg.stateful = StatefulMode::InitiatorLeft;
        cfg.responder_tuples = TupleSelect::Random;
        cfg.enumerate_ports = EnumMode::Permutation;
        cfg.fwd_var_sport = VarMode::Random;
        cfg.fwd_var_dport = VarMode::Random;
        cfg.fwd_sport_min = 1024;
        cfg.fwd_sport_max = 1028; // 5 source ports
        cfg.fwd_dport_min = 1;
        cfg.fwd_dport_max = 10; // x 10 destination ports = 50 combinations
        let params = TestParams::new(84, 500, 1, 200, 2, 1).with_stateful(StatefulParams {
            pre_frames: 100,
            state_table_size: 50,
            pre_rate: 1000,
            pre_timeout: 50,
            pre_delay: 200,
        });
        cfg.validate().unwrap();
        params.validate(&cfg).unwrap();

        let report = run_test(&cfg, &params, TestBed::loopback(4096, 10)).unwrap();

        let pre = report.preliminary.expect("preliminary phase ran");
        assert_eq!(pre.frames_sent, 100);
        assert_eq!(pre.frames_received, 100);
        assert_eq!(pre.valid_entries, 50); // every foreground tuple learned
        assert!(!pre.underfilled);

        let fwd = report.forward.expect("initiator direction ran");
        assert_eq!(fwd.frames_sent, 500);
        assert_eq!(fwd.frames_received, 500);
        let rev = report.reverse.expect("responder direction ran");
        assert_eq!(rev.frames_sent, 500);
        assert_eq!(rev.frames_received, 500);
    }
}
