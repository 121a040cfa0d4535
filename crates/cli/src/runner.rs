use crate::args::{Cli, Commands, TestArgs};
use crate::output::print_report;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;
use xlatbench_common::params::{LatencyParams, StatefulParams, TestParams};
use xlatbench_common::types::START_DELAY_MS;
use xlatbench_common::Config;
use xlatbench_orchestrator::{run_test, TestBed};

pub fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    let latency_mode = matches!(cli.command, Commands::Latency { .. });
    let params = assemble_params(&cfg, cli.command.test_args(), latency_mode)?;
    params.validate(&cfg)?;

    info!(
        "frame size: {}, rate: {}, duration: {} s",
        params.ipv6_frame_size, params.frame_rate, params.duration
    );

    let bed = build_bed(&cfg)?;
    let report = run_test(&cfg, &params, bed)?;
    print_report(&report, cli.json)?;

    // Any pacing overrun makes the whole run untrustworthy.
    let invalid = report.forward.as_ref().is_some_and(|d| d.invalid)
        || report.reverse.as_ref().is_some_and(|d| d.invalid)
        || report.preliminary.as_ref().is_some_and(|p| p.underfilled);
    if invalid {
        return Err(anyhow!("the run is invalid, see the warnings above"));
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read configuration file '{}'", path.display()))?;
    let mut cfg: Config = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse configuration file '{}'", path.display()))?;
    cfg.validate()?;
    cfg.apply_ip_masks();
    Ok(cfg)
}

/// Interpret the positional tail: five stateful values when the
/// configuration asks for a stateful test, then two latency values in
/// latency mode.
fn assemble_params(cfg: &Config, args: &TestArgs, latency_mode: bool) -> Result<TestParams> {
    let mut params = TestParams::new(
        args.frame_size,
        args.frame_rate,
        args.duration,
        args.global_timeout,
        args.n,
        args.m,
    );
    let mut rest = args.rest.iter().copied();
    let mut take = |name: &str| {
        rest.next()
            .ok_or_else(|| anyhow!("missing command line parameter '{name}'"))
    };

    if cfg.stateful.is_stateful() {
        params = params.with_stateful(StatefulParams {
            pre_frames: u32::try_from(take("N")?).context("'N' out of range")?,
            state_table_size: u32::try_from(take("M")?).context("'M' out of range")?,
            pre_rate: u32::try_from(take("R")?).context("'R' out of range")?,
            pre_timeout: u16::try_from(take("T")?).context("'T' out of range")?,
            pre_delay: u32::try_from(take("D")?).context("'D' out of range")?,
        });
    }
    if latency_mode {
        params = params.with_latency(LatencyParams {
            delay: u16::try_from(take("delay")?).context("'delay' out of range")?,
            num_timestamps: u16::try_from(take("timestamps")?)
                .context("'timestamps' out of range")?,
        });
    }
    if rest.next().is_some() {
        return Err(anyhow!("too many command line parameters"));
    }
    Ok(params)
}

#[cfg(target_os = "linux")]
fn open_ports(cfg: &Config) -> Result<TestBed> {
    use xlatbench_engine::Timebase;
    use xlatbench_net::port::packet::PacketSocket;

    let left = cfg
        .left_ifname
        .as_deref()
        .ok_or_else(|| anyhow!("left_ifname is required"))?;
    let right = cfg
        .right_ifname
        .as_deref()
        .ok_or_else(|| anyhow!("right_ifname is required"))?;
    // One socket per role: senders and receivers poll independently.
    let left_tx = PacketSocket::open(left, cfg.promisc)?;
    let left_rx = PacketSocket::open(left, cfg.promisc)?;
    let right_tx = PacketSocket::open(right, cfg.promisc)?;
    let right_rx = PacketSocket::open(right, cfg.promisc)?;
    Ok(TestBed {
        left_tx: Box::new(left_tx),
        right_rx: Box::new(right_rx),
        right_tx: Box::new(right_tx),
        left_rx: Box::new(left_rx),
        tb: Timebase::init(),
        start_delay_ms: START_DELAY_MS,
    })
}

#[cfg(not(target_os = "linux"))]
fn open_ports(_cfg: &Config) -> Result<TestBed> {
    Err(anyhow!(
        "packet sockets are only supported on Linux; use loopback mode"
    ))
}

fn build_bed(cfg: &Config) -> Result<TestBed> {
    if cfg.loopback {
        info!("loopback mode: both directions are wired in memory");
        // Enough queue for a full receive window of small frames.
        return Ok(TestBed::loopback(1 << 16, START_DELAY_MS));
    }
    open_ports(cfg)
}
