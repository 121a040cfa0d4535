//! Command-line test parameters
//!
//! The positional parameters of a test run, separated from [`crate::Config`]
//! because they change between runs of a binary-search campaign while the
//! configuration file stays put.

use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::types::{EnumMode, StatefulMode, TupleSelect};

/// Parameters of the stateful preliminary phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatefulParams {
    /// "N": number of preliminary frames.
    pub pre_frames: u32,
    /// "M": number of entries in the Responder's state table.
    pub state_table_size: u32,
    /// "R": frame rate of the preliminary phase.
    pub pre_rate: u32,
    /// "T": receive-side timeout of the preliminary phase (ms).
    pub pre_timeout: u16,
    /// "D": delay between preliminary start and measurement start (ms).
    pub pre_delay: u32,
}

impl StatefulParams {
    /// Number of foreground preliminary frames: all of them minus the
    /// background share. `pre_frames*m/n` would round the wrong way.
    #[inline]
    #[must_use]
    pub fn effective_pre_frames(&self, n: u32, m: u32) -> u32 {
        self.pre_frames - (self.pre_frames as u64 * (n - m) as u64 / n as u64) as u32
    }
}

/// Parameters of the latency overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyParams {
    /// Seconds at the start of the test during which no probes are tagged.
    pub delay: u16,
    /// "K": number of latency probes (RFC 8219 asks for at least 500).
    pub num_timestamps: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestParams {
    /// Size of the frames carrying IPv6 datagrams, including the 4-byte FCS.
    pub ipv6_frame_size: u16,
    /// Always `ipv6_frame_size - 20`; IPv4 headers are 20 bytes shorter.
    pub ipv4_frame_size: u16,
    pub frame_rate: u32,
    /// Test duration in seconds.
    pub duration: u16,
    /// Extra receive window after the last frame is due (ms).
    pub global_timeout: u16,
    /// Foreground modulus: frame k is foreground iff `k % n < m`.
    pub n: u32,
    pub m: u32,
    pub stateful: Option<StatefulParams>,
    pub latency: Option<LatencyParams>,
}

/// 14,880,952 is the frame rate of 10 Gbps Ethernet at 64-byte frames.
pub const MAX_FRAME_RATE: u32 = 14_880_952;

impl TestParams {
    pub fn new(
        ipv6_frame_size: u16,
        frame_rate: u32,
        duration: u16,
        global_timeout: u16,
        n: u32,
        m: u32,
    ) -> Self {
        Self {
            ipv6_frame_size,
            ipv4_frame_size: ipv6_frame_size.saturating_sub(20),
            frame_rate,
            duration,
            global_timeout,
            n,
            m,
            stateful: None,
            latency: None,
        }
    }

    #[must_use]
    pub fn with_stateful(mut self, stateful: StatefulParams) -> Self {
        self.stateful = Some(stateful);
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: LatencyParams) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Frames each active sender transmits during the measurement.
    #[inline]
    #[must_use]
    pub fn frames_to_send(&self) -> u64 {
        self.duration as u64 * self.frame_rate as u64
    }

    /// Check the parameter bounds and every cross-parameter constraint.
    pub fn validate(&self, cfg: &Config) -> BenchResult<()> {
        let bad = |msg: String| Err(BenchError::InvalidConfiguration(msg));

        if !(84..=1538).contains(&self.ipv6_frame_size) {
            return bad("IPv6 frame size must be between 84 and 1538".into());
        }
        if self.frame_rate < 1 || self.frame_rate > MAX_FRAME_RATE {
            return bad(format!("frame rate must be between 1 and {MAX_FRAME_RATE}"));
        }
        if !(1..=3600).contains(&self.duration) {
            return bad("test duration must be between 1 and 3600 seconds".into());
        }
        if self.global_timeout > 60000 {
            return bad("global timeout must be between 0 and 60000 ms".into());
        }
        if self.n < 2 {
            return bad("the value of 'n' must be at least 2".into());
        }
        if self.m > self.n {
            return bad("the value of 'm' must not exceed 'n'".into());
        }
        // Oversized frames leave no room for the 20 extra IPv6 header bytes,
        // so they are only allowed when all traffic is IPv4.
        let v6_foreground = (cfg.forward && !cfg.ip_left_version.is_v4())
            || (cfg.reverse && !cfg.ip_right_version.is_v4());
        if self.ipv6_frame_size > 1518 && (v6_foreground || self.m < self.n) {
            return bad(
                "IPv6 frame sizes above 1518 are allowed for pure IPv4 traffic only".into(),
            );
        }

        if cfg.stateful.is_stateful() != self.stateful.is_some() {
            return bad("stateful parameters must be given exactly when the \
                        configuration selects a stateful test"
                .into());
        }

        if let Some(s) = &self.stateful {
            self.validate_stateful(cfg, s)?;
        }

        if let Some(l) = &self.latency {
            if l.delay > 3600 {
                return bad("delay before timestamps must be between 0 and 3600".into());
            }
            if self.duration <= l.delay {
                return bad("test duration must be longer than the delay before timestamps".into());
            }
            if l.num_timestamps < 1 || l.num_timestamps > 50000 {
                return bad("number of timestamps must be between 1 and 50000".into());
            }
            let window_frames = (self.duration - l.delay) as u64 * self.frame_rate as u64;
            if window_frames < l.num_timestamps as u64 {
                return bad("not enough frames in the (duration - delay) interval \
                            to carry that many timestamps"
                    .into());
            }
        }

        Ok(())
    }

    fn validate_stateful(&self, cfg: &Config, s: &StatefulParams) -> BenchResult<()> {
        let bad = |msg: String| Err(BenchError::InvalidConfiguration(msg));

        if s.pre_frames < 1 {
            return bad("'N' (preliminary frames) must be at least 1".into());
        }
        if s.state_table_size < 1 {
            return bad("'M' (state table size) must be at least 1".into());
        }
        if s.pre_rate < 1 || s.pre_rate > MAX_FRAME_RATE {
            return bad(format!(
                "preliminary frame rate 'R' must be between 1 and {MAX_FRAME_RATE}"
            ));
        }
        if s.pre_timeout < 1 || s.pre_timeout > 2000 {
            return bad("'T' (preliminary timeout) must be between 1 and 2000 ms".into());
        }
        if s.pre_delay < 1 || s.pre_delay > 100_000_000 {
            return bad("'D' (preliminary delay) must be between 1 and 100000000 ms".into());
        }
        // The preliminary phase must fit into the delay before the
        // measurement: sending time plus the receive timeout.
        let pre_sending_ms = 1000u64 * s.pre_frames as u64 / s.pre_rate as u64;
        if pre_sending_ms + s.pre_timeout as u64 > s.pre_delay as u64 {
            return bad("1000*N/R + T > D: the preliminary phase does not fit \
                        into the delay before the measurement"
                .into());
        }
        let eff = s.effective_pre_frames(self.n, self.m);
        if eff < s.state_table_size {
            return bad("N - N*(n-m)/n < M: not enough foreground preliminary \
                        frames to fill the state table"
                .into());
        }

        // Unique combinations are consumed one per foreground preliminary
        // frame; there must be at least as many as frames.
        let ports = cfg.enumerate_ports == EnumMode::Permutation;
        let ips = cfg.enumerate_ips == EnumMode::Permutation;
        let (sport, dport) = if cfg.stateful == StatefulMode::InitiatorLeft {
            (cfg.fwd_sport_range(), cfg.fwd_dport_range())
        } else {
            (cfg.rev_sport_range(), cfg.rev_dport_range())
        };
        let (sip, dip) = if cfg.stateful == StatefulMode::InitiatorLeft {
            (cfg.ip_left_range(), cfg.ip_right_range())
        } else {
            (cfg.ip_right_range(), cfg.ip_left_range())
        };
        if ports && !ips {
            let combos = sport.size() as u64 * dport.size() as u64;
            if combos < eff as u64 {
                return bad(format!(
                    "only {combos} unique port number combinations for {eff} \
                     foreground preliminary frames"
                ));
            }
        }
        if ips && !ports {
            let combos = sip.size() as u64 * dip.size() as u64;
            if combos < eff as u64 {
                return bad(format!(
                    "only {combos} unique IP address combinations for {eff} \
                     foreground preliminary frames"
                ));
            }
        }
        if ips && ports {
            let combos = sip.size() as u64
                * dip.size() as u64
                * sport.size() as u64
                * dport.size() as u64;
            if combos < eff as u64 {
                return bad(format!(
                    "only {combos} unique IP address and port combinations for \
                     {eff} foreground preliminary frames"
                ));
            }
        }

        if cfg.responder_tuples != TupleSelect::First && s.state_table_size == 1 {
            return bad("responder_tuples must be 0 when the state table size (M) is 1".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IpVersion, VarMode};

    fn stateless_config() -> Config {
        Config {
            loopback: true,
            cpu_left_sender: Some(1),
            cpu_right_receiver: Some(2),
            cpu_right_sender: Some(3),
            cpu_left_receiver: Some(4),
            ..Config::default()
        }
    }

    fn stateful_config() -> Config {
        Config {
            ip_left_version: IpVersion::V4,
            ip_right_version: IpVersion::V4,
            stateful: StatefulMode::InitiatorLeft,
            ..stateless_config()
        }
    }

    #[test]
    fn bounds_are_enforced() {
        let cfg = stateless_config();
        assert!(TestParams::new(84, 1000, 5, 0, 2, 1).validate(&cfg).is_ok());
        assert!(TestParams::new(83, 1000, 5, 0, 2, 1).validate(&cfg).is_err());
        assert!(TestParams::new(84, 0, 5, 0, 2, 1).validate(&cfg).is_err());
        assert!(TestParams::new(84, 1000, 0, 0, 2, 1).validate(&cfg).is_err());
        assert!(TestParams::new(84, 1000, 5, 60001, 2, 1)
            .validate(&cfg)
            .is_err());
        assert!(TestParams::new(84, 1000, 5, 0, 1, 1).validate(&cfg).is_err());
        assert!(TestParams::new(84, 1000, 5, 0, 2, 3).validate(&cfg).is_err());
    }

    #[test]
    fn oversized_frames_only_for_pure_v4() {
        let mut cfg = stateless_config();
        // Left side is IPv6 by default.
        assert!(TestParams::new(1538, 1000, 5, 0, 2, 2)
            .validate(&cfg)
            .is_err());
        cfg.ip_left_version = IpVersion::V4;
        cfg.ip_right_version = IpVersion::V4;
        assert!(TestParams::new(1538, 1000, 5, 0, 2, 2)
            .validate(&cfg)
            .is_ok());
        // Background traffic is IPv6, so m < n also forbids oversize.
        assert!(TestParams::new(1538, 1000, 5, 0, 2, 1)
            .validate(&cfg)
            .is_err());
    }

    #[test]
    fn preliminary_phase_must_fit_into_delay() {
        let cfg = stateful_config();
        let ok = StatefulParams {
            pre_frames: 1000,
            state_table_size: 500,
            pre_rate: 1000,
            pre_timeout: 100,
            pre_delay: 1500,
        };
        assert!(TestParams::new(84, 1000, 5, 0, 2, 2)
            .with_stateful(ok)
            .validate(&cfg)
            .is_ok());
        let too_slow = StatefulParams {
            pre_delay: 1000,
            ..ok
        };
        assert!(TestParams::new(84, 1000, 5, 0, 2, 2)
            .with_stateful(too_slow)
            .validate(&cfg)
            .is_err());
    }

    #[test]
    fn state_table_must_be_fillable() {
        let cfg = stateful_config();
        // n=2, m=1 halves the foreground frames: 500 < 600.
        let s = StatefulParams {
            pre_frames: 1000,
            state_table_size: 600,
            pre_rate: 1000,
            pre_timeout: 100,
            pre_delay: 2000,
        };
        assert!(TestParams::new(84, 1000, 5, 0, 2, 1)
            .with_stateful(s)
            .validate(&cfg)
            .is_err());
    }

    #[test]
    fn permutation_needs_enough_combinations() {
        let mut cfg = stateful_config();
        cfg.enumerate_ports = EnumMode::Permutation;
        cfg.fwd_var_sport = VarMode::Random;
        cfg.fwd_var_dport = VarMode::Random;
        cfg.fwd_sport_min = 1024;
        cfg.fwd_sport_max = 1033; // 10 values
        cfg.fwd_dport_min = 1;
        cfg.fwd_dport_max = 10; // 10 values -> 100 combinations
        let s = StatefulParams {
            pre_frames: 200,
            state_table_size: 100,
            pre_rate: 1000,
            pre_timeout: 100,
            pre_delay: 1000,
        };
        assert!(TestParams::new(84, 1000, 5, 0, 2, 2)
            .with_stateful(s)
            .validate(&cfg)
            .is_err());
        let s = StatefulParams {
            pre_frames: 100,
            ..s
        };
        assert!(TestParams::new(84, 1000, 5, 0, 2, 2)
            .with_stateful(s)
            .validate(&cfg)
            .is_ok());
    }

    #[test]
    fn latency_constraints() {
        let cfg = stateless_config();
        let base = TestParams::new(84, 1000, 5, 0, 2, 1);
        let ok = base.with_latency(LatencyParams {
            delay: 1,
            num_timestamps: 500,
        });
        assert!(ok.validate(&cfg).is_ok());
        let delay_too_long = base.with_latency(LatencyParams {
            delay: 5,
            num_timestamps: 500,
        });
        assert!(delay_too_long.validate(&cfg).is_err());
        let too_many = base.with_latency(LatencyParams {
            delay: 4,
            num_timestamps: 2000, // window holds only 1000 frames
        });
        assert!(too_many.validate(&cfg).is_err());
    }

    #[test]
    fn effective_pre_frames_rounding() {
        let s = StatefulParams {
            pre_frames: 10,
            state_table_size: 1,
            pre_rate: 1,
            pre_timeout: 1,
            pre_delay: 100_000,
        };
        // n=3, m=1: 10 - 10*2/3 = 10 - 6 = 4 (not 10/3 rounded).
        assert_eq!(s.effective_pre_frames(3, 1), 4);
        assert_eq!(s.effective_pre_frames(2, 2), 10);
    }
}
