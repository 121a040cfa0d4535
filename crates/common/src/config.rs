//! Configuration surface of the tester
//!
//! The configuration file is a JSON document describing everything that is
//! not a command-line positional parameter: addresses, MACs, CPU cores,
//! direction enables, port/IP variation and the stateful-test controls.
//! Every cross-field rule is enforced by [`Config::validate`]; the loader
//! then calls [`Config::apply_ip_masks`] so the varied 16-bit address slices
//! start out zeroed.

use crate::error::{BenchError, BenchResult};
use crate::types::{EnumMode, IpVersion, MacAddr, PortRange, StatefulMode, TupleSelect, VarMode};
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Foreground IP version of the Left / Right sender.
    pub ip_left_version: IpVersion,
    pub ip_right_version: IpVersion,

    /// Real addresses of the tester sides and the "allusions" of the other
    /// version (e.g. the IPv6 image of a side's IPv4 address under a NAT64
    /// prefix).
    pub ipv6_left_real: Ipv6Addr,
    pub ipv6_left_virtual: Ipv6Addr,
    pub ipv6_right_real: Ipv6Addr,
    pub ipv6_right_virtual: Ipv6Addr,
    pub ipv4_left_real: Ipv4Addr,
    pub ipv4_left_virtual: Ipv4Addr,
    pub ipv4_right_real: Ipv4Addr,
    pub ipv4_right_virtual: Ipv4Addr,

    pub mac_left_tester: MacAddr,
    pub mac_right_tester: MacAddr,
    pub mac_left_dut: MacAddr,
    pub mac_right_dut: MacAddr,

    /// Active directions.
    pub forward: bool,
    pub reverse: bool,
    pub promisc: bool,

    /// Number of destination networks per side (1-256).
    pub num_left_nets: u16,
    pub num_right_nets: u16,

    /// Worker CPU cores; required for the respective active direction.
    pub cpu_left_sender: Option<usize>,
    pub cpu_right_receiver: Option<usize>,
    pub cpu_right_sender: Option<usize>,
    pub cpu_left_receiver: Option<usize>,

    /// Network interfaces of the two ports. Unused in loopback mode.
    pub left_ifname: Option<String>,
    pub right_ifname: Option<String>,

    /// Wire the left TX to the right RX (and vice versa) in memory instead
    /// of opening packet sockets. Self-test mode.
    pub loopback: bool,

    /// Port number variation per direction and field.
    pub fwd_var_sport: VarMode,
    pub fwd_var_dport: VarMode,
    pub rev_var_sport: VarMode,
    pub rev_var_dport: VarMode,
    pub fwd_sport_min: u16,
    pub fwd_sport_max: u16,
    pub fwd_dport_min: u16,
    pub fwd_dport_max: u16,
    pub rev_sport_min: u16,
    pub rev_sport_max: u16,
    pub rev_dport_min: u16,
    pub rev_dport_max: u16,

    /// 16-bit IP address slice variation per side, with the slice byte
    /// offset inside the address (IPv4: 1-2, IPv6: 6-14).
    pub ip_left_varies: VarMode,
    pub ip_right_varies: VarMode,
    pub ip_left_min: u16,
    pub ip_left_max: u16,
    pub ip_right_min: u16,
    pub ip_right_max: u16,
    pub ipv4_left_offset: usize,
    pub ipv4_right_offset: usize,
    pub ipv6_left_offset: usize,
    pub ipv6_right_offset: usize,

    /// Stateful-test controls.
    pub stateful: StatefulMode,
    pub responder_tuples: TupleSelect,
    pub enumerate_ports: EnumMode,
    pub enumerate_ips: EnumMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // NAT64 benchmarking defaults: IPv6 on the left, IPv4 on the right.
            ip_left_version: IpVersion::V6,
            ip_right_version: IpVersion::V4,
            ipv6_left_real: Ipv6Addr::new(0x2001, 2, 0, 0, 0, 0, 0, 1),
            ipv6_left_virtual: Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0xc612, 1),
            ipv6_right_real: Ipv6Addr::new(0x2001, 2, 0, 0x8000, 0, 0, 0, 1),
            ipv6_right_virtual: Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0xc613, 1),
            ipv4_left_real: Ipv4Addr::new(198, 18, 0, 1),
            ipv4_left_virtual: Ipv4Addr::new(198, 18, 0, 2),
            ipv4_right_real: Ipv4Addr::new(198, 19, 0, 1),
            ipv4_right_virtual: Ipv4Addr::new(198, 19, 0, 2),
            mac_left_tester: MacAddr([0x02, 0, 0, 0, 0, 0x01]),
            mac_right_tester: MacAddr([0x02, 0, 0, 0, 0, 0x02]),
            mac_left_dut: MacAddr([0x02, 0, 0, 0, 0, 0x11]),
            mac_right_dut: MacAddr([0x02, 0, 0, 0, 0, 0x12]),
            forward: true,
            reverse: true,
            promisc: true,
            num_left_nets: 1,
            num_right_nets: 1,
            cpu_left_sender: None,
            cpu_right_receiver: None,
            cpu_right_sender: None,
            cpu_left_receiver: None,
            left_ifname: None,
            right_ifname: None,
            loopback: false,
            fwd_var_sport: VarMode::Fixed,
            fwd_var_dport: VarMode::Fixed,
            rev_var_sport: VarMode::Fixed,
            rev_var_dport: VarMode::Fixed,
            // Maximum ranges recommended by RFC 4814.
            fwd_sport_min: 1024,
            fwd_sport_max: 65535,
            fwd_dport_min: 1,
            fwd_dport_max: 49151,
            rev_sport_min: 1024,
            rev_sport_max: 65535,
            rev_dport_min: 1,
            rev_dport_max: 49151,
            ip_left_varies: VarMode::Fixed,
            ip_right_varies: VarMode::Fixed,
            ip_left_min: 0,
            ip_left_max: 255,
            ip_right_min: 0,
            ip_right_max: 255,
            ipv4_left_offset: 2,
            ipv4_right_offset: 2,
            ipv6_left_offset: 14,
            ipv6_right_offset: 14,
            stateful: StatefulMode::Stateless,
            responder_tuples: TupleSelect::First,
            enumerate_ports: EnumMode::None,
            enumerate_ips: EnumMode::None,
        }
    }
}

impl Config {
    /// At least one port field of the forward direction varies.
    #[inline]
    #[must_use]
    pub fn fwd_varport(&self) -> bool {
        self.fwd_var_sport.varies() || self.fwd_var_dport.varies()
    }

    /// At least one port field of the reverse direction varies.
    #[inline]
    #[must_use]
    pub fn rev_varport(&self) -> bool {
        self.rev_var_sport.varies() || self.rev_var_dport.varies()
    }

    /// At least one IP address slice varies.
    #[inline]
    #[must_use]
    pub fn ip_varies(&self) -> bool {
        self.ip_left_varies.varies() || self.ip_right_varies.varies()
    }

    #[inline]
    #[must_use]
    pub fn fwd_sport_range(&self) -> PortRange {
        PortRange::new(self.fwd_sport_min, self.fwd_sport_max)
    }

    #[inline]
    #[must_use]
    pub fn fwd_dport_range(&self) -> PortRange {
        PortRange::new(self.fwd_dport_min, self.fwd_dport_max)
    }

    #[inline]
    #[must_use]
    pub fn rev_sport_range(&self) -> PortRange {
        PortRange::new(self.rev_sport_min, self.rev_sport_max)
    }

    #[inline]
    #[must_use]
    pub fn rev_dport_range(&self) -> PortRange {
        PortRange::new(self.rev_dport_min, self.rev_dport_max)
    }

    #[inline]
    #[must_use]
    pub fn ip_left_range(&self) -> PortRange {
        PortRange::new(self.ip_left_min, self.ip_left_max)
    }

    #[inline]
    #[must_use]
    pub fn ip_right_range(&self) -> PortRange {
        PortRange::new(self.ip_right_min, self.ip_right_max)
    }

    /// Check every cross-field rule of the configuration surface.
    pub fn validate(&self) -> BenchResult<()> {
        let bad = |msg: String| Err(BenchError::InvalidConfiguration(msg));

        if !self.stateful.is_stateful() && !self.forward && !self.reverse {
            return bad("no active direction was specified".into());
        }

        // Cores for the active directions. The preliminary phase reuses the
        // Initiator-side sender and the Responder-side receiver.
        let need_fwd_cores = self.forward || self.stateful == StatefulMode::InitiatorLeft;
        let need_rev_cores = self.reverse || self.stateful == StatefulMode::InitiatorRight;
        if need_fwd_cores && (self.cpu_left_sender.is_none() || self.cpu_right_receiver.is_none())
        {
            return bad("cpu_left_sender and cpu_right_receiver are required".into());
        }
        if need_rev_cores && (self.cpu_right_sender.is_none() || self.cpu_left_receiver.is_none())
        {
            return bad("cpu_right_sender and cpu_left_receiver are required".into());
        }

        for (name, nets) in [
            ("num_left_nets", self.num_left_nets),
            ("num_right_nets", self.num_right_nets),
        ] {
            if nets < 1 || nets > 256 {
                return bad(format!("{name} must be between 1 and 256"));
            }
        }

        for (name, range) in [
            ("fwd sport", self.fwd_sport_range()),
            ("fwd dport", self.fwd_dport_range()),
            ("rev sport", self.rev_sport_range()),
            ("rev dport", self.rev_dport_range()),
            ("left IP slice", self.ip_left_range()),
            ("right IP slice", self.ip_right_range()),
        ] {
            if range.min > range.max {
                return bad(format!("{name} range is empty ({}..{})", range.min, range.max));
            }
        }

        if !(1..=2).contains(&self.ipv4_left_offset) || !(1..=2).contains(&self.ipv4_right_offset)
        {
            return bad("IPv4 slice offsets must be 1 or 2".into());
        }
        if !(6..=14).contains(&self.ipv6_left_offset) || !(6..=14).contains(&self.ipv6_right_offset)
        {
            return bad("IPv6 slice offsets must be in the [6, 14] interval".into());
        }

        match self.stateful {
            StatefulMode::Stateless => {
                if self.enumerate_ports.active() {
                    return bad("port enumeration requires a stateful test".into());
                }
                if self.enumerate_ips.active() {
                    return bad("IP address enumeration requires a stateful test".into());
                }
            }
            StatefulMode::InitiatorLeft => {
                if self.enumerate_ports.active() && self.num_right_nets > 1 {
                    return bad(
                        "port enumeration works with a single destination network only".into(),
                    );
                }
                if self.ip_left_version != IpVersion::V4 || self.ip_right_version != IpVersion::V4
                {
                    return bad("stateful tests support IPv4 foreground traffic only".into());
                }
            }
            StatefulMode::InitiatorRight => {
                if self.enumerate_ports.active() && self.num_left_nets > 1 {
                    return bad(
                        "port enumeration works with a single destination network only".into(),
                    );
                }
                if self.ip_left_version != IpVersion::V4 || self.ip_right_version != IpVersion::V4
                {
                    return bad("stateful tests support IPv4 foreground traffic only".into());
                }
            }
        }

        if self.ip_varies() && (self.num_left_nets > 1 || self.num_right_nets > 1) {
            return bad("multiple IP addresses work with a single destination network only".into());
        }

        let stateful = self.stateful.is_stateful();
        if stateful
            && self.enumerate_ips.active()
            && self.enumerate_ports.active()
            && self.enumerate_ips != self.enumerate_ports
        {
            return bad("enumerate_ips and enumerate_ports must be equal when both are set".into());
        }
        if stateful
            && self.enumerate_ports.active()
            && self.ip_varies()
            && !self.enumerate_ips.active()
        {
            return bad(
                "port enumeration with multiple IP addresses requires IP enumeration too".into(),
            );
        }
        if stateful
            && self.enumerate_ips.active()
            && (self.fwd_varport() || self.rev_varport())
            && !self.enumerate_ports.active()
        {
            return bad(
                "IP enumeration with multiple port numbers requires port enumeration too".into(),
            );
        }
        if stateful
            && self.enumerate_ips.active()
            && (!self.ip_left_varies.varies() || !self.ip_right_varies.varies())
        {
            return bad(
                "IP enumeration requires ip_left_varies and ip_right_varies to be set".into(),
            );
        }

        if !self.loopback && (self.left_ifname.is_none() || self.right_ifname.is_none()) {
            return bad("left_ifname and right_ifname are required unless loopback is set".into());
        }

        Ok(())
    }

    /// Zero the varied 16-bit slice of each base address, so slice writes
    /// never have to clear stale bits.
    pub fn apply_ip_masks(&mut self) {
        if self.ip_left_varies.varies() {
            mask_v4(&mut self.ipv4_left_real, self.ipv4_left_offset);
            mask_v4(&mut self.ipv4_left_virtual, self.ipv4_left_offset);
            mask_v6(&mut self.ipv6_left_real, self.ipv6_left_offset);
            mask_v6(&mut self.ipv6_left_virtual, self.ipv6_left_offset);
        }
        if self.ip_right_varies.varies() {
            mask_v4(&mut self.ipv4_right_real, self.ipv4_right_offset);
            mask_v4(&mut self.ipv4_right_virtual, self.ipv4_right_offset);
            mask_v6(&mut self.ipv6_right_real, self.ipv6_right_offset);
            mask_v6(&mut self.ipv6_right_virtual, self.ipv6_right_offset);
        }
    }
}

fn mask_v4(addr: &mut Ipv4Addr, offset: usize) {
    let mut octets = addr.octets();
    octets[offset] = 0;
    octets[offset + 1] = 0;
    *addr = Ipv4Addr::from(octets);
}

fn mask_v6(addr: &mut Ipv6Addr, offset: usize) {
    let mut octets = addr.octets();
    octets[offset] = 0;
    octets[offset + 1] = 0;
    *addr = Ipv6Addr::from(octets);
}
