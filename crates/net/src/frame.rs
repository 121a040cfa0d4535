//! Test frame construction and classification
//!
//! Frames follow the Test Frame format of RFC 2544 appendix C.2.6.4:
//! Ethernet II, IPv4 or IPv6, UDP, and a payload that starts with an 8-byte
//! ASCII tag. Ordinary frames carry `IDENTIFY`; latency probes carry
//! `Identify` plus a 16-bit probe id at payload offset 8. The given frame
//! length includes the 4-byte FCS the NIC appends, so `length - 4` bytes
//! are built.

use crate::checksum;
use xlatbench_common::types::{MacAddr, ETHER_CRC_LEN};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

/// Source port of RFC 2544 test frames when ports are fixed.
pub const RFC2544_SPORT: u16 = 0xC020;
/// Destination port of RFC 2544 test frames when ports are fixed.
pub const RFC2544_DPORT: u16 = 0x0007;

pub const TEST_TAG: [u8; 8] = *b"IDENTIFY";
pub const PROBE_TAG: [u8; 8] = *b"Identify";

// Byte offsets from the start of the Ethernet frame.
pub const ETHERTYPE_OFFSET: usize = 12;
pub const ETH_HDR_LEN: usize = 14;
pub const V4_HDR_OFFSET: usize = 14;
pub const V4_HDR_LEN: usize = 20;
pub const V4_PROTO_OFFSET: usize = 23;
pub const V4_CHECKSUM_OFFSET: usize = 24;
pub const V4_SRC_OFFSET: usize = 26;
pub const V4_DST_OFFSET: usize = 30;
pub const V4_SPORT_OFFSET: usize = 34;
pub const V4_DPORT_OFFSET: usize = 36;
pub const V4_UDP_CHECKSUM_OFFSET: usize = 40;
pub const V4_PAYLOAD_OFFSET: usize = 42;
pub const V4_PROBE_ID_OFFSET: usize = 50;
pub const V6_HDR_LEN: usize = 40;
pub const V6_NEXT_HEADER_OFFSET: usize = 20;
pub const V6_SRC_OFFSET: usize = 22;
pub const V6_DST_OFFSET: usize = 38;
pub const V6_SPORT_OFFSET: usize = 54;
pub const V6_DPORT_OFFSET: usize = 56;
pub const V6_UDP_CHECKSUM_OFFSET: usize = 60;
pub const V6_PAYLOAD_OFFSET: usize = 62;
pub const V6_PROBE_ID_OFFSET: usize = 70;

const UDP_HDR_LEN: usize = 8;

fn eth_header(buf: &mut [u8], dst_mac: MacAddr, src_mac: MacAddr, ether_type: u16) {
    buf[0..6].copy_from_slice(&dst_mac.octets());
    buf[6..12].copy_from_slice(&src_mac.octets());
    buf[12..14].copy_from_slice(&ether_type.to_be_bytes());
}

fn ipv4_header(buf: &mut [u8], total_length: u16, src: Ipv4Addr, dst: Ipv4Addr) {
    buf[0] = 0x45; // Version 4, IHL 5
    buf[1] = 0x00; // DSCP/ECN
    buf[2..4].copy_from_slice(&total_length.to_be_bytes());
    buf[4..6].copy_from_slice(&[0, 0]); // ID
    buf[6..8].copy_from_slice(&[0, 0]); // no flags, no fragment offset
    buf[8] = 0x0A; // TTL
    buf[9] = 17; // protocol: UDP
    buf[10..12].copy_from_slice(&[0, 0]); // checksum placeholder
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
    // The header checksum is set only after the UDP checksum is computed.
}

fn ipv6_header(buf: &mut [u8], payload_length: u16, src: Ipv6Addr, dst: Ipv6Addr) {
    buf[0..4].copy_from_slice(&0x6000_0000u32.to_be_bytes()); // version 6, TC 0, flow 0
    buf[4..6].copy_from_slice(&payload_length.to_be_bytes());
    buf[6] = 17; // next header: UDP
    buf[7] = 0x0A; // hop limit
    buf[8..24].copy_from_slice(&src.octets());
    buf[24..40].copy_from_slice(&dst.octets());
}

fn udp_header(buf: &mut [u8], length: u16, sport: u16, dport: u16) {
    buf[0..2].copy_from_slice(&sport.to_be_bytes());
    buf[2..4].copy_from_slice(&dport.to_be_bytes());
    buf[4..6].copy_from_slice(&length.to_be_bytes());
    buf[6..8].copy_from_slice(&[0, 0]); // checksum placeholder
}

fn payload(buf: &mut [u8], tag: [u8; 8], probe_id: Option<u16>) {
    buf[0..8].copy_from_slice(&tag);
    let rest = match probe_id {
        Some(id) => {
            buf[8..10].copy_from_slice(&id.to_le_bytes());
            &mut buf[10..]
        }
        None => &mut buf[8..],
    };
    for (i, b) in rest.iter_mut().enumerate() {
        *b = i as u8;
    }
}

fn build_v4(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    sport: u16,
    dport: u16,
    tag: [u8; 8],
    probe_id: Option<u16>,
) -> Vec<u8> {
    let wire_len = (length - ETHER_CRC_LEN) as usize;
    let mut buf = vec![0u8; wire_len];
    eth_header(&mut buf, dst_mac, src_mac, ETHERTYPE_IPV4);
    let ip_length = (wire_len - ETH_HDR_LEN) as u16;
    ipv4_header(&mut buf[V4_HDR_OFFSET..], ip_length, src_ip, dst_ip);
    let udp_length = ip_length - V4_HDR_LEN as u16;
    udp_header(
        &mut buf[V4_HDR_OFFSET + V4_HDR_LEN..],
        udp_length,
        sport,
        dport,
    );
    payload(&mut buf[V4_PAYLOAD_OFFSET..], tag, probe_id);
    let mut udp_cksum = checksum::udp_checksum_v4(
        src_ip.octets(),
        dst_ip.octets(),
        &buf[V4_SPORT_OFFSET..],
    );
    if udp_cksum == 0 {
        udp_cksum = 0xffff; // 0 means "no checksum" in UDP over IPv4
    }
    buf[V4_UDP_CHECKSUM_OFFSET..V4_UDP_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&udp_cksum.to_be_bytes());
    let hdr_cksum =
        checksum::ipv4_header_checksum(&buf[V4_HDR_OFFSET..V4_HDR_OFFSET + V4_HDR_LEN]);
    buf[V4_CHECKSUM_OFFSET..V4_CHECKSUM_OFFSET + 2].copy_from_slice(&hdr_cksum.to_be_bytes());
    buf
}

fn build_v6(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    sport: u16,
    dport: u16,
    tag: [u8; 8],
    probe_id: Option<u16>,
) -> Vec<u8> {
    let wire_len = (length - ETHER_CRC_LEN) as usize;
    let mut buf = vec![0u8; wire_len];
    eth_header(&mut buf, dst_mac, src_mac, ETHERTYPE_IPV6);
    let ip_length = (wire_len - ETH_HDR_LEN) as u16;
    ipv6_header(
        &mut buf[ETH_HDR_LEN..],
        ip_length - V6_HDR_LEN as u16,
        src_ip,
        dst_ip,
    );
    let udp_length = ip_length - V6_HDR_LEN as u16;
    udp_header(
        &mut buf[ETH_HDR_LEN + V6_HDR_LEN..],
        udp_length,
        sport,
        dport,
    );
    payload(&mut buf[V6_PAYLOAD_OFFSET..], tag, probe_id);
    let udp_cksum = checksum::udp_checksum_v6(
        src_ip.octets(),
        dst_ip.octets(),
        &buf[V6_SPORT_OFFSET..],
    );
    buf[V6_UDP_CHECKSUM_OFFSET..V6_UDP_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&udp_cksum.to_be_bytes());
    buf
}

/// Port value for a field of a pre-generated template: fields that will vary
/// start at zero so a later 16-bit write is a pure checksum addition.
#[inline]
#[must_use]
pub const fn template_port(varies: bool, fixed: u16) -> u16 {
    if varies {
        0
    } else {
        fixed
    }
}

/// Build an IPv4 Test Frame. `length` includes the FCS.
#[must_use]
pub fn build_test_frame_v4(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    var_sport: bool,
    var_dport: bool,
) -> Vec<u8> {
    build_v4(
        length,
        dst_mac,
        src_mac,
        src_ip,
        dst_ip,
        template_port(var_sport, RFC2544_SPORT),
        template_port(var_dport, RFC2544_DPORT),
        TEST_TAG,
        None,
    )
}

/// Build an IPv6 Test Frame. `length` includes the FCS.
#[must_use]
pub fn build_test_frame_v6(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    var_sport: bool,
    var_dport: bool,
) -> Vec<u8> {
    build_v6(
        length,
        dst_mac,
        src_mac,
        src_ip,
        dst_ip,
        template_port(var_sport, RFC2544_SPORT),
        template_port(var_dport, RFC2544_DPORT),
        TEST_TAG,
        None,
    )
}

/// Build an IPv4 latency probe carrying `id` at payload offset 8.
#[must_use]
pub fn build_latency_frame_v4(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    var_sport: bool,
    var_dport: bool,
    id: u16,
) -> Vec<u8> {
    build_v4(
        length,
        dst_mac,
        src_mac,
        src_ip,
        dst_ip,
        template_port(var_sport, RFC2544_SPORT),
        template_port(var_dport, RFC2544_DPORT),
        PROBE_TAG,
        Some(id),
    )
}

/// Build an IPv6 latency probe carrying `id` at payload offset 8.
#[must_use]
pub fn build_latency_frame_v6(
    length: u16,
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    var_sport: bool,
    var_dport: bool,
    id: u16,
) -> Vec<u8> {
    build_v6(
        length,
        dst_mac,
        src_mac,
        src_ip,
        dst_ip,
        template_port(var_sport, RFC2544_SPORT),
        template_port(var_dport, RFC2544_DPORT),
        PROBE_TAG,
        Some(id),
    )
}

/// What a received frame turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// IPv4 UDP frame tagged `IDENTIFY`.
    TestV4,
    /// IPv6 UDP frame tagged `IDENTIFY`.
    TestV6,
    /// IPv4 latency probe with its id.
    ProbeV4(u16),
    /// IPv6 latency probe with its id.
    ProbeV6(u16),
    /// Anything else; silently dropped by the receivers.
    Other,
}

/// Classify a received frame by EtherType, protocol and payload tag.
#[inline]
#[must_use]
pub fn classify(frame: &[u8]) -> FrameKind {
    if frame.len() < V4_PAYLOAD_OFFSET + 10 {
        return FrameKind::Other;
    }
    let ether_type = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    match ether_type {
        ETHERTYPE_IPV6 if frame.len() >= V6_PAYLOAD_OFFSET + 10 => {
            if frame[V6_NEXT_HEADER_OFFSET] != 17 {
                return FrameKind::Other;
            }
            let tag = &frame[V6_PAYLOAD_OFFSET..V6_PAYLOAD_OFFSET + 8];
            if tag == TEST_TAG {
                FrameKind::TestV6
            } else if tag == PROBE_TAG {
                FrameKind::ProbeV6(u16::from_le_bytes([
                    frame[V6_PROBE_ID_OFFSET],
                    frame[V6_PROBE_ID_OFFSET + 1],
                ]))
            } else {
                FrameKind::Other
            }
        }
        ETHERTYPE_IPV4 => {
            if frame[V4_PROTO_OFFSET] != 17 {
                return FrameKind::Other;
            }
            let tag = &frame[V4_PAYLOAD_OFFSET..V4_PAYLOAD_OFFSET + 8];
            if tag == TEST_TAG {
                FrameKind::TestV4
            } else if tag == PROBE_TAG {
                FrameKind::ProbeV4(u16::from_le_bytes([
                    frame[V4_PROBE_ID_OFFSET],
                    frame[V4_PROBE_ID_OFFSET + 1],
                ]))
            } else {
                FrameKind::Other
            }
        }
        _ => FrameKind::Other,
    }
}

/// Read the four-tuple of an IPv4 foreground frame as the Responder learns
/// it: source address/port are the Initiator's, destination the Responder's.
#[inline]
#[must_use]
pub fn read_four_tuple(frame: &[u8]) -> xlatbench_common::FourTuple {
    let be32 = |at: usize| {
        u32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
    };
    xlatbench_common::FourTuple {
        init_addr: be32(V4_SRC_OFFSET),
        resp_addr: be32(V4_DST_OFFSET),
        init_port: u16::from_be_bytes([frame[V4_SPORT_OFFSET], frame[V4_SPORT_OFFSET + 1]]),
        resp_port: u16::from_be_bytes([frame[V4_DPORT_OFFSET], frame[V4_DPORT_OFFSET + 1]]),
    }
}

/// Verify both checksums of a built frame from scratch. Test support.
#[must_use]
pub fn checksums_valid(frame: &[u8]) -> bool {
    let ether_type = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    match ether_type {
        ETHERTYPE_IPV4 => {
            let header = &frame[V4_HDR_OFFSET..V4_HDR_OFFSET + V4_HDR_LEN];
            let stored_hdr = u16::from_be_bytes([frame[V4_CHECKSUM_OFFSET], frame[V4_CHECKSUM_OFFSET + 1]]);
            if checksum::ipv4_header_checksum(header) != stored_hdr {
                return false;
            }
            let src: [u8; 4] = frame[V4_SRC_OFFSET..V4_SRC_OFFSET + 4].try_into().unwrap();
            let dst: [u8; 4] = frame[V4_DST_OFFSET..V4_DST_OFFSET + 4].try_into().unwrap();
            let mut udp = frame[V4_SPORT_OFFSET..].to_vec();
            let stored = u16::from_be_bytes([udp[6], udp[7]]);
            udp[6] = 0;
            udp[7] = 0;
            let mut computed = checksum::udp_checksum_v4(src, dst, &udp);
            if computed == 0 {
                computed = 0xffff;
            }
            computed == stored
        }
        ETHERTYPE_IPV6 => {
            let src: [u8; 16] = frame[V6_SRC_OFFSET..V6_SRC_OFFSET + 16].try_into().unwrap();
            let dst: [u8; 16] = frame[V6_DST_OFFSET..V6_DST_OFFSET + 16].try_into().unwrap();
            let mut udp = frame[V6_SPORT_OFFSET..].to_vec();
            let stored = u16::from_be_bytes([udp[6], udp[7]]);
            udp[6] = 0;
            udp[7] = 0;
            checksum::udp_checksum_v6(src, dst, &udp) == stored
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x11]);
    const SRC_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);

    fn v4_frame() -> Vec<u8> {
        build_test_frame_v4(
            64,
            DST_MAC,
            SRC_MAC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            false,
            false,
        )
    }

    fn v6_frame() -> Vec<u8> {
        build_test_frame_v6(
            84,
            DST_MAC,
            SRC_MAC,
            "2001:2::1".parse().unwrap(),
            "2001:2::2".parse().unwrap(),
            false,
            false,
        )
    }

    #[test]
    fn v4_layout() {
        let f = v4_frame();
        assert_eq!(f.len(), 60); // FCS excluded
        assert_eq!(&f[0..6], &DST_MAC.octets());
        assert_eq!(&f[6..12], &SRC_MAC.octets());
        assert_eq!(u16::from_be_bytes([f[12], f[13]]), ETHERTYPE_IPV4);
        assert_eq!(f[14], 0x45);
        assert_eq!(f[22], 0x0A); // TTL
        assert_eq!(f[V4_PROTO_OFFSET], 17);
        assert_eq!(
            u16::from_be_bytes([f[V4_SPORT_OFFSET], f[V4_SPORT_OFFSET + 1]]),
            RFC2544_SPORT
        );
        assert_eq!(
            u16::from_be_bytes([f[V4_DPORT_OFFSET], f[V4_DPORT_OFFSET + 1]]),
            RFC2544_DPORT
        );
        assert_eq!(&f[V4_PAYLOAD_OFFSET..V4_PAYLOAD_OFFSET + 8], &TEST_TAG);
        // i mod 256 fill after the tag
        assert_eq!(f[V4_PAYLOAD_OFFSET + 8], 0);
        assert_eq!(f[V4_PAYLOAD_OFFSET + 9], 1);
    }

    #[test]
    fn v6_layout() {
        let f = v6_frame();
        assert_eq!(f.len(), 80);
        assert_eq!(u16::from_be_bytes([f[12], f[13]]), ETHERTYPE_IPV6);
        assert_eq!(f[14] >> 4, 6);
        assert_eq!(f[V6_NEXT_HEADER_OFFSET], 17);
        assert_eq!(f[21], 0x0A); // hop limit
        assert_eq!(&f[V6_PAYLOAD_OFFSET..V6_PAYLOAD_OFFSET + 8], &TEST_TAG);
        // IPv6 payload length covers UDP header + data
        let payload_len = u16::from_be_bytes([f[18], f[19]]);
        assert_eq!(payload_len as usize, f.len() - ETH_HDR_LEN - V6_HDR_LEN);
    }

    #[test]
    fn variable_ports_start_at_zero() {
        let f = build_test_frame_v4(
            64,
            DST_MAC,
            SRC_MAC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            true,
            false,
        );
        assert_eq!(u16::from_be_bytes([f[V4_SPORT_OFFSET], f[V4_SPORT_OFFSET + 1]]), 0);
        assert_eq!(
            u16::from_be_bytes([f[V4_DPORT_OFFSET], f[V4_DPORT_OFFSET + 1]]),
            RFC2544_DPORT
        );
    }

    #[test]
    fn built_checksums_verify() {
        assert!(checksums_valid(&v4_frame()));
        assert!(checksums_valid(&v6_frame()));
        let probe = build_latency_frame_v6(
            84,
            DST_MAC,
            SRC_MAC,
            "2001:2::1".parse().unwrap(),
            "2001:2::2".parse().unwrap(),
            false,
            false,
            499,
        );
        assert!(checksums_valid(&probe));
    }

    #[test]
    fn corrupted_checksum_detected() {
        let mut f = v4_frame();
        f[V4_UDP_CHECKSUM_OFFSET] ^= 0xff;
        assert!(!checksums_valid(&f));
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&v4_frame()), FrameKind::TestV4);
        assert_eq!(classify(&v6_frame()), FrameKind::TestV6);
        let probe = build_latency_frame_v4(
            64,
            DST_MAC,
            SRC_MAC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            false,
            false,
            321,
        );
        assert_eq!(classify(&probe), FrameKind::ProbeV4(321));
        let probe6 = build_latency_frame_v6(
            84,
            DST_MAC,
            SRC_MAC,
            "2001:2::1".parse().unwrap(),
            "2001:2::2".parse().unwrap(),
            false,
            false,
            42,
        );
        assert_eq!(classify(&probe6), FrameKind::ProbeV6(42));
        // Non-UDP and foreign frames fall through.
        let mut arp = v4_frame();
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert_eq!(classify(&arp), FrameKind::Other);
        let mut tcp = v4_frame();
        tcp[V4_PROTO_OFFSET] = 6;
        assert_eq!(classify(&tcp), FrameKind::Other);
    }

    #[test]
    fn four_tuple_read_matches_header_fields() {
        let f = v4_frame();
        let ft = read_four_tuple(&f);
        assert_eq!(ft.init_addr, u32::from(Ipv4Addr::new(198, 18, 0, 1)));
        assert_eq!(ft.resp_addr, u32::from(Ipv4Addr::new(198, 19, 0, 1)));
        assert_eq!(ft.init_port, RFC2544_SPORT);
        assert_eq!(ft.resp_port, RFC2544_DPORT);
    }
}
