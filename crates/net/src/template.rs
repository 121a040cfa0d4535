//! Pre-generated frame templates with stable field handles
//!
//! A template is a fully built, checksummed frame plus bounds-checked
//! handles to every field a sender may rewrite: the UDP ports, the varied
//! 16-bit IP address slices, and the two checksums. The uncomplemented
//! one's-complement sums of the original checksum fields are cached at
//! construction, so per-frame updates are a handful of additions.
//!
//! Templates are kept in banks of rotating copies indexed by
//! `(subnet, rotation)`; the rotation leaves every copy untouched for the
//! previous `TEMPLATE_COPIES - 1` sends, long enough for any in-flight DMA
//! read to finish.

use crate::frame::{
    ETHERTYPE_IPV4, ETHERTYPE_OFFSET, V4_CHECKSUM_OFFSET, V4_DPORT_OFFSET, V4_DST_OFFSET,
    V4_HDR_LEN, V4_HDR_OFFSET, V4_SPORT_OFFSET, V4_SRC_OFFSET, V4_UDP_CHECKSUM_OFFSET,
    V6_DPORT_OFFSET, V6_DST_OFFSET, V6_SPORT_OFFSET, V6_SRC_OFFSET, V6_UDP_CHECKSUM_OFFSET,
};
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::types::FourTuple;

/// A bounds-stable handle to a 16-bit field inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    offset: usize,
}

impl Field {
    #[inline]
    #[must_use]
    pub const fn at(offset: usize) -> Self {
        Self { offset }
    }
}

/// Varied IP-slice positions of a template, absolute from frame start.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceOffsets {
    pub src: usize,
    pub dst: usize,
}

#[derive(Debug, Clone)]
pub struct FrameTemplate {
    buf: Vec<u8>,
    is_v4: bool,
    pub sport: Field,
    pub dport: Field,
    pub udp_cksum: Field,
    pub src_slice: Field,
    pub dst_slice: Field,
    ipv4_cksum: Field,
    udp_sum_start: u16,
    ipv4_sum_start: u16,
}

impl FrameTemplate {
    /// Wrap a built frame. `slices` gives the varied IP-slice offsets within
    /// the address fields (ignored unless the sender varies IP slices).
    #[must_use]
    pub fn new(buf: Vec<u8>, slices: SliceOffsets) -> Self {
        let is_v4 =
            u16::from_be_bytes([buf[ETHERTYPE_OFFSET], buf[ETHERTYPE_OFFSET + 1]]) == ETHERTYPE_IPV4;
        let (sport, dport, udp_cksum, src_base, dst_base) = if is_v4 {
            (
                V4_SPORT_OFFSET,
                V4_DPORT_OFFSET,
                V4_UDP_CHECKSUM_OFFSET,
                V4_SRC_OFFSET,
                V4_DST_OFFSET,
            )
        } else {
            (
                V6_SPORT_OFFSET,
                V6_DPORT_OFFSET,
                V6_UDP_CHECKSUM_OFFSET,
                V6_SRC_OFFSET,
                V6_DST_OFFSET,
            )
        };
        let mut t = Self {
            buf,
            is_v4,
            sport: Field::at(sport),
            dport: Field::at(dport),
            udp_cksum: Field::at(udp_cksum),
            src_slice: Field::at(src_base + slices.src),
            dst_slice: Field::at(dst_base + slices.dst),
            ipv4_cksum: Field::at(V4_CHECKSUM_OFFSET),
            udp_sum_start: 0,
            ipv4_sum_start: 0,
        };
        t.udp_sum_start = !t.read_u16(t.udp_cksum);
        if is_v4 {
            t.ipv4_sum_start = !t.read_u16(t.ipv4_cksum);
        }
        t
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    #[must_use]
    pub const fn is_v4(&self) -> bool {
        self.is_v4
    }

    /// Uncomplemented sum of the originally computed UDP checksum.
    #[inline]
    #[must_use]
    pub const fn udp_sum_start(&self) -> u32 {
        self.udp_sum_start as u32
    }

    /// Uncomplemented sum of the originally computed IPv4 header checksum.
    #[inline]
    #[must_use]
    pub const fn ipv4_sum_start(&self) -> u32 {
        self.ipv4_sum_start as u32
    }

    #[inline]
    #[must_use]
    pub fn read_u16(&self, field: Field) -> u16 {
        u16::from_be_bytes([self.buf[field.offset], self.buf[field.offset + 1]])
    }

    /// Write a 16-bit field in network order.
    #[inline]
    pub fn set_u16(&mut self, field: Field, value: u16) {
        self.buf[field.offset..field.offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn set_udp_checksum(&mut self, cksum: u16) {
        let f = self.udp_cksum;
        self.set_u16(f, cksum);
    }

    #[inline]
    pub fn set_ipv4_checksum(&mut self, cksum: u16) {
        let f = self.ipv4_cksum;
        self.set_u16(f, cksum);
    }

    /// Splice a learned four-tuple into an IPv4 foreground template, in the
    /// Responder's sending direction: the tuple's Responder fields become
    /// the source, the Initiator fields the destination.
    #[inline]
    pub fn write_tuple(&mut self, ft: &FourTuple) {
        debug_assert!(self.is_v4);
        self.buf[V4_SRC_OFFSET..V4_SRC_OFFSET + 4].copy_from_slice(&ft.resp_addr.to_be_bytes());
        self.buf[V4_DST_OFFSET..V4_DST_OFFSET + 4].copy_from_slice(&ft.init_addr.to_be_bytes());
        self.buf[V4_SPORT_OFFSET..V4_SPORT_OFFSET + 2]
            .copy_from_slice(&ft.resp_port.to_be_bytes());
        self.buf[V4_DPORT_OFFSET..V4_DPORT_OFFSET + 2]
            .copy_from_slice(&ft.init_port.to_be_bytes());
    }

    /// The 20-byte IPv4 header, for a from-scratch checksum after bulk
    /// address rewrites.
    #[inline]
    #[must_use]
    pub fn ipv4_header(&self) -> &[u8] {
        &self.buf[V4_HDR_OFFSET..V4_HDR_OFFSET + V4_HDR_LEN]
    }
}

/// Rotating copies of one template per destination subnet.
pub struct TemplateBank {
    templates: Vec<FrameTemplate>,
    copies: usize,
}

impl TemplateBank {
    /// Build `subnets * copies` templates; `build(subnet)` produces the raw
    /// frame for one subnet. All copies of a subnet are identical at start.
    pub fn build<F>(subnets: usize, copies: usize, slices: SliceOffsets, build: F) -> BenchResult<Self>
    where
        F: Fn(usize) -> Vec<u8>,
    {
        let mut templates = Vec::new();
        templates
            .try_reserve_exact(subnets * copies)
            .map_err(|_| BenchError::AllocationFailed("frame template bank".into()))?;
        for subnet in 0..subnets {
            let template = FrameTemplate::new(build(subnet), slices);
            for _ in 0..copies {
                templates.push(template.clone());
            }
        }
        Ok(Self { templates, copies })
    }

    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, subnet: usize, rotation: usize) -> &mut FrameTemplate {
        &mut self.templates[subnet * self.copies + rotation % self.copies]
    }

    #[inline]
    #[must_use]
    pub fn copies(&self) -> usize {
        self.copies
    }
}
