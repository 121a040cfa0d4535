//! Counting receiver
//!
//! Polls its RX queue in bursts until the receive deadline, counts the
//! frames that carry the test tag, and silently drops everything else. With
//! a latency tap attached it also timestamps recognized probes; a probe id
//! outside the timestamp vector is fatal, it would index out of bounds.

use crate::clock::Timebase;
use tracing::info;
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::types::Direction;
use xlatbench_net::frame::{classify, FrameKind};
use xlatbench_net::port::{RecvFrame, RxQueue};

/// Receive timestamps indexed by probe id; zero means "lost probe".
pub struct LatencyTap {
    receive_ts: Vec<u64>,
}

impl LatencyTap {
    #[must_use]
    pub fn new(num_timestamps: u16) -> Self {
        Self {
            receive_ts: vec![0; num_timestamps as usize],
        }
    }

    /// Store a probe arrival. Fails on an out-of-range id.
    #[inline]
    pub fn record(&mut self, id: u16, now: u64) -> BenchResult<()> {
        let limit = self.receive_ts.len() as u16;
        let slot = self
            .receive_ts
            .get_mut(id as usize)
            .ok_or(BenchError::MalformedProbe { id, limit })?;
        *slot = now;
        Ok(())
    }

    #[must_use]
    pub fn into_receive_ts(self) -> Vec<u64> {
        self.receive_ts
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverReport {
    pub received: u64,
    pub receive_ts: Option<Vec<u64>>,
}

/// The plain counting receiver of a direction.
pub struct Receiver {
    pub tb: Timebase,
    /// Counter deadline: measurement end plus the global timeout.
    pub finish_at: u64,
    pub direction: Direction,
    pub latency: Option<LatencyTap>,
}

impl Receiver {
    pub fn run(mut self, rx: &mut dyn RxQueue) -> BenchResult<ReceiverReport> {
        let mut burst: Vec<RecvFrame> = RecvFrame::burst();
        let mut received: u64 = 0;

        while self.tb.now() < self.finish_at {
            let frames = rx.recv_burst(&mut burst);
            for f in &burst[..frames] {
                match classify(f.bytes()) {
                    FrameKind::TestV4 | FrameKind::TestV6 => received += 1,
                    FrameKind::ProbeV4(id) | FrameKind::ProbeV6(id) => {
                        let now = self.tb.now(); // timestamp before any bookkeeping
                        match &mut self.latency {
                            Some(tap) => tap.record(id, now)?,
                            None => continue, // stray probe outside a latency run
                        }
                        received += 1;
                    }
                    FrameKind::Other => {}
                }
            }
        }
        info!("{} frames received: {}", self.direction.label(), received);
        Ok(ReceiverReport {
            received,
            receive_ts: self.latency.map(LatencyTap::into_receive_ts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use xlatbench_common::types::MacAddr;
    use xlatbench_net::frame;
    use xlatbench_net::port::{mem, TxQueue};

    const DST: MacAddr = MacAddr([2, 0, 0, 0, 0, 0x11]);
    const SRC: MacAddr = MacAddr([2, 0, 0, 0, 0, 0x01]);

    fn v4_frame() -> Vec<u8> {
        frame::build_test_frame_v4(
            64,
            DST,
            SRC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            false,
            false,
        )
    }

    fn run_receiver(
        frames: Vec<Vec<u8>>,
        latency: Option<LatencyTap>,
    ) -> BenchResult<ReceiverReport> {
        let tb = Timebase::init();
        let (mut tx, mut rx) = mem::link(4096);
        for f in &frames {
            assert!(tx.try_transmit(f));
        }
        let receiver = Receiver {
            tb,
            finish_at: tb.now() + tb.ms_to_ticks(50),
            direction: Direction::Forward,
            latency,
        };
        receiver.run(&mut rx)
    }

    #[test]
    fn counts_tagged_frames_only() {
        let mut noise = v4_frame();
        noise[frame::V4_PAYLOAD_OFFSET] = b'X'; // breaks the tag
        let mut tcp = v4_frame();
        tcp[frame::V4_PROTO_OFFSET] = 6;
        let report =
            run_receiver(vec![v4_frame(), noise, v4_frame(), tcp], None).unwrap();
        assert_eq!(report.received, 2);
    }

    #[test]
    fn probe_timestamps_land_by_id() {
        let probe = |id| {
            frame::build_latency_frame_v4(
                64,
                DST,
                SRC,
                Ipv4Addr::new(198, 18, 0, 1),
                Ipv4Addr::new(198, 19, 0, 1),
                false,
                false,
                id,
            )
        };
        let report = run_receiver(
            vec![probe(0), v4_frame(), probe(3)],
            Some(LatencyTap::new(5)),
        )
        .unwrap();
        assert_eq!(report.received, 3);
        let ts = report.receive_ts.unwrap();
        assert!(ts[0] > 0);
        assert_eq!(ts[1], 0);
        assert_eq!(ts[2], 0);
        assert!(ts[3] > 0);
        assert_eq!(ts[4], 0);
    }

    #[test]
    fn out_of_range_probe_id_is_fatal() {
        let probe = frame::build_latency_frame_v4(
            64,
            DST,
            SRC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            false,
            false,
            500,
        );
        let err = run_receiver(vec![probe], Some(LatencyTap::new(500))).unwrap_err();
        assert!(matches!(err, BenchError::MalformedProbe { id: 500, .. }));
    }

    #[test]
    fn stray_probe_without_tap_is_dropped() {
        let probe = frame::build_latency_frame_v4(
            64,
            DST,
            SRC,
            Ipv4Addr::new(198, 18, 0, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            false,
            false,
            9999,
        );
        let report = run_receiver(vec![probe], None).unwrap();
        assert_eq!(report.received, 0);
    }
}
