//! Deadline arithmetic for a test run
//!
//! All workers share one clock; the orchestrator fixes the start timestamp
//! a start-delay ahead of "now" so every worker is in position before the
//! first frame is due. Receivers keep polling for the global timeout past
//! the nominal end to catch tail traffic.

use xlatbench_engine::Timebase;
use xlatbench_common::params::TestParams;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// First frame of the measurement is due here.
    pub start: u64,
    /// Measurement receivers return unconditionally here.
    pub finish_receiving: u64,
    /// First preliminary frame (stateful only; equals `start` otherwise).
    pub start_pre: u64,
    /// Preliminary receiver deadline (stateful only).
    pub finish_receiving_pre: u64,
}

impl Schedule {
    pub fn compute(tb: &Timebase, params: &TestParams, start_delay_ms: u64) -> Self {
        let hz = tb.hz();
        let now = tb.now();
        let timeout_ticks = tb.ms_to_ticks(params.global_timeout as u64);
        match &params.stateful {
            None => {
                let start = now + tb.ms_to_ticks(start_delay_ms);
                let finish_receiving = start + hz * params.duration as u64 + timeout_ticks;
                Self {
                    start,
                    finish_receiving,
                    start_pre: start,
                    finish_receiving_pre: start,
                }
            }
            Some(s) => {
                let start_pre = now + tb.ms_to_ticks(start_delay_ms);
                let finish_receiving_pre = start_pre
                    + (s.pre_frames as u128 * hz as u128 / s.pre_rate as u128) as u64
                    + tb.ms_to_ticks(s.pre_timeout as u64);
                let start = start_pre + tb.ms_to_ticks(s.pre_delay as u64);
                let finish_receiving = start + hz * params.duration as u64 + timeout_ticks;
                Self {
                    start,
                    finish_receiving,
                    start_pre,
                    finish_receiving_pre,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlatbench_common::params::StatefulParams;

    #[test]
    fn stateless_schedule() {
        let tb = Timebase::init();
        let params = TestParams::new(84, 1000, 5, 2000, 2, 1);
        let before = tb.now();
        let s = Schedule::compute(&tb, &params, 100);
        assert!(s.start >= before + tb.ms_to_ticks(100));
        assert_eq!(
            s.finish_receiving,
            s.start + 5 * tb.hz() + tb.ms_to_ticks(2000)
        );
    }

    #[test]
    fn stateful_schedule_orders_phases() {
        let tb = Timebase::init();
        let params = TestParams::new(84, 1000, 2, 100, 2, 2).with_stateful(StatefulParams {
            pre_frames: 1000,
            state_table_size: 1000,
            pre_rate: 10_000,
            pre_timeout: 100,
            pre_delay: 500,
        });
        let s = Schedule::compute(&tb, &params, 50);
        // Sending 1000 frames at 10 kfps takes 100 ms, plus the 100 ms
        // preliminary timeout.
        assert_eq!(
            s.finish_receiving_pre,
            s.start_pre + tb.ms_to_ticks(100) + tb.ms_to_ticks(100)
        );
        assert_eq!(s.start, s.start_pre + tb.ms_to_ticks(500));
        assert!(s.finish_receiving_pre <= s.start);
        assert_eq!(
            s.finish_receiving,
            s.start + 2 * tb.hz() + tb.ms_to_ticks(100)
        );
    }
}
