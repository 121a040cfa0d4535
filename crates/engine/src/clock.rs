//! Timebase of the tester: a per-process cycle counter
//!
//! Pacing needs sub-microsecond granularity at multi-Mfps rates, so sleeping
//! is out of the question. On x86_64 the TSC is read directly; elsewhere a
//! monotonic nanosecond clock anchored at startup stands in (the OS
//! guarantees its inter-core monotonicity, which is all the arithmetic
//! needs). `check_sync` verifies that a worker core's reading falls between
//! two readings taken on the calling core, the precondition for comparing
//! send and receive timestamps taken on different cores.

use crate::affinity;
use std::time::Instant;
use xlatbench_common::error::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy)]
pub struct Timebase {
    hz: u64,
    anchor: Instant,
}

impl Timebase {
    /// Calibrate the counter frequency once at startup.
    #[must_use]
    pub fn init() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            let anchor = Instant::now();
            let c0 = rdtsc();
            std::thread::sleep(std::time::Duration::from_millis(20));
            let c1 = rdtsc();
            let elapsed = anchor.elapsed();
            let hz = ((c1 - c0) as u128 * 1_000_000_000 / elapsed.as_nanos()) as u64;
            Self { hz, anchor }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self {
                hz: 1_000_000_000,
                anchor: Instant::now(),
            }
        }
    }

    /// Counter ticks per second.
    #[inline]
    #[must_use]
    pub const fn hz(&self) -> u64 {
        self.hz
    }

    /// Current counter value.
    #[inline]
    #[must_use]
    pub fn now(&self) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            rdtsc()
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            self.anchor.elapsed().as_nanos() as u64
        }
    }

    #[inline]
    #[must_use]
    pub const fn ms_to_ticks(&self, ms: u64) -> u64 {
        self.hz / 1000 * ms + self.hz % 1000 * ms / 1000
    }

    #[inline]
    #[must_use]
    pub fn ticks_to_secs(&self, ticks: u64) -> f64 {
        ticks as f64 / self.hz as f64
    }

    /// The counter value at which frame `k` of a run at `rate` fps is due.
    #[inline]
    #[must_use]
    pub fn due(&self, start: u64, k: u64, rate: u32) -> u64 {
        start + (k as u128 * self.hz as u128 / rate as u128) as u64
    }

    /// Busy-wait until the counter reaches `deadline`.
    #[inline]
    pub fn wait_until(&self, deadline: u64) {
        while self.now() < deadline {
            std::hint::spin_loop();
        }
    }

    /// Verify that `core`'s counter is usable together with this core's:
    /// a reading taken there must fall between two readings taken here.
    pub fn check_sync(&self, core: usize) -> BenchResult<()> {
        let tb = *self;
        let before = self.now();
        let handle = std::thread::Builder::new()
            .name(format!("tsc-check-{core}"))
            .spawn(move || {
                affinity::pin_to_core(core);
                tb.now()
            })
            .map_err(BenchError::Io)?;
        let reported = handle
            .join()
            .map_err(|_| BenchError::WorkerPanic(format!("tsc-check-{core}")))?;
        let after = self.now();
        if reported < before || reported > after {
            return Err(BenchError::ClockDesync {
                local: affinity::current_core(),
                remote: core,
            });
        }
        Ok(())
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn rdtsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}
