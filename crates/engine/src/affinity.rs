//! CPU pinning for the worker threads
//!
//! Every sender and receiver runs pinned to its configured core; the
//! orchestrator only joins. Pinning failure is reported but does not abort:
//! the run degrades the same way a NUMA mismatch does.

use tracing::warn;

/// Pin the calling thread to `core`.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        let res = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if res != 0 {
            warn!(core, "could not pin thread to core, scheduling is up to the OS");
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(core: usize) {
    warn!(core, "CPU pinning is not supported on this platform");
}

/// Core the calling thread currently runs on (best effort).
#[cfg(target_os = "linux")]
#[must_use]
pub fn current_core() -> usize {
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        0
    } else {
        cpu as usize
    }
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_core() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_sticks_on_linux() {
        let core = current_core();
        pin_to_core(core);
        #[cfg(target_os = "linux")]
        assert_eq!(current_core(), core);
    }
}
