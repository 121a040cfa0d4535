//! The Responder's state table
//!
//! A fixed array of four-tuple slots written by the Responder's receiver and
//! read by the Responder's sender. A tuple is 96 bits, too wide for one
//! atomic, so each slot is a tiny seqlock: the writer brackets its two word
//! stores with an even-odd-even sequence counter, and a reader retries while
//! it observes an odd or changed counter. A reader therefore sees either the
//! old or the new tuple, never a mix.
//!
//! The table is single-producer: only the receiver thread of the current
//! phase writes. Readers may run concurrently during latency-mode
//! measurements, where the receiver keeps recording while the sender reads.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::types::FourTuple;

struct TupleSlot {
    seq: AtomicU32,
    lo: AtomicU64,
    hi: AtomicU64,
}

impl TupleSlot {
    const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            lo: AtomicU64::new(0),
            hi: AtomicU64::new(0),
        }
    }

    #[inline]
    fn store(&self, ft: FourTuple) {
        let (lo, hi) = ft.pack();
        let s = self.seq.load(Ordering::Relaxed);
        self.seq.store(s.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.lo.store(lo, Ordering::Relaxed);
        self.hi.store(hi, Ordering::Relaxed);
        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    #[inline]
    fn load(&self) -> FourTuple {
        loop {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 == 0 {
                let lo = self.lo.load(Ordering::Relaxed);
                let hi = self.hi.load(Ordering::Relaxed);
                fence(Ordering::Acquire);
                if self.seq.load(Ordering::Relaxed) == s1 {
                    return FourTuple::unpack(lo, hi);
                }
            }
            std::hint::spin_loop();
        }
    }
}

pub struct StateTable {
    slots: Box<[TupleSlot]>,
}

impl StateTable {
    pub fn new(size: usize) -> BenchResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(size)
            .map_err(|_| BenchError::AllocationFailed("state table".into()))?;
        for _ in 0..size {
            slots.push(TupleSlot::new());
        }
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record a learned tuple. Single producer per phase.
    #[inline]
    pub fn store(&self, index: usize, ft: FourTuple) {
        self.slots[index].store(ft);
    }

    /// Read a tuple. May run concurrently with `store` on the same slot.
    #[inline]
    #[must_use]
    pub fn load(&self, index: usize) -> FourTuple {
        self.slots[index].load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn store_load_roundtrip() {
        let table = StateTable::new(8).unwrap();
        let ft = FourTuple::new(0xc612_0001, 0xc613_0001, 1024, 80);
        table.store(3, ft);
        assert_eq!(table.load(3), ft);
        assert_eq!(table.load(0), FourTuple::default());
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn overwrite_returns_latest() {
        let table = StateTable::new(1).unwrap();
        for port in 0..100u16 {
            table.store(0, FourTuple::new(1, 2, port, port));
        }
        assert_eq!(table.load(0).init_port, 99);
    }

    #[test]
    fn concurrent_reader_never_sees_torn_tuple() {
        // The writer only ever stores tuples whose four fields agree on a
        // generation number; a torn read would mix generations.
        let table = Arc::new(StateTable::new(4).unwrap());
        let stop = Arc::new(AtomicBool::new(false));

        // Seed every slot so the reader never sees the zeroed initial state.
        for g in 0..4u32 {
            table.store(g as usize, FourTuple::new(g, g ^ 0xffff_ffff, g as u16, !(g as u16)));
        }

        let w_table = table.clone();
        let w_stop = stop.clone();
        let writer = std::thread::spawn(move || {
            let mut gen: u32 = 0;
            while !w_stop.load(Ordering::Relaxed) {
                let g16 = gen as u16;
                let ft = FourTuple::new(gen, gen ^ 0xffff_ffff, g16, !g16);
                w_table.store((gen % 4) as usize, ft);
                gen = gen.wrapping_add(1);
            }
        });

        let mut checked = 0u64;
        while checked < 200_000 {
            for i in 0..4 {
                let ft = table.load(i);
                assert_eq!(ft.resp_addr, ft.init_addr ^ 0xffff_ffff);
                assert_eq!(ft.init_port, ft.init_addr as u16);
                assert_eq!(ft.resp_port, !(ft.init_addr as u16));
                checked += 1;
            }
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }
}
