//! Per-frame sequences for varying 16-bit header fields
//!
//! RFC 4814 asks for pseudorandom port numbers; increasing and decreasing
//! sequences are cheaper non-standard additions. A sequence yields the value
//! to put on the wire and keeps its own state, including the random
//! generator, so each worker owns its randomness.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use xlatbench_common::types::{PortRange, VarMode};

pub enum FieldSequence {
    Increment { next: u16, range: PortRange },
    Decrement { next: u16, range: PortRange },
    Random { range: PortRange, rng: SmallRng },
}

impl FieldSequence {
    /// `None` when the field is fixed and never rewritten.
    #[must_use]
    pub fn from_mode(mode: VarMode, range: PortRange) -> Option<Self> {
        match mode {
            VarMode::Fixed => None,
            VarMode::Increase => Some(FieldSequence::Increment {
                next: range.min,
                range,
            }),
            VarMode::Decrease => Some(FieldSequence::Decrement {
                next: range.max,
                range,
            }),
            VarMode::Random => Some(FieldSequence::Random {
                range,
                rng: SmallRng::from_entropy(),
            }),
        }
    }

    /// The value for the next frame. Counters wrap at the range ends.
    #[inline]
    pub fn next(&mut self) -> u16 {
        match self {
            FieldSequence::Increment { next, range } => {
                let v = *next;
                *next = if v == range.max { range.min } else { v + 1 };
                v
            }
            FieldSequence::Decrement { next, range } => {
                let v = *next;
                *next = if v == range.min { range.max } else { v - 1 };
                v
            }
            FieldSequence::Random { range, rng } => rng.gen_range(range.min..=range.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_yields_no_sequence() {
        assert!(FieldSequence::from_mode(VarMode::Fixed, PortRange::new(1, 2)).is_none());
    }

    #[test]
    fn increment_wraps_at_max() {
        let mut s =
            FieldSequence::from_mode(VarMode::Increase, PortRange::new(1024, 1026)).unwrap();
        let got: Vec<u16> = (0..6).map(|_| s.next()).collect();
        assert_eq!(got, vec![1024, 1025, 1026, 1024, 1025, 1026]);
    }

    #[test]
    fn decrement_wraps_at_min() {
        let mut s =
            FieldSequence::from_mode(VarMode::Decrease, PortRange::new(1024, 1026)).unwrap();
        let got: Vec<u16> = (0..5).map(|_| s.next()).collect();
        assert_eq!(got, vec![1026, 1025, 1024, 1026, 1025]);
    }

    #[test]
    fn full_range_counter_wraps() {
        let mut s = FieldSequence::from_mode(VarMode::Increase, PortRange::new(0, 65535)).unwrap();
        for _ in 0..65536 {
            s.next();
        }
        assert_eq!(s.next(), 0);
    }

    #[test]
    fn random_stays_in_range() {
        let range = PortRange::new(1, 49151);
        let mut s = FieldSequence::from_mode(VarMode::Random, range).unwrap();
        for _ in 0..10_000 {
            assert!(range.contains(s.next()));
        }
    }

    #[test]
    fn random_covers_small_range() {
        let range = PortRange::new(10, 13);
        let mut s = FieldSequence::from_mode(VarMode::Random, range).unwrap();
        let mut seen = [false; 4];
        for _ in 0..1000 {
            seen[(s.next() - 10) as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }
}
