//! Pre-generated unique field combinations
//!
//! When the preliminary phase must give every foreground frame a distinct
//! four-tuple, the combinations are enumerated up front and shuffled with
//! the inside-out variant of the Fisher-Yates algorithm: elements are
//! generated straight into their permuted position, no exchange pass needed.
//! The consumer walks the array with a cursor and never rereads an element.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use xlatbench_common::error::{BenchError, BenchResult};
use xlatbench_common::types::PortRange;

/// One unique (source, destination) 16-bit field pair: either two UDP ports
/// or two IP address slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairCombo {
    pub src: u16,
    pub dst: u16,
}

/// One unique (source IP slice, destination IP slice, sport, dport)
/// combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadCombo {
    pub sip: u16,
    pub dip: u16,
    pub sport: u16,
    pub dport: u16,
}

fn reserve<T>(len: u64, what: &str) -> BenchResult<Vec<T>> {
    let len = usize::try_from(len)
        .map_err(|_| BenchError::AllocationFailed(what.to_string()))?;
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| BenchError::AllocationFailed(what.to_string()))?;
    Ok(v)
}

/// Every (src, dst) combination of the two ranges exactly once, in random
/// order. The source field is the fast-running coordinate.
pub fn unique_pairs(src: PortRange, dst: PortRange) -> BenchResult<Vec<PairCombo>> {
    let ssize = src.size() as u64;
    let dsize = dst.size() as u64;
    let size = ssize * dsize;
    let mut array = reserve::<PairCombo>(size, "unique pair combinations")?;
    let mut rng = SmallRng::from_entropy();

    array.push(PairCombo {
        src: src.min,
        dst: dst.min,
    });
    for index in 1..size {
        let s = (index % ssize) as u16 + src.min;
        let d = (index / ssize) as u16 + dst.min;
        let slot = rng.gen_range(0..=index) as usize;
        // Inside-out shuffle: the old occupant moves to the end, the new
        // element lands on a random earlier slot (possibly its own).
        let moved = array[slot];
        array.push(moved);
        array[slot] = PairCombo { src: s, dst: d };
    }
    Ok(array)
}

/// Every (sip, dip, sport, dport) combination of the four ranges exactly
/// once, in random order.
pub fn unique_quads(
    sip: PortRange,
    dip: PortRange,
    sport: PortRange,
    dport: PortRange,
) -> BenchResult<Vec<QuadCombo>> {
    let spsize = sport.size() as u64;
    let dpsize = dport.size() as u64;
    let sisize = sip.size() as u64;
    let disize = dip.size() as u64;
    let size = sisize * disize * spsize * dpsize;
    let mut array = reserve::<QuadCombo>(size, "unique four-tuple combinations")?;
    let mut rng = SmallRng::from_entropy();

    array.push(QuadCombo {
        sip: sip.min,
        dip: dip.min,
        sport: sport.min,
        dport: dport.min,
    });
    let per_si = spsize * dpsize;
    let per_di = sisize * per_si;
    for index in 1..size {
        let di = (index / per_di) as u16 + dip.min;
        let rest = index % per_di;
        let si = (rest / per_si) as u16 + sip.min;
        let rest = rest % per_si;
        let dp = (rest / spsize) as u16 + dport.min;
        let sp = (rest % spsize) as u16 + sport.min;
        let slot = rng.gen_range(0..=index) as usize;
        let moved = array[slot];
        array.push(moved);
        array[slot] = QuadCombo {
            sip: si,
            dip: di,
            sport: sp,
            dport: dp,
        };
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn pairs_cover_cartesian_product_once() {
        let src = PortRange::new(1024, 1123); // 100
        let dst = PortRange::new(1, 50); // 50
        let combos = unique_pairs(src, dst).unwrap();
        assert_eq!(combos.len(), 5000);
        let set: HashSet<PairCombo> = combos.iter().copied().collect();
        assert_eq!(set.len(), 5000);
        for s in 1024..=1123 {
            assert!(set.contains(&PairCombo { src: s, dst: 1 }));
            assert!(set.contains(&PairCombo { src: s, dst: 50 }));
        }
    }

    #[test]
    fn pairs_are_shuffled() {
        let combos = unique_pairs(PortRange::new(0, 99), PortRange::new(0, 99)).unwrap();
        // The identity order would keep src == index % 100 everywhere.
        let in_place = combos
            .iter()
            .enumerate()
            .filter(|(i, c)| c.src as usize == i % 100 && c.dst as usize == i / 100)
            .count();
        assert!(in_place < combos.len() / 10);
    }

    #[test]
    fn quads_cover_cartesian_product_once() {
        let r = PortRange::new(0, 4); // 5 values each -> 625 combos
        let combos = unique_quads(r, r, r, r).unwrap();
        assert_eq!(combos.len(), 625);
        let set: HashSet<QuadCombo> = combos.iter().copied().collect();
        assert_eq!(set.len(), 625);
        assert!(set.contains(&QuadCombo {
            sip: 4,
            dip: 4,
            sport: 4,
            dport: 4
        }));
    }

    #[test]
    fn single_element_ranges() {
        let combos =
            unique_pairs(PortRange::new(7, 7), PortRange::new(9, 9)).unwrap();
        assert_eq!(combos, vec![PairCombo { src: 7, dst: 9 }]);
    }
}
