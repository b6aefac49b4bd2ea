//! S-box propagation driven by a precomputed distribution table.
//!
//! [`DistributionTable`] holds, for every (input mask, output mask) value
//! pair of an S-box, either the signed linear correlation or the
//! differential transition count, plus a boolean feasibility companion for
//! fast infeasibility tests. The table is built once per distinct S-box
//! function (an O(2^(3*bitsize)) job, parallelized with rayon) and is
//! immutable afterwards, so it is shared across rounds and search branches
//! behind an `Arc`.
//!
//! [`NonlinearStep`] uses the table to tighten ternary masks across one
//! S-box instance and to rank the concrete transitions by |bias|.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use vob::Vob;

use crate::cache::SharedCache;
use crate::mask::Mask;

/// Sign and log2-probability of one concrete S-box transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityPair {
    /// +1 or -1; 0 marks the undefined sentinel.
    pub sign: i8,
    pub log2: f64,
}

impl ProbabilityPair {
    /// Returned when a probability is requested for a non-singleton mask
    /// pair or an infeasible transition.
    pub fn undefined() -> ProbabilityPair {
        ProbabilityPair { sign: 0, log2: -1.0 }
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.sign == 0
    }
}

/// Correlation (linear mode) or transition-count (differential mode) table
/// of one S-box over the full 2^bitsize x 2^bitsize mask domain.
#[derive(Debug)]
pub struct DistributionTable {
    bitsize: usize,
    entries: Vec<Vec<i32>>,
    feasible: Vec<Vob>,
}

impl DistributionTable {
    /// Signed linear correlation table: entry (a, b) counts the inputs on
    /// which the parities of `a & x` and `b & fun(x)` agree, centered
    /// around zero.
    pub fn linear<F>(bitsize: usize, fun: F) -> DistributionTable
    where
        F: Fn(u64) -> u64 + Sync,
    {
        let boxsize = Self::boxsize(bitsize);
        let images: Vec<u64> = (0..boxsize as u64).map(|x| fun(x)).collect();
        for image in images.iter() {
            assert!(*image < boxsize as u64, "S-box image outside its declared domain");
        }

        let entries: Vec<Vec<i32>> = (0..boxsize)
            .into_par_iter()
            .map(|a| {
                let mut row = vec![-((boxsize >> 1) as i32); boxsize];
                for x in 0..boxsize {
                    let pa = parity(a as u64 & x as u64);
                    for b in 0..boxsize {
                        if pa == parity(b as u64 & images[x]) {
                            row[b] += 1;
                        }
                    }
                }
                row
            })
            .collect();

        Self::with_entries(bitsize, entries)
    }

    /// Differential transition counts: entry (a, b) counts the inputs with
    /// `fun(x) ^ fun(x ^ a) == b`.
    pub fn differential<F>(bitsize: usize, fun: F) -> DistributionTable
    where
        F: Fn(u64) -> u64 + Sync,
    {
        let boxsize = Self::boxsize(bitsize);
        let images: Vec<u64> = (0..boxsize as u64).map(|x| fun(x)).collect();
        for image in images.iter() {
            assert!(*image < boxsize as u64, "S-box image outside its declared domain");
        }

        let entries: Vec<Vec<i32>> = (0..boxsize)
            .into_par_iter()
            .map(|a| {
                let mut row = vec![0i32; boxsize];
                for x in 0..boxsize {
                    let b = images[x] ^ images[x ^ a];
                    row[b as usize] += 1;
                }
                row
            })
            .collect();

        Self::with_entries(bitsize, entries)
    }

    fn with_entries(bitsize: usize, entries: Vec<Vec<i32>>) -> DistributionTable {
        let boxsize = Self::boxsize(bitsize);
        let feasible = entries
            .iter()
            .map(|row| {
                let mut bits = Vob::from_elem(boxsize, false);
                for (b, entry) in row.iter().enumerate() {
                    if *entry != 0 {
                        bits.set(b, true);
                    }
                }
                bits
            })
            .collect();
        DistributionTable {
            bitsize,
            entries,
            feasible,
        }
    }

    #[inline]
    pub fn bitsize(&self) -> usize {
        self.bitsize
    }

    #[inline]
    pub fn entry(&self, a: u64, b: u64) -> i32 {
        self.entries[a as usize][b as usize]
    }

    #[inline]
    pub fn is_feasible(&self, a: u64, b: u64) -> bool {
        self.feasible[a as usize][b as usize]
    }

    fn boxsize(bitsize: usize) -> usize {
        assert!(
            bitsize >= 1 && bitsize <= 16,
            "Unsupported S-box width: {}",
            bitsize
        );
        1 << bitsize
    }
}

impl fmt::Display for DistributionTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.entries.iter() {
            for entry in row.iter() {
                write!(f, "{: >4}", entry)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[inline]
fn parity(v: u64) -> bool {
    v.count_ones() & 1 == 1
}

/// Memoized result of a successful nonlinear propagation.
#[derive(Debug, Clone)]
pub struct NonlinearStepUpdateInfo {
    is_active: bool,
    is_guessable: bool,
    x: Mask,
    y: Mask,
}

/// Mask propagation across one S-box instance.
///
/// `is_active` and `is_guessable` are refreshed by every update and read by
/// the search driver: an active box contributes to the trail's weight, a
/// guessable one still has unknown bits and thus requires branching.
#[derive(Debug, Clone)]
pub struct NonlinearStep {
    table: Arc<DistributionTable>,
    pub is_active: bool,
    pub is_guessable: bool,
}

impl NonlinearStep {
    pub fn new(table: Arc<DistributionTable>) -> NonlinearStep {
        NonlinearStep {
            table,
            is_active: false,
            is_guessable: true,
        }
    }

    #[inline]
    pub fn bitsize(&self) -> usize {
        self.table.bitsize()
    }

    /// Tighten `x` and `y` against the S-box relation: enumerate every
    /// concrete pair consistent with both masks, OR the feasible ones into
    /// per-polarity support sets, and rewrite the masks from those sets.
    /// Returns `false` if no feasible pair is left.
    pub fn update(&mut self, x: &mut Mask, y: &mut Mask) -> bool {
        let full = !0u64 >> (64 - self.bitsize());
        let mut in_support = [0u64; 2];
        let mut out_support = [0u64; 2];

        for inm in x.concrete_values() {
            for outm in y.concrete_values() {
                if self.table.is_feasible(inm, outm) {
                    in_support[0] |= !inm & full;
                    in_support[1] |= inm;
                    out_support[0] |= !outm & full;
                    out_support[1] |= outm;
                }
            }
        }

        if in_support[0] | in_support[1] == 0 || out_support[0] | out_support[1] == 0 {
            return false;
        }
        // Support sets are built from surviving candidates only, so the
        // per-bit rewrite cannot fail here.
        let ok_x = x.rewrite_from_support(in_support[0], in_support[1]);
        let ok_y = y.rewrite_from_support(out_support[0], out_support[1]);
        debug_assert!(ok_x && ok_y);

        // Active: some bit on either side is pinned to 1.
        self.is_active = x.care() & x.canbe1() != 0 || y.care() & y.canbe1() != 0;
        self.is_guessable = x.unknown_count() > 0 || y.unknown_count() > 0;
        true
    }

    /// Memoizing wrapper around [`NonlinearStep::update`]. The key packs
    /// both compact mask pairs into one integer, so the S-box width must
    /// not exceed 16 bits.
    pub fn update_cached(
        &mut self,
        x: &mut Mask,
        y: &mut Mask,
        cache: &SharedCache<u64, NonlinearStepUpdateInfo>,
    ) -> bool {
        let key = self.key(x, y);
        if let Some(info) = cache.find(&key) {
            self.is_active = info.is_active;
            self.is_guessable = info.is_guessable;
            *x = info.x;
            *y = info.y;
            return true;
        }

        if !self.update(x, y) {
            return false;
        }
        cache.insert(
            key,
            NonlinearStepUpdateInfo {
                is_active: self.is_active,
                is_guessable: self.is_guessable,
                x: x.clone(),
                y: y.clone(),
            },
        );
        true
    }

    /// Sign and log2-probability of the (fully determined) transition.
    /// Returns the undefined sentinel if either mask still has unknown
    /// bits or the transition is infeasible.
    pub fn probability(&self, x: &Mask, y: &Mask) -> ProbabilityPair {
        let (a, b) = match (x.value(), y.value()) {
            (Some(a), Some(b)) => (a, b),
            _ => return ProbabilityPair::undefined(),
        };
        let entry = self.table.entry(a, b);
        if entry == 0 {
            return ProbabilityPair::undefined();
        }
        ProbabilityPair {
            sign: entry.signum() as i8,
            log2: (entry.abs() as f64).log2() - self.bitsize() as f64,
        }
    }

    /// Greedily commit the feasible concrete pair with the highest |bias|
    /// into `x` and `y`.
    pub fn take_best(&mut self, x: &mut Mask, y: &mut Mask) {
        let mut best = 0i32;
        let mut best_pair = (0u64, 0u64);
        for inm in x.concrete_values() {
            for outm in y.concrete_values() {
                let weight = self.table.entry(inm, outm).abs();
                if weight > best {
                    best = weight;
                    best_pair = (inm, outm);
                }
            }
        }
        assert!(best > 0, "take_best on masks with no feasible transition");
        self.commit(x, y, best_pair);
    }

    /// Commit the `pos`-th feasible pair in descending |bias| order and
    /// return the total candidate count, so a driver can enumerate the
    /// alternatives of a branch exhaustively. Panics if `pos` is out of
    /// range; that is a driver bug, not a search outcome.
    pub fn take_ranked(&mut self, x: &mut Mask, y: &mut Mask, pos: usize) -> usize {
        let mut candidates: Vec<(i32, u64, u64)> = Vec::new();
        for inm in x.concrete_values() {
            for outm in y.concrete_values() {
                let weight = self.table.entry(inm, outm).abs();
                if weight > 0 {
                    candidates.push((weight, inm, outm));
                }
            }
        }
        // Descending weight; ties broken by mask value to keep the ranking
        // deterministic across runs.
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        assert!(
            pos < candidates.len(),
            "take_ranked: pos {} out of {} candidates",
            pos,
            candidates.len()
        );
        let (_, inm, outm) = candidates[pos];
        self.commit(x, y, (inm, outm));
        candidates.len()
    }

    fn commit(&mut self, x: &mut Mask, y: &mut Mask, pair: (u64, u64)) {
        *x = Mask::from_value(self.bitsize(), pair.0);
        *y = Mask::from_value(self.bitsize(), pair.1);
        self.is_active = pair.0 != 0;
        self.is_guessable = false;
    }

    /// One-integer cache key over both compact mask pairs.
    fn key(&self, x: &Mask, y: &Mask) -> u64 {
        let b = self.bitsize();
        debug_assert!(4 * b <= 64);
        (x.canbe1() << (3 * b)) | (x.care() << (2 * b)) | (y.canbe1() << b) | y.care()
    }
}
