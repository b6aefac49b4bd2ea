//! Ternary bit masks.
//!
//! A [`Mask`] records, for every bit of a cipher word, whether the bit is
//! forced to 0, forced to 1, or still unknown at this point of the search.
//! Next to the ternary sequence the mask carries a compact pair of bitmaps,
//! `care` (bit is determined) and `canbe1` (bit may take the value 1), which
//! makes bulk feasibility tests and cache keys O(1). The compact pair is
//! always re-derivable from the ternary sequence; after any bulk mutation of
//! the sequence, [`Mask::reinit_care`] must be called to re-sync it.
//!
//! Bits are numbered LSB-first throughout: bit 0 of a mask corresponds to
//! the least significant bit of the concrete word value. (The original
//! design left both orderings on the table; we commit to LSB-first.)

use std::fmt;

/// The ternary domain of a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bit {
    Zero,
    One,
    Unknown,
}

/// Ternary knowledge about one cipher word of up to 64 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    bits: Vec<Bit>,
    care: u64,
    canbe1: u64,
}

impl Mask {
    /// A mask of `bitsize` bits, all unknown. Carries no information.
    pub fn unknown(bitsize: usize) -> Mask {
        assert!(bitsize >= 1 && bitsize <= 64, "Unsupported word width: {}", bitsize);
        Mask {
            bits: vec![Bit::Unknown; bitsize],
            care: 0,
            canbe1: Self::all_ones(bitsize),
        }
    }

    /// A fully determined mask holding the concrete value `value`.
    pub fn from_value(bitsize: usize, value: u64) -> Mask {
        let mut mask = Mask::unknown(bitsize);
        for i in 0..bitsize {
            mask.bits[i] = if (value >> i) & 1 == 1 { Bit::One } else { Bit::Zero };
        }
        mask.reinit_care();
        mask
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn bit(&self, pos: usize) -> Bit {
        self.bits[pos]
    }

    /// Write a single bit and keep the compact pair in sync.
    pub fn set_bit(&mut self, pos: usize, value: Bit) {
        self.bits[pos] = value;
        match value {
            Bit::Zero => {
                self.care |= 1 << pos;
                self.canbe1 &= !(1 << pos);
            }
            Bit::One => {
                self.care |= 1 << pos;
                self.canbe1 |= 1 << pos;
            }
            Bit::Unknown => {
                self.care &= !(1 << pos);
                self.canbe1 |= 1 << pos;
            }
        }
    }

    /// Re-derive the compact `care`/`canbe1` pair from the ternary sequence.
    pub fn reinit_care(&mut self) {
        self.care = 0;
        self.canbe1 = 0;
        for (i, bit) in self.bits.iter().enumerate() {
            match bit {
                Bit::Zero => self.care |= 1 << i,
                Bit::One => {
                    self.care |= 1 << i;
                    self.canbe1 |= 1 << i;
                }
                Bit::Unknown => self.canbe1 |= 1 << i,
            }
        }
    }

    #[inline]
    pub fn care(&self) -> u64 {
        self.care
    }

    #[inline]
    pub fn canbe1(&self) -> u64 {
        self.canbe1
    }

    /// True if no bit is unknown.
    #[inline]
    pub fn is_determined(&self) -> bool {
        self.care == Self::all_ones(self.width())
    }

    /// The concrete value, if the mask is fully determined.
    pub fn value(&self) -> Option<u64> {
        if self.is_determined() {
            Some(self.canbe1)
        } else {
            None
        }
    }

    /// Number of unknown bits, i.e. the log2 of the number of concrete
    /// values consistent with this mask.
    pub fn unknown_count(&self) -> usize {
        self.width() - (self.care.count_ones() as usize)
    }

    /// Overwrite the ternary sequence from per-bit support sets: `can0`
    /// (`canbe0`) holds the bits that may be 0 over all feasible concrete
    /// values, `can1` the bits that may be 1. Returns `false` if some bit
    /// has no feasible polarity left, which is a contradiction.
    pub fn rewrite_from_support(&mut self, can0: u64, can1: u64) -> bool {
        for i in 0..self.width() {
            let zero = (can0 >> i) & 1 == 1;
            let one = (can1 >> i) & 1 == 1;
            self.bits[i] = match (zero, one) {
                (true, true) => Bit::Unknown,
                (true, false) => Bit::Zero,
                (false, true) => Bit::One,
                (false, false) => {
                    self.reinit_care();
                    return false;
                }
            };
        }
        self.reinit_care();
        true
    }

    /// Iterate over all concrete values consistent with this mask,
    /// LSB-first. The iterator is lazy and restartable, so callers that
    /// only need a count or the first candidate pay for no more than that.
    pub fn concrete_values(&self) -> ConcreteValues {
        let free: Vec<usize> = (0..self.width())
            .filter(|i| self.bits[*i] == Bit::Unknown)
            .collect();
        assert!(free.len() < 63, "Mask enumeration blown: {} unknown bits", free.len());
        ConcreteValues {
            base: self.care & self.canbe1,
            free,
            next: 0,
        }
    }

    #[inline]
    fn all_ones(bitsize: usize) -> u64 {
        !0u64 >> (64 - bitsize)
    }
}

/// Lazy enumeration of the concrete values consistent with a [`Mask`].
///
/// Replaces a recursive formulation: the `k`-th value is the known-one bits
/// of the mask with the bits of `k` scattered over the unknown positions,
/// which bounds the work at one pass over the free positions per item.
#[derive(Debug, Clone)]
pub struct ConcreteValues {
    base: u64,
    free: Vec<usize>,
    next: u64,
}

impl Iterator for ConcreteValues {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= 1u64 << self.free.len() {
            return None;
        }
        let mut value = self.base;
        for (j, pos) in self.free.iter().enumerate() {
            if (self.next >> j) & 1 == 1 {
                value |= 1 << pos;
            }
        }
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (1u64 << self.free.len()) - self.next;
        (left as usize, Some(left as usize))
    }
}

impl ExactSizeIterator for ConcreteValues {}

impl fmt::Display for Mask {
    /// MSB on the left, so a rendered mask reads like the word's value.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in (0..self.width()).rev() {
            let c = match self.bits[i] {
                Bit::Zero => '0',
                Bit::One => '1',
                Bit::Unknown => '?',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
