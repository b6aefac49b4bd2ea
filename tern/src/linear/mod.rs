//! GF(2) equation solver for linear diffusion layers.
//!
//! A linear layer is handed to the engine as a pure function from one word
//! tuple to another. [`LinearStep`] probes the function column by column to
//! recover its bit-level relation as a system of [`Row`]s, one per output
//! bit: `sum x_i (+) sum y_j = rhs`. Propagation injects the current mask
//! knowledge of both sides as unit rows and runs Gaussian elimination; every
//! row left with a single free variable forces that bit, and an all-zero row
//! with rhs = 1 is a contradiction.
//!
//! Variables are indexed `word * bitsize + bit` on each side, x-side and
//! y-side kept in separate coefficient vectors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitXorAssign;

use ahash::AHasher;
use vob::Vob;

use crate::cache::SharedCache;
use crate::mask::{Bit, Mask};

/// One GF(2) relation over the input-bit and output-bit variables of a
/// linear layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    x: Vob,
    y: Vob,
    rhs: bool,
}

impl Row {
    /// An all-zero row over `vars` variables per side.
    pub fn empty(vars: usize) -> Row {
        Row {
            x: Vob::from_elem(vars, false),
            y: Vob::from_elem(vars, false),
            rhs: false,
        }
    }

    pub fn from_parts(x: Vob, y: Vob, rhs: bool) -> Row {
        debug_assert_eq!(x.len(), y.len());
        Row { x, y, rhs }
    }

    /// A unit row pinning one x-side variable to a known value.
    pub fn x_unit(vars: usize, var: usize, value: bool) -> Row {
        let mut row = Row::empty(vars);
        row.x.set(var, true);
        row.rhs = value;
        row
    }

    /// A unit row pinning one y-side variable to a known value.
    pub fn y_unit(vars: usize, var: usize, value: bool) -> Row {
        let mut row = Row::empty(vars);
        row.y.set(var, true);
        row.rhs = value;
        row
    }

    /// All coefficients zero but rhs = 1: the system is infeasible.
    pub fn is_contradiction(&self) -> bool {
        self.rhs && self.x_weight() == 0 && self.y_weight() == 0
    }

    pub fn is_empty(&self) -> bool {
        !self.rhs && self.x_weight() == 0 && self.y_weight() == 0
    }

    /// Exactly one variable left, on the x side.
    pub fn is_x_singleton(&self) -> bool {
        self.x_weight() == 1 && self.y_weight() == 0
    }

    /// Exactly one variable left, on the y side.
    pub fn is_y_singleton(&self) -> bool {
        self.x_weight() == 0 && self.y_weight() == 1
    }

    /// True if the two rows share at least one variable, which makes
    /// `other` a candidate for cancelling against `self`.
    pub fn common_variable_with(&self, other: &Row) -> bool {
        let mut x = self.x.clone();
        x.and(&other.x);
        if x.iter_set_bits(..).next().is_some() {
            return true;
        }
        let mut y = self.y.clone();
        y.and(&other.y);
        y.iter_set_bits(..).next().is_some()
    }

    /// Column test across both sides; columns `0..vars` are x variables,
    /// `vars..2*vars` are y variables.
    #[inline]
    fn variable(&self, col: usize) -> bool {
        let vars = self.x.len();
        if col < vars {
            self.x[col]
        } else {
            self.y[col - vars]
        }
    }

    /// Write the forced value of an x singleton into `masks` (one mask per
    /// word). Returns the variable index that was written.
    pub fn extract_mask_info_x(&self, bitsize: usize, masks: &mut [Mask]) -> usize {
        debug_assert!(self.is_x_singleton());
        let var = self.x.iter_set_bits(..).next().unwrap();
        let value = if self.rhs { Bit::One } else { Bit::Zero };
        masks[var / bitsize].set_bit(var % bitsize, value);
        var
    }

    /// Write the forced value of a y singleton into `masks`.
    pub fn extract_mask_info_y(&self, bitsize: usize, masks: &mut [Mask]) -> usize {
        debug_assert!(self.is_y_singleton());
        let var = self.y.iter_set_bits(..).next().unwrap();
        let value = if self.rhs { Bit::One } else { Bit::Zero };
        masks[var / bitsize].set_bit(var % bitsize, value);
        var
    }

    fn x_weight(&self) -> usize {
        self.x.iter_set_bits(..).count()
    }

    fn y_weight(&self) -> usize {
        self.y.iter_set_bits(..).count()
    }
}

impl BitXorAssign<&Row> for Row {
    fn bitxor_assign(&mut self, rhs: &Row) {
        self.x.xor(&rhs.x);
        self.y.xor(&rhs.y);
        self.rhs ^= rhs.rhs;
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for i in self.x.iter_set_bits(..) {
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "x{}", i)?;
            first = false;
        }
        for j in self.y.iter_set_bits(..) {
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "y{}", j)?;
            first = false;
        }
        if first {
            write!(f, "0")?;
        }
        write!(f, " = {}", self.rhs as u8)
    }
}

/// Memoized result of a successful linear propagation.
#[derive(Debug, Clone)]
pub struct LinearStepUpdateInfo {
    x_words: Vec<Mask>,
    y_words: Vec<Mask>,
}

/// The GF(2) equation system of one linear layer over `words` words of
/// `bitsize` bits, plus bidirectional mask propagation over it.
#[derive(Debug, Clone)]
pub struct LinearStep {
    bitsize: usize,
    words: usize,
    /// The layer's own relation; mask knowledge is joined in per update.
    rows: Vec<Row>,
    /// Hash of the relation, mixed into cache keys. Steps built from
    /// different functions may share one cache without ever reading each
    /// other's results; steps built from the same function still share
    /// entries.
    fingerprint: u64,
}

impl LinearStep {
    /// Recover the bit-level relation of `fun` by probing it with unit
    /// vectors. `fun` must be affine over GF(2) and total; the affine
    /// constant `fun(0)` lands on the right-hand sides.
    pub fn new<F>(bitsize: usize, words: usize, fun: F) -> LinearStep
    where
        F: Fn(&[u64]) -> Vec<u64>,
    {
        assert!(bitsize >= 1 && bitsize <= 64, "Unsupported word width: {}", bitsize);
        let vars = bitsize * words;
        let zero_image = fun(&vec![0u64; words]);
        assert_eq!(zero_image.len(), words, "Linear function changed the word count");

        // Column probe: image of every input unit vector, constant removed.
        let mut columns = Vec::with_capacity(vars);
        for i in 0..vars {
            let mut input = vec![0u64; words];
            input[i / bitsize] = 1 << (i % bitsize);
            let image = fun(&input);
            let column: Vec<u64> = image
                .iter()
                .zip(zero_image.iter())
                .map(|(a, b)| a ^ b)
                .collect();
            columns.push(column);
        }

        let mut rows = Vec::with_capacity(vars);
        for j in 0..vars {
            let mut x = Vob::from_elem(vars, false);
            for (i, column) in columns.iter().enumerate() {
                if (column[j / bitsize] >> (j % bitsize)) & 1 == 1 {
                    x.set(i, true);
                }
            }
            let mut y = Vob::from_elem(vars, false);
            y.set(j, true);
            let rhs = (zero_image[j / bitsize] >> (j % bitsize)) & 1 == 1;
            rows.push(Row::from_parts(x, y, rhs));
        }

        let fingerprint = Self::fingerprint(&rows);
        LinearStep {
            bitsize,
            words,
            rows,
            fingerprint,
        }
    }

    #[inline]
    pub fn bitsize(&self) -> usize {
        self.bitsize
    }

    #[inline]
    pub fn words(&self) -> usize {
        self.words
    }

    /// Propagate mask knowledge in both directions across the layer.
    /// Tightens `x` and `y` in place. Returns `false` if the joined system
    /// is infeasible; the masks are then in an unspecified (but sync'd)
    /// state and the caller must abandon the branch.
    pub fn update(&self, x: &mut [Mask], y: &mut [Mask]) -> bool {
        debug_assert_eq!(x.len(), self.words);
        debug_assert_eq!(y.len(), self.words);

        let mut rows = self.rows.clone();
        self.add_masks(&mut rows, x, y);

        if !Self::eliminate(&mut rows) {
            return false;
        }

        for row in rows.iter() {
            if row.is_x_singleton() {
                row.extract_mask_info_x(self.bitsize, x);
            } else if row.is_y_singleton() {
                row.extract_mask_info_y(self.bitsize, y);
            }
        }
        true
    }

    /// Memoizing wrapper around [`LinearStep::update`]. Only feasible
    /// results are cached; contradictions are cheap to rediscover and rare
    /// enough to not be worth a slot.
    pub fn update_cached(
        &self,
        x: &mut [Mask],
        y: &mut [Mask],
        cache: &SharedCache<Vec<u64>, LinearStepUpdateInfo>,
    ) -> bool {
        let key = self.key(x, y);
        if let Some(info) = cache.find(&key) {
            x.clone_from_slice(&info.x_words);
            y.clone_from_slice(&info.y_words);
            return true;
        }

        if !self.update(x, y) {
            return false;
        }
        cache.insert(
            key,
            LinearStepUpdateInfo {
                x_words: x.to_vec(),
                y_words: y.to_vec(),
            },
        );
        true
    }

    /// Inject the known bits of both masks as unit rows.
    fn add_masks(&self, rows: &mut Vec<Row>, x: &[Mask], y: &[Mask]) {
        let vars = self.bitsize * self.words;
        for (w, mask) in x.iter().enumerate() {
            for b in 0..self.bitsize {
                match mask.bit(b) {
                    Bit::Zero => rows.push(Row::x_unit(vars, w * self.bitsize + b, false)),
                    Bit::One => rows.push(Row::x_unit(vars, w * self.bitsize + b, true)),
                    Bit::Unknown => {}
                }
            }
        }
        for (w, mask) in y.iter().enumerate() {
            for b in 0..self.bitsize {
                match mask.bit(b) {
                    Bit::Zero => rows.push(Row::y_unit(vars, w * self.bitsize + b, false)),
                    Bit::One => rows.push(Row::y_unit(vars, w * self.bitsize + b, true)),
                    Bit::Unknown => {}
                }
            }
        }
    }

    /// Gaussian elimination to reduced row echelon form. Returns `false`
    /// as soon as a contradiction row appears.
    fn eliminate(rows: &mut Vec<Row>) -> bool {
        if rows.is_empty() {
            return true;
        }
        let ncols = 2 * rows[0].x.len();
        let mut next_pivot = 0;
        for col in 0..ncols {
            let candidate = (next_pivot..rows.len()).find(|i| rows[*i].variable(col));
            let found = match candidate {
                Some(i) => i,
                None => continue,
            };
            rows.swap(next_pivot, found);
            let pivot_row = rows[next_pivot].clone();
            for (i, row) in rows.iter_mut().enumerate() {
                if i != next_pivot && row.variable(col) {
                    *row ^= &pivot_row;
                    if row.is_contradiction() {
                        return false;
                    }
                }
            }
            next_pivot += 1;
            if next_pivot == rows.len() {
                break;
            }
        }
        // Rows below the pivot range are fully cancelled; any rhs left
        // there is a contradiction.
        !rows.iter().skip(next_pivot).any(|r| r.is_contradiction())
    }

    /// Compact cache key: the relation fingerprint, then the care/canbe1
    /// pair of every word, both sides.
    fn key(&self, x: &[Mask], y: &[Mask]) -> Vec<u64> {
        let mut key = Vec::with_capacity(1 + 2 * (x.len() + y.len()));
        key.push(self.fingerprint);
        for mask in x.iter().chain(y.iter()) {
            key.push(mask.care());
            key.push(mask.canbe1());
        }
        key
    }

    fn fingerprint(rows: &[Row]) -> u64 {
        let mut hasher = AHasher::default();
        for row in rows.iter() {
            for i in row.x.iter_set_bits(..) {
                i.hash(&mut hasher);
            }
            // Side separator; a bare bit-index stream would collide
            // x-heavy rows with y-heavy ones.
            usize::max_value().hash(&mut hasher);
            for j in row.y.iter_set_bits(..) {
                j.hash(&mut hasher);
            }
            row.rhs.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl fmt::Display for LinearStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.rows.iter() {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
