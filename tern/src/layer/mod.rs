//! Layers: the round-sized wrappers around the two step kinds.
//!
//! A layer connects two neighbouring state masks. [`SboxLayer`] is a bank
//! of bit-sliced S-boxes: each S-box reads one vertical slice (the same bit
//! position out of every word of a word group). [`LinearLayer`] holds one
//! [`LinearStep`] per word group. Both kinds route every update through the
//! memo cache shared across all layers of the same kind.

use std::sync::Arc;

use crate::cache::SharedCache;
use crate::linear::{LinearStep, LinearStepUpdateInfo};
use crate::mask::Mask;
use crate::nonlinear::{DistributionTable, NonlinearStep, NonlinearStepUpdateInfo};
use crate::state::{State, UpdatePos};

/// Uniform capability of both layer kinds: re-propagate after the given
/// position changed on either side. Returns `false` on contradiction.
pub trait Layer {
    fn update(&mut self, pos: UpdatePos, input: &mut State, output: &mut State) -> bool;
}

/// A bank of bit-sliced S-boxes between two states.
///
/// `groups` partitions the state's words into the word tuples feeding the
/// S-boxes; S-box `(g, b)` reads bit `b` of every word in group `g`. The
/// 5x64 shape uses the single group `[0, 1, 2, 3, 4]`, a four-column 16x32
/// shape uses four groups of four words each.
#[derive(Debug, Clone)]
pub struct SboxLayer {
    groups: Vec<Vec<usize>>,
    bits_per_word: usize,
    boxes: Vec<NonlinearStep>,
    cache: SharedCache<u64, NonlinearStepUpdateInfo>,
}

impl SboxLayer {
    pub fn new(
        groups: Vec<Vec<usize>>,
        bits_per_word: usize,
        table: Arc<DistributionTable>,
        cache: SharedCache<u64, NonlinearStepUpdateInfo>,
    ) -> SboxLayer {
        for group in groups.iter() {
            assert_eq!(
                group.len(),
                table.bitsize(),
                "Word group width does not match the S-box width"
            );
        }
        let boxes = (0..groups.len() * bits_per_word)
            .map(|_| NonlinearStep::new(Arc::clone(&table)))
            .collect();
        SboxLayer {
            groups,
            bits_per_word,
            boxes,
            cache,
        }
    }

    #[inline]
    pub fn num_sboxes(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn sbox(&self, index: usize) -> &NonlinearStep {
        &self.boxes[index]
    }

    /// The vertical mask of S-box `index` in `state`: bit `j` of the mask
    /// is bit `index % bits_per_word` of word `groups[index / bits][j]`.
    pub fn vertical_mask(&self, index: usize, state: &State) -> Mask {
        let (group, bit) = self.locate(index);
        let mut mask = Mask::unknown(group.len());
        for (j, word) in group.iter().enumerate() {
            mask.set_bit(j, state[*word].bit(bit));
        }
        mask
    }

    /// Scatter a vertical mask back into `state`. Unchanged bits are not
    /// rewritten, which keeps untouched words shared between branch
    /// snapshots.
    pub fn set_vertical_mask(&self, index: usize, state: &mut State, mask: &Mask) {
        let (group, bit) = self.locate(index);
        debug_assert_eq!(mask.width(), group.len());
        for (j, word) in group.iter().enumerate() {
            if state[*word].bit(bit) != mask.bit(j) {
                state[*word].set_bit(bit, mask.bit(j));
            }
        }
    }

    /// Re-propagate a single S-box and write the tightened slices back.
    pub fn update_sbox(&mut self, index: usize, input: &mut State, output: &mut State) -> bool {
        let mut x = self.vertical_mask(index, input);
        let mut y = self.vertical_mask(index, output);
        if !self.boxes[index].update_cached(&mut x, &mut y, &self.cache) {
            return false;
        }
        self.set_vertical_mask(index, input, &x);
        self.set_vertical_mask(index, output, &y);
        true
    }

    /// Greedily commit the best transition of one S-box. The caller owns
    /// re-propagation of the committed bits.
    pub fn take_best(&mut self, index: usize, input: &mut State, output: &mut State) {
        let mut x = self.vertical_mask(index, input);
        let mut y = self.vertical_mask(index, output);
        self.boxes[index].take_best(&mut x, &mut y);
        self.set_vertical_mask(index, input, &x);
        self.set_vertical_mask(index, output, &y);
    }

    /// Commit the `pos`-th ranked transition of one S-box; returns the
    /// total candidate count.
    pub fn take_ranked(
        &mut self,
        index: usize,
        input: &mut State,
        output: &mut State,
        pos: usize,
    ) -> usize {
        let mut x = self.vertical_mask(index, input);
        let mut y = self.vertical_mask(index, output);
        let count = self.boxes[index].take_ranked(&mut x, &mut y, pos);
        self.set_vertical_mask(index, input, &x);
        self.set_vertical_mask(index, output, &y);
        count
    }

    /// Sign and summed log2-probability over all *active* S-boxes of this
    /// layer. `None` as long as some active S-box is not a singleton yet.
    pub fn probability(&self, input: &State, output: &State) -> Option<(i8, f64)> {
        let mut sign = 1i8;
        let mut log2 = 0.0f64;
        for index in 0..self.num_sboxes() {
            let x = self.vertical_mask(index, input);
            let y = self.vertical_mask(index, output);
            // Trivial (all-zero) transitions carry weight 0.
            if x.value() == Some(0) && y.value() == Some(0) {
                continue;
            }
            let prob = self.boxes[index].probability(&x, &y);
            if prob.is_undefined() {
                return None;
            }
            sign *= prob.sign;
            log2 += prob.log2;
        }
        Some((sign, log2))
    }

    /// Indices of the S-boxes a changed position feeds into. Every bit
    /// position belongs to exactly one S-box of the bank.
    pub fn affected_sbox(&self, pos: UpdatePos) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.contains(&pos.word))
            .map(|g| g * self.bits_per_word + pos.bit)
    }

    fn locate(&self, index: usize) -> (&[usize], usize) {
        let group = &self.groups[index / self.bits_per_word];
        (group, index % self.bits_per_word)
    }
}

impl Layer for SboxLayer {
    fn update(&mut self, pos: UpdatePos, input: &mut State, output: &mut State) -> bool {
        match self.affected_sbox(pos) {
            Some(index) => self.update_sbox(index, input, output),
            None => true,
        }
    }
}

/// A diffusion layer between two states: one GF(2) equation system per
/// word group.
#[derive(Debug, Clone)]
pub struct LinearLayer {
    groups: Vec<Vec<usize>>,
    steps: Vec<LinearStep>,
    cache: SharedCache<Vec<u64>, LinearStepUpdateInfo>,
}

impl LinearLayer {
    /// `steps[g]` relates the words `groups[g]` of the input state to the
    /// same words of the output state.
    pub fn new(
        groups: Vec<Vec<usize>>,
        steps: Vec<LinearStep>,
        cache: SharedCache<Vec<u64>, LinearStepUpdateInfo>,
    ) -> LinearLayer {
        assert_eq!(groups.len(), steps.len());
        for (group, step) in groups.iter().zip(steps.iter()) {
            assert_eq!(group.len(), step.words(), "Word group does not match its step");
        }
        LinearLayer { groups, steps, cache }
    }

    fn update_step(&mut self, g: usize, input: &mut State, output: &mut State) -> bool {
        let group = &self.groups[g];
        let mut x: Vec<Mask> = group.iter().map(|w| input[*w].clone()).collect();
        let mut y: Vec<Mask> = group.iter().map(|w| output[*w].clone()).collect();

        if !self.steps[g].update_cached(&mut x, &mut y, &self.cache) {
            return false;
        }
        // Write back only what the step tightened; untouched words stay
        // shared between branch snapshots.
        for (j, word) in group.iter().enumerate() {
            if input[*word] != x[j] {
                input[*word] = x[j].clone();
            }
            if output[*word] != y[j] {
                output[*word] = y[j].clone();
            }
        }
        true
    }
}

impl Layer for LinearLayer {
    fn update(&mut self, pos: UpdatePos, input: &mut State, output: &mut State) -> bool {
        match self.groups.iter().position(|group| group.contains(&pos.word)) {
            Some(g) => self.update_step(g, input, output),
            None => true,
        }
    }
}
