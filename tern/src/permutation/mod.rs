//! Round-graph orchestration: states, layers and the propagation worklist.
//!
//! A [`Permutation`] of `R` rounds owns `2R+1` state masks and `R`
//! (S-box layer, linear layer) pairs. S-box layer `i` connects state `2i`
//! to `2i+1`, linear layer `i` connects `2i+1` to `2i+2`. Forcing a bit
//! ([`Permutation::set_bit`]) enqueues its position; draining the worklist
//! re-runs the adjacent layers, which tighten the neighbouring states and
//! enqueue whatever they changed, until a fixed point or a contradiction.
//!
//! Cloning a permutation deep-copies the states and layer bookkeeping but
//! shares the distribution tables and memo caches, which is exactly what a
//! branch-and-bound search wants: branches are independent except for pure
//! memoization.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::BuildHasherDefault;

use ahash::AHasher;

use crate::layer::{Layer, LinearLayer, SboxLayer};
use crate::mask::Bit;
use crate::state::{State, UpdatePos};

/// Worklist of (state index, bit position) pairs still awaiting
/// re-propagation. Pending entries are deduplicated.
#[derive(Debug, Clone, Default)]
pub struct UpdateQueue {
    queue: VecDeque<(usize, UpdatePos)>,
    pending: HashSet<(usize, UpdatePos), BuildHasherDefault<AHasher>>,
}

impl UpdateQueue {
    pub fn push(&mut self, state: usize, pos: UpdatePos) {
        if self.pending.insert((state, pos)) {
            self.queue.push_back((state, pos));
        }
    }

    pub fn pop(&mut self) -> Option<(usize, UpdatePos)> {
        let item = self.queue.pop_front()?;
        self.pending.remove(&item);
        Some(item)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Permutation {
    rounds: usize,
    states: Vec<State>,
    sbox_layers: Vec<SboxLayer>,
    linear_layers: Vec<LinearLayer>,
    queue: UpdateQueue,
}

impl Permutation {
    /// Wire `rounds` alternating layer pairs across `2 * rounds + 1`
    /// all-unknown states and run the initial full propagation.
    pub fn new(
        words: usize,
        bits_per_word: usize,
        sbox_layers: Vec<SboxLayer>,
        linear_layers: Vec<LinearLayer>,
    ) -> Permutation {
        assert_eq!(sbox_layers.len(), linear_layers.len());
        let rounds = sbox_layers.len();
        assert!(rounds >= 1, "A permutation needs at least one round");

        let states = (0..2 * rounds + 1)
            .map(|_| State::unknown(words, bits_per_word))
            .collect();
        let mut permutation = Permutation {
            rounds,
            states,
            sbox_layers,
            linear_layers,
            queue: UpdateQueue::default(),
        };
        // An all-unknown start cannot contradict: every bias table keeps
        // the trivial transition and an unpinned linear system is
        // satisfiable.
        let feasible = permutation.touchall();
        assert!(feasible, "Initial propagation contradicted itself");
        permutation
    }

    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    #[inline]
    pub fn state(&self, index: usize) -> &State {
        &self.states[index]
    }

    #[inline]
    pub fn sbox_layer(&self, round: usize) -> &SboxLayer {
        &self.sbox_layers[round]
    }

    /// Mark every position of every state as changed and propagate to a
    /// fixed point. Returns `false` on contradiction.
    pub fn touchall(&mut self) -> bool {
        for s in 0..self.states.len() {
            for w in 0..self.states[s].word_count() {
                for b in 0..self.states[s].bits_per_word() {
                    self.queue.push(s, UpdatePos::new(w, b));
                }
            }
        }
        self.drain()
    }

    /// Force one bit of one state to a concrete value and propagate.
    /// Returns `false` if the forced value contradicts the trail anywhere
    /// downstream; the engine does not roll back, the caller abandons the
    /// branch instead.
    pub fn set_bit(&mut self, value: Bit, state: usize, word: usize, bit: usize) -> bool {
        assert!(value != Bit::Unknown, "set_bit cannot un-know a bit");
        match self.states[state][word].bit(bit) {
            known if known == value => return true,
            Bit::Unknown => {}
            _ => return false,
        }
        self.states[state][word].set_bit(bit, value);
        self.queue.push(state, UpdatePos::new(word, bit));
        self.drain()
    }

    /// Greedily commit the best transition of S-box `index` in `round`,
    /// then propagate. Returns `false` on contradiction.
    pub fn commit_best(&mut self, round: usize, index: usize) -> bool {
        let (input_idx, output_idx) = (2 * round, 2 * round + 1);
        let before_in = self.states[input_idx].clone();
        let before_out = self.states[output_idx].clone();

        {
            let (head, tail) = self.states.split_at_mut(output_idx);
            self.sbox_layers[round].take_best(index, &mut head[input_idx], &mut tail[0]);
        }
        self.enqueue_diffs(input_idx, &before_in, output_idx, &before_out);
        self.drain()
    }

    /// Commit the `pos`-th ranked transition of S-box `index` in `round`,
    /// then propagate. Returns the candidate count and whether propagation
    /// stayed feasible. Panics if `pos` is out of range.
    pub fn commit_ranked(&mut self, round: usize, index: usize, pos: usize) -> (usize, bool) {
        let (input_idx, output_idx) = (2 * round, 2 * round + 1);
        let before_in = self.states[input_idx].clone();
        let before_out = self.states[output_idx].clone();

        let count = {
            let (head, tail) = self.states.split_at_mut(output_idx);
            self.sbox_layers[round].take_ranked(index, &mut head[input_idx], &mut tail[0], pos)
        };
        self.enqueue_diffs(input_idx, &before_in, output_idx, &before_out);
        let feasible = self.drain();
        (count, feasible)
    }

    /// All (round, S-box index) pairs that still have unknown bits, i.e.
    /// the branching points left for a search driver.
    pub fn guessable(&self) -> Vec<(usize, usize)> {
        let mut open = Vec::new();
        for round in 0..self.rounds {
            let layer = &self.sbox_layers[round];
            for index in 0..layer.num_sboxes() {
                let x = layer.vertical_mask(index, &self.states[2 * round]);
                let y = layer.vertical_mask(index, &self.states[2 * round + 1]);
                if x.unknown_count() > 0 || y.unknown_count() > 0 {
                    open.push((round, index));
                }
            }
        }
        open
    }

    /// Aggregate sign and log2-probability over every active S-box of the
    /// trail. `None` while some S-box is not resolved to a singleton.
    pub fn trail_probability(&self) -> Option<(i8, f64)> {
        let mut sign = 1i8;
        let mut log2 = 0.0f64;
        for round in 0..self.rounds {
            let (s, l) = self.sbox_layers[round]
                .probability(&self.states[2 * round], &self.states[2 * round + 1])?;
            sign *= s;
            log2 += l;
        }
        Some((sign, log2))
    }

    /// Number of active S-boxes across all rounds, a cheap upper-bound
    /// indicator of the trail's weight.
    pub fn active_sboxes(&self) -> usize {
        let mut count = 0;
        for round in 0..self.rounds {
            let layer = &self.sbox_layers[round];
            for index in 0..layer.num_sboxes() {
                let x = layer.vertical_mask(index, &self.states[2 * round]);
                let y = layer.vertical_mask(index, &self.states[2 * round + 1]);
                if x.care() & x.canbe1() != 0 || y.care() & y.canbe1() != 0 {
                    count += 1;
                }
            }
        }
        count
    }

    /// Drain the worklist until fixed point. On contradiction the queue is
    /// flushed and `false` returned; the permutation's states are then
    /// partially tightened and only good for being dropped.
    fn drain(&mut self) -> bool {
        let rounds = self.rounds;
        while let Some((s, pos)) = self.queue.pop() {
            // S-box layer with state s on its input side
            if s % 2 == 0 && s / 2 < rounds {
                let ok = run_layer(
                    &mut self.sbox_layers[s / 2],
                    pos,
                    &mut self.states,
                    s,
                    s + 1,
                    &mut self.queue,
                );
                if !ok {
                    self.queue.clear();
                    return false;
                }
            }
            // Linear layer with state s on its output side
            if s % 2 == 0 && s > 0 {
                let ok = run_layer(
                    &mut self.linear_layers[s / 2 - 1],
                    pos,
                    &mut self.states,
                    s - 1,
                    s,
                    &mut self.queue,
                );
                if !ok {
                    self.queue.clear();
                    return false;
                }
            }
            if s % 2 == 1 {
                // S-box layer with state s on its output side
                let ok = run_layer(
                    &mut self.sbox_layers[s / 2],
                    pos,
                    &mut self.states,
                    s - 1,
                    s,
                    &mut self.queue,
                );
                if !ok {
                    self.queue.clear();
                    return false;
                }
                // Linear layer with state s on its input side
                let ok = run_layer(
                    &mut self.linear_layers[s / 2],
                    pos,
                    &mut self.states,
                    s,
                    s + 1,
                    &mut self.queue,
                );
                if !ok {
                    self.queue.clear();
                    return false;
                }
            }
        }
        true
    }

    fn enqueue_diffs(
        &mut self,
        input_idx: usize,
        before_in: &State,
        output_idx: usize,
        before_out: &State,
    ) {
        for pos in self.states[input_idx].diff(before_in) {
            self.queue.push(input_idx, pos);
        }
        for pos in self.states[output_idx].diff(before_out) {
            self.queue.push(output_idx, pos);
        }
    }
}

/// Re-run one layer after `pos` changed in one of its states, then enqueue
/// every position the layer tightened in turn.
fn run_layer<L: Layer>(
    layer: &mut L,
    pos: UpdatePos,
    states: &mut [State],
    input_idx: usize,
    output_idx: usize,
    queue: &mut UpdateQueue,
) -> bool {
    debug_assert_eq!(input_idx + 1, output_idx);
    let before_in = states[input_idx].clone();
    let before_out = states[output_idx].clone();

    let (head, tail) = states.split_at_mut(output_idx);
    if !layer.update(pos, &mut head[input_idx], &mut tail[0]) {
        return false;
    }

    for changed in states[input_idx].diff(&before_in) {
        queue.push(input_idx, changed);
    }
    for changed in states[output_idx].diff(&before_out) {
        queue.push(output_idx, changed);
    }
    true
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, state) in self.states.iter().enumerate() {
            if i % 2 == 0 {
                writeln!(f, "--- round boundary {} ---", i / 2)?;
            } else {
                writeln!(f, "--- after S-box layer {} ---", i / 2)?;
            }
            write!(f, "{}", state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
