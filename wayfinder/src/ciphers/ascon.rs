//! The Ascon permutation: 5 words of 64 bits, a 5-bit S-box applied
//! bit-sliced over all five words, and a per-word rotation-XOR diffusion.

use std::sync::Arc;

use tern::cache::SharedCache;
use tern::layer::{LinearLayer, SboxLayer};
use tern::linear::LinearStep;
use tern::mask::Bit;
use tern::nonlinear::DistributionTable;
use tern::permutation::Permutation;

use super::Mode;

pub const WORDS: usize = 5;
pub const BITS: usize = 64;

/// The 5-bit S-box, word 0 in the most significant input bit.
pub const SBOX: [u64; 32] = [
    4, 11, 31, 20, 26, 21, 9, 2, 27, 5, 8, 18, 29, 3, 6, 28, 30, 19, 7, 14, 0, 13, 17, 24, 16,
    12, 1, 25, 22, 10, 15, 23,
];

/// Rotation amounts of the Sigma functions, one pair per word.
const SIGMA_ROTATIONS: [(u32, u32); 5] = [(19, 28), (61, 39), (1, 6), (10, 17), (7, 41)];

fn sigma(word: usize, x: u64) -> u64 {
    let (r0, r1) = SIGMA_ROTATIONS[word];
    x ^ x.rotate_right(r0) ^ x.rotate_right(r1)
}

/// Build an Ascon instance of the given number of rounds.
pub fn permutation(rounds: usize, mode: Mode) -> Permutation {
    let table = match mode {
        Mode::Linear => DistributionTable::linear(5, |x| SBOX[x as usize]),
        Mode::Differential => DistributionTable::differential(5, |x| SBOX[x as usize]),
    };
    let table = Arc::new(table);
    let sbox_cache = SharedCache::new(1 << 16);
    let linear_cache = SharedCache::new(1 << 14);

    let sbox_layers = (0..rounds)
        .map(|_| {
            // Word 0 is the most significant S-box input bit, so the
            // LSB-first vertical masks list the words in reverse.
            SboxLayer::new(
                vec![(0..WORDS).rev().collect()],
                BITS,
                Arc::clone(&table),
                sbox_cache.clone(),
            )
        })
        .collect();
    let linear_layers = (0..rounds)
        .map(|_| {
            let groups: Vec<Vec<usize>> = (0..WORDS).map(|w| vec![w]).collect();
            let steps = (0..WORDS)
                .map(|w| LinearStep::new(BITS, 1, move |input: &[u64]| vec![sigma(w, input[0])]))
                .collect();
            LinearLayer::new(groups, steps, linear_cache.clone())
        })
        .collect();

    Permutation::new(WORDS, BITS, sbox_layers, linear_layers)
}

/// Force one bit addressed by its flat index (word-major, LSB-first
/// within a word) in the given state.
pub fn set_bit(permutation: &mut Permutation, value: Bit, state: usize, flat_bit: usize) -> bool {
    assert!(flat_bit < WORDS * BITS, "Bit index outside the Ascon state");
    permutation.set_bit(value, state, flat_bit / BITS, flat_bit % BITS)
}
