//! The Hamsi concatenated state: 16 words of 32 bits. The 4-bit S-box is
//! applied bit-sliced over the four words of each column; the diffusion
//! applies the Serpent-derived L transform to each diagonal of the 4x4
//! word grid.

use std::sync::Arc;

use tern::cache::SharedCache;
use tern::layer::{LinearLayer, SboxLayer};
use tern::linear::LinearStep;
use tern::nonlinear::DistributionTable;
use tern::permutation::Permutation;

use super::Mode;

pub const WORDS: usize = 16;
pub const BITS: usize = 32;

/// The Hamsi 4-bit S-box, top word in the most significant input bit.
pub const SBOX: [u64; 16] = [8, 6, 7, 9, 3, 12, 10, 15, 13, 1, 14, 4, 0, 11, 5, 2];

/// The four word columns fed to the S-box layer.
fn sbox_groups() -> Vec<Vec<usize>> {
    // Reversed so that the top word of a column sits in the most
    // significant S-box input bit of the LSB-first vertical mask.
    (0..4).map(|c| vec![c + 12, c + 8, c + 4, c]).collect()
}

/// The four word diagonals fed to the L transform.
fn diffusion_groups() -> Vec<Vec<usize>> {
    vec![
        vec![0, 5, 10, 15],
        vec![1, 6, 11, 12],
        vec![2, 7, 8, 13],
        vec![3, 4, 9, 14],
    ]
}

/// The L transform of Hamsi over one word quadruple.
fn l(input: &[u64]) -> Vec<u64> {
    let (mut a, mut b, mut c, mut d) = (
        input[0] as u32,
        input[1] as u32,
        input[2] as u32,
        input[3] as u32,
    );
    a = a.rotate_left(13);
    c = c.rotate_left(3);
    b ^= a ^ c;
    d ^= c ^ (a << 3);
    b = b.rotate_left(1);
    d = d.rotate_left(7);
    a ^= b ^ d;
    c ^= d ^ (b << 7);
    a = a.rotate_left(5);
    c = c.rotate_left(22);
    vec![a as u64, b as u64, c as u64, d as u64]
}

/// Build a Hamsi instance of the given number of rounds.
pub fn permutation(rounds: usize, mode: Mode) -> Permutation {
    let table = match mode {
        Mode::Linear => DistributionTable::linear(4, |x| SBOX[x as usize]),
        Mode::Differential => DistributionTable::differential(4, |x| SBOX[x as usize]),
    };
    let table = Arc::new(table);
    let sbox_cache = SharedCache::new(1 << 16);
    let linear_cache = SharedCache::new(1 << 14);

    let sbox_layers = (0..rounds)
        .map(|_| {
            SboxLayer::new(
                sbox_groups(),
                BITS,
                Arc::clone(&table),
                sbox_cache.clone(),
            )
        })
        .collect();
    let linear_layers = (0..rounds)
        .map(|_| {
            let steps = (0..4).map(|_| LinearStep::new(BITS, 4, l)).collect();
            LinearLayer::new(diffusion_groups(), steps, linear_cache.clone())
        })
        .collect();

    Permutation::new(WORDS, BITS, sbox_layers, linear_layers)
}
