//! The PRIDE core permutation: 64 bits as four 16-bit rows, held as 8
//! words of 8 bits (row r = words 2r and 2r+1, high byte first). The 4-bit
//! S-box is applied bit-sliced over the four rows; the diffusion mixes
//! each row with its own function, so all four linear steps differ.

use std::sync::Arc;

use tern::cache::SharedCache;
use tern::layer::{LinearLayer, SboxLayer};
use tern::linear::LinearStep;
use tern::nonlinear::DistributionTable;
use tern::permutation::Permutation;

use super::Mode;

pub const WORDS: usize = 8;
pub const BITS: usize = 8;

/// The PRIDE 4-bit S-box, row 0 in the most significant input bit.
pub const SBOX: [u64; 16] = [
    0x0, 0x4, 0x8, 0xf, 0x1, 0x5, 0xe, 0x9, 0x2, 0x7, 0xa, 0xc, 0xb, 0xd, 0x6, 0x3,
];

/// One word quadruple per byte column, row 0 in the most significant
/// S-box input bit of the LSB-first vertical mask.
fn sbox_groups() -> Vec<Vec<usize>> {
    vec![vec![6, 4, 2, 0], vec![7, 5, 3, 1]]
}

/// One (high byte, low byte) pair per row.
fn diffusion_groups() -> Vec<Vec<usize>> {
    (0..4).map(|r| vec![2 * r, 2 * r + 1]).collect()
}

/// The row-specific mix: the outer rows fold their bytes into each other,
/// the inner rows rotate by a nibble.
fn mix_row(row: usize, x: u16) -> u16 {
    let h = x >> 8;
    let l = x & 0xff;
    match row {
        0 => ((h ^ l) << 8) | h,
        1 => x.rotate_left(4),
        2 => x.rotate_right(4),
        3 => (l << 8) | (h ^ l),
        _ => unreachable!("PRIDE has four rows"),
    }
}

/// Build a PRIDE instance of the given number of rounds.
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
            let steps = (0..4)
                .map(|r| {
                    LinearStep::new(BITS, 2, move |input: &[u64]| {
                        let row = ((input[0] as u16) << 8) | input[1] as u16;
                        let mixed = mix_row(r, row);
                        vec![u64::from(mixed >> 8), u64::from(mixed & 0xff)]
                    })
                })
                .collect();
            LinearLayer::new(diffusion_groups(), steps, linear_cache.clone())
        })
        .collect();

    Permutation::new(WORDS, BITS, sbox_layers, linear_layers)
}

#[cfg(test)]
mod test {
    use super::*;
    use tern::mask::Bit;

    #[test]
    fn sbox_is_a_permutation() {
        let mut seen = [false; 16];
        for entry in SBOX.iter() {
            assert!(!seen[*entry as usize]);
            seen[*entry as usize] = true;
        }
    }

    #[test]
    fn row_mixes_are_bijective() {
        for row in 0..4 {
            let mut seen = vec![false; 1 << 16];
            for x in 0..=u16::max_value() {
                let image = mix_row(row, x) as usize;
                assert!(!seen[image], "row {} collides at {:#06x}", row, x);
                seen[image] = true;
            }
        }
    }

    #[test]
    fn groups_partition_the_state() {
        for groups in &[sbox_groups(), diffusion_groups()] {
            let mut seen = vec![false; WORDS];
            for group in groups.iter() {
                for w in group.iter() {
                    assert!(!seen[*w]);
                    seen[*w] = true;
                }
            }
            assert!(seen.iter().all(|s| *s));
        }
    }

    #[test]
    fn rows_use_their_own_diffusion() {
        let mut permutation = permutation(1, Mode::Differential);
        // Pin row 1 after the S-box layer to 0x0001.
        for b in 0..BITS {
            assert!(permutation.set_bit(Bit::Zero, 1, 2, b));
            let value = if b == 0 { Bit::One } else { Bit::Zero };
            assert!(permutation.set_bit(value, 1, 3, b));
        }

        // Row 1 rotates left by a nibble: 0x0001 -> 0x0010.
        assert_eq!(permutation.state(2)[2].value(), Some(0x00));
        assert_eq!(permutation.state(2)[3].value(), Some(0x10));
        // The other rows saw nothing and stay open.
        assert_eq!(permutation.state(2)[0].value(), None);
    }

    #[test]
    fn zero_column_propagates_to_zero() {
        let mut permutation = permutation(1, Mode::Differential);
        for w in &[0usize, 2, 4, 6] {
            assert!(permutation.set_bit(Bit::Zero, 0, *w, 0));
        }
        for w in &[0usize, 2, 4, 6] {
            assert_eq!(permutation.state(1)[*w].bit(0), Bit::Zero);
        }
    }
}
