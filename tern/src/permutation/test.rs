use std::sync::Arc;

use super::*;
use crate::cache::SharedCache;
use crate::layer::{LinearLayer, SboxLayer};
use crate::linear::LinearStep;
use crate::nonlinear::DistributionTable;

fn rotl2(x: u64) -> u64 {
    ((x << 1) | (x >> 1)) & 0b11
}

/// Toy cipher: 2 words of 2 bits. The S-box layer slices the identity
/// 2-bit S-box vertically over both words (2 S-boxes per round), the
/// linear layer rotates each word left by one.
fn toy_permutation(rounds: usize) -> Permutation {
    let table = Arc::new(DistributionTable::linear(2, |x| x));
    let sbox_cache = SharedCache::new(1024);
    let linear_cache = SharedCache::new(1024);

    let sbox_layers = (0..rounds)
        .map(|_| {
            SboxLayer::new(
                vec![vec![0, 1]],
                2,
                Arc::clone(&table),
                sbox_cache.clone(),
            )
        })
        .collect();
    let linear_layers = (0..rounds)
        .map(|_| {
            let steps = vec![
                LinearStep::new(2, 1, |input: &[u64]| vec![rotl2(input[0])]),
                LinearStep::new(2, 1, |input: &[u64]| vec![rotl2(input[0])]),
            ];
            LinearLayer::new(vec![vec![0], vec![1]], steps, linear_cache.clone())
        })
        .collect();

    Permutation::new(2, 2, sbox_layers, linear_layers)
}

#[test]
fn construction_reaches_trivial_fixed_point() {
    let permutation = toy_permutation(2);
    // All-unknown start carries no information; nothing may be forced.
    for i in 0..5 {
        assert!(!permutation.state(i).is_determined());
        for w in 0..2 {
            assert_eq!(permutation.state(i)[w].care(), 0);
        }
    }
    assert_eq!(permutation.guessable().len(), 4);
}

#[test]
fn forward_propagation_through_both_layers() {
    let mut permutation = toy_permutation(1);

    assert!(permutation.set_bit(Bit::One, 0, 0, 0));
    assert!(permutation.set_bit(Bit::Zero, 0, 1, 0));

    // Identity S-box copies the determined slice 0
    assert_eq!(permutation.state(1)[0].bit(0), Bit::One);
    assert_eq!(permutation.state(1)[1].bit(0), Bit::Zero);
    // Rotation moves it to bit 1 of the last state
    assert_eq!(permutation.state(2)[0].bit(1), Bit::One);
    assert_eq!(permutation.state(2)[1].bit(1), Bit::Zero);
    // The untouched slice stays unknown everywhere
    assert_eq!(permutation.state(1)[0].bit(1), Bit::Unknown);
    assert_eq!(permutation.state(2)[0].bit(0), Bit::Unknown);
}

#[test]
fn backward_propagation_resolves_input() {
    let mut permutation = toy_permutation(1);

    // Pin the full output state
    assert!(permutation.set_bit(Bit::One, 2, 0, 1));
    assert!(permutation.set_bit(Bit::Zero, 2, 0, 0));
    assert!(permutation.set_bit(Bit::Zero, 2, 1, 0));
    assert!(permutation.set_bit(Bit::Zero, 2, 1, 1));

    // Undo the rotation, then the identity S-box
    assert_eq!(permutation.state(1)[0].value(), Some(0b01));
    assert_eq!(permutation.state(1)[1].value(), Some(0b00));
    assert_eq!(permutation.state(0)[0].value(), Some(0b01));
    assert_eq!(permutation.state(0)[1].value(), Some(0b00));
    assert!(permutation.guessable().is_empty());
}

#[test]
fn contradicting_set_bit_reports_false() {
    let mut permutation = toy_permutation(1);

    assert!(permutation.set_bit(Bit::One, 0, 0, 0));
    assert!(permutation.set_bit(Bit::Zero, 0, 1, 0));
    // Propagation already forced this bit to One
    assert!(!permutation.set_bit(Bit::Zero, 2, 0, 1));
}

#[test]
fn set_bit_is_idempotent_on_known_bits() {
    let mut permutation = toy_permutation(1);
    assert!(permutation.set_bit(Bit::One, 0, 0, 0));
    assert!(permutation.set_bit(Bit::One, 0, 0, 0));
}

#[test]
fn clone_independence() {
    let mut original = toy_permutation(2);
    assert!(original.set_bit(Bit::One, 0, 0, 0));

    let mut branch = original.clone();
    assert!(branch.set_bit(Bit::Zero, 0, 1, 0));
    assert!(branch.set_bit(Bit::One, 0, 0, 1));

    // The original never saw the branch's constraints
    assert_eq!(original.state(0)[1].bit(0), Bit::Unknown);
    assert_eq!(original.state(0)[0].bit(1), Bit::Unknown);
    assert_eq!(original.state(0)[0].bit(0), Bit::One);
}

#[test]
fn trail_probability_after_resolution() {
    let mut permutation = toy_permutation(1);
    assert!(permutation.trail_probability().is_none());

    assert!(permutation.set_bit(Bit::One, 2, 0, 1));
    assert!(permutation.set_bit(Bit::Zero, 2, 0, 0));
    assert!(permutation.set_bit(Bit::Zero, 2, 1, 0));
    assert!(permutation.set_bit(Bit::Zero, 2, 1, 1));

    // One active S-box (slice 0, transition 01 -> 01): the identity table
    // entry weighs 2 out of 2^2, so log2 = 1 - 2 = -1.
    assert_eq!(permutation.active_sboxes(), 1);
    let (sign, log2) = permutation.trail_probability().unwrap();
    assert_eq!(sign, 1);
    assert!((log2 - (-1.0)).abs() < 1e-9);
}

#[test]
fn commit_ranked_enumerates_branches() {
    // The identity S-box under all-unknown masks has four candidates per
    // slice. Committing each rank in a fresh clone must stay feasible and
    // resolve the slice.
    let base = toy_permutation(1);
    let (round, index) = base.guessable()[0];

    let mut seen = Vec::new();
    for pos in 0..4 {
        let mut branch = base.clone();
        let (count, feasible) = branch.commit_ranked(round, index, pos);
        assert_eq!(count, 4);
        assert!(feasible);

        let x = branch.sbox_layer(round).vertical_mask(index, branch.state(2 * round));
        let y = branch
            .sbox_layer(round)
            .vertical_mask(index, branch.state(2 * round + 1));
        assert_eq!(x.value(), y.value());
        seen.push(x.value().unwrap());
    }
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn commit_best_resolves_a_box() {
    let mut permutation = toy_permutation(2);
    let open_before = permutation.guessable().len();
    let (round, index) = permutation.guessable()[0];

    assert!(permutation.commit_best(round, index));
    assert!(permutation.guessable().len() < open_before);
}

#[test]
fn update_queue_dedupes_pending_entries() {
    let mut queue = UpdateQueue::default();
    queue.push(0, UpdatePos::new(0, 0));
    queue.push(0, UpdatePos::new(0, 0));
    queue.push(1, UpdatePos::new(0, 0));

    assert_eq!(queue.pop(), Some((0, UpdatePos::new(0, 0))));
    assert_eq!(queue.pop(), Some((1, UpdatePos::new(0, 0))));
    assert_eq!(queue.pop(), None);
    assert!(queue.is_empty());
}
