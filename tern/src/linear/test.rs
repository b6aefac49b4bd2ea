use super::*;
use crate::mask::{Bit, Mask};

fn rotl3(x: u64, n: u32) -> u64 {
    ((x << n) | (x >> (3 - n))) & 0b111
}

/// 1-bit rotate-XOR on a 3-bit toy word.
fn rotate_xor(input: &[u64]) -> Vec<u64> {
    vec![input[0] ^ rotl3(input[0], 1)]
}

#[test]
fn forward_propagation_rotate_xor() {
    let step = LinearStep::new(3, 1, rotate_xor);

    // Input [1, ?, 0] (LSB-first), output all unknown
    let mut x = vec![Mask::unknown(3)];
    x[0].set_bit(0, Bit::One);
    x[0].set_bit(2, Bit::Zero);
    let mut y = vec![Mask::unknown(3)];

    assert!(step.update(&mut x, &mut y));

    // y0 = x0 + x2 = 1, y1 = x1 + x0 and y2 = x2 + x1 depend on the
    // unknown x1 and must stay unknown.
    assert_eq!(y[0].bit(0), Bit::One);
    assert_eq!(y[0].bit(1), Bit::Unknown);
    assert_eq!(y[0].bit(2), Bit::Unknown);
    // Input side untouched
    assert_eq!(x[0].bit(0), Bit::One);
    assert_eq!(x[0].bit(1), Bit::Unknown);
    assert_eq!(x[0].bit(2), Bit::Zero);
}

#[test]
fn backward_propagation_through_permutation() {
    // Plain rotation is invertible bit by bit, so a known output pins the
    // whole input.
    let step = LinearStep::new(3, 1, |input: &[u64]| vec![rotl3(input[0], 1)]);

    let mut x = vec![Mask::unknown(3)];
    let mut y = vec![Mask::from_value(3, 0b011)];

    assert!(step.update(&mut x, &mut y));
    assert_eq!(x[0].value(), Some(0b101));
}

#[test]
fn identity_contradiction() {
    // y = x with x forced to 1 and y forced to 0 is infeasible.
    let step = LinearStep::new(1, 1, |input: &[u64]| vec![input[0]]);

    let mut x = vec![Mask::from_value(1, 1)];
    let mut y = vec![Mask::from_value(1, 0)];
    assert!(!step.update(&mut x, &mut y));
}

#[test]
fn singleton_completeness() {
    // With both sides fully determined, update succeeds exactly when the
    // concrete pair satisfies the layer's true function.
    let step = LinearStep::new(3, 1, rotate_xor);

    for x_val in 0..8u64 {
        let expected = rotate_xor(&[x_val])[0];
        for y_val in 0..8u64 {
            let mut x = vec![Mask::from_value(3, x_val)];
            let mut y = vec![Mask::from_value(3, y_val)];
            assert_eq!(
                step.update(&mut x, &mut y),
                y_val == expected,
                "x={:03b} y={:03b}",
                x_val,
                y_val
            );
        }
    }
}

#[test]
fn soundness_never_excludes_true_pair() {
    // Propagating from a mask consistent with a true (x, y) pair never
    // reports contradiction and never narrows a mask to exclude the pair.
    let step = LinearStep::new(3, 1, rotate_xor);

    for x_val in 0..8u64 {
        let y_val = rotate_xor(&[x_val])[0];
        // Leave one input bit unknown at a time
        for hole in 0..3 {
            let mut x = vec![Mask::from_value(3, x_val)];
            x[0].set_bit(hole, Bit::Unknown);
            let mut y = vec![Mask::unknown(3)];

            assert!(step.update(&mut x, &mut y));
            for b in 0..3 {
                if let Some(v) = x[0].value() {
                    assert_eq!(v, x_val);
                }
                match y[0].bit(b) {
                    Bit::Zero => assert_eq!((y_val >> b) & 1, 0),
                    Bit::One => assert_eq!((y_val >> b) & 1, 1),
                    Bit::Unknown => {}
                }
            }
        }
    }
}

#[test]
fn affine_constant_lands_on_rhs() {
    // y = x ^ 0b101
    let step = LinearStep::new(3, 1, |input: &[u64]| vec![input[0] ^ 0b101]);

    let mut x = vec![Mask::from_value(3, 0b010)];
    let mut y = vec![Mask::unknown(3)];
    assert!(step.update(&mut x, &mut y));
    assert_eq!(y[0].value(), Some(0b111));
}

#[test]
fn multi_word_propagation() {
    // Two 2-bit words, swapped and cross-XORed: (a, b) -> (b, a ^ b)
    let step = LinearStep::new(2, 2, |input: &[u64]| {
        vec![input[1], input[0] ^ input[1]]
    });

    let mut x = vec![Mask::from_value(2, 0b01), Mask::from_value(2, 0b10)];
    let mut y = vec![Mask::unknown(2), Mask::unknown(2)];
    assert!(step.update(&mut x, &mut y));
    assert_eq!(y[0].value(), Some(0b10));
    assert_eq!(y[1].value(), Some(0b11));
}

#[test]
fn cached_update_is_transparent() {
    let step = LinearStep::new(3, 1, rotate_xor);
    let cache = SharedCache::new(64);

    for x_val in 0..8u64 {
        let mut x_plain = vec![Mask::from_value(3, x_val)];
        let mut y_plain = vec![Mask::unknown(3)];
        let ok_plain = step.update(&mut x_plain, &mut y_plain);

        // Run twice so the second pass is a guaranteed hit.
        for _ in 0..2 {
            let mut x = vec![Mask::from_value(3, x_val)];
            let mut y = vec![Mask::unknown(3)];
            let ok = step.update_cached(&mut x, &mut y, &cache);
            assert_eq!(ok, ok_plain);
            assert_eq!(x, x_plain);
            assert_eq!(y, y_plain);
        }
    }
}

#[test]
fn shared_cache_keeps_distinct_steps_apart() {
    // Identical mask shapes through two different relations must not
    // read each other's memoized results.
    let identity = LinearStep::new(3, 1, |input: &[u64]| vec![input[0]]);
    let rotate = LinearStep::new(3, 1, |input: &[u64]| vec![rotl3(input[0], 1)]);
    let cache = SharedCache::new(64);

    let mut x = vec![Mask::from_value(3, 0b001)];
    let mut y = vec![Mask::unknown(3)];
    assert!(identity.update_cached(&mut x, &mut y, &cache));
    assert_eq!(y[0].value(), Some(0b001));

    let mut x = vec![Mask::from_value(3, 0b001)];
    let mut y = vec![Mask::unknown(3)];
    assert!(rotate.update_cached(&mut x, &mut y, &cache));
    assert_eq!(y[0].value(), Some(0b010));

    // Same function in a fresh step still hits the shared entries.
    let rotate_again = LinearStep::new(3, 1, |input: &[u64]| vec![rotl3(input[0], 1)]);
    let mut x = vec![Mask::from_value(3, 0b001)];
    let mut y = vec![Mask::unknown(3)];
    assert!(rotate_again.update_cached(&mut x, &mut y, &cache));
    assert_eq!(y[0].value(), Some(0b010));
}

#[test]
fn row_operations() {
    let vars = 4;
    let mut row = Row::x_unit(vars, 1, true);
    let other = Row::x_unit(vars, 1, false);

    assert!(row.is_x_singleton());
    assert!(row.common_variable_with(&other));

    row ^= &other;
    assert!(row.is_contradiction());

    let y = Row::y_unit(vars, 2, false);
    assert!(y.is_y_singleton());
    assert!(!y.common_variable_with(&other));
    assert!(Row::empty(vars).is_empty());
}
