//! Concrete permutation instances.
//!
//! A cipher module supplies the word shape, the S-box lookup table and the
//! linear diffusion functions, and wires them into a [`Permutation`]. The
//! distribution table and both memo caches are built once per instance and
//! shared across all rounds (and, through cloning, across search branches).

use tern::permutation::Permutation;

pub mod ascon;
pub mod hamsi;
pub mod pride;

/// Which distribution table drives the S-box propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Linear,
    Differential,
}

/// Build a permutation instance by cipher name. Returns `None` for an
/// unsupported name.
pub fn name_to_permutation(name: &str, rounds: usize, mode: Mode) -> Option<Permutation> {
    match name.to_lowercase().as_str() {
        "ascon" => Some(ascon::permutation(rounds, mode)),
        "hamsi" => Some(hamsi::permutation(rounds, mode)),
        "pride" => Some(pride::permutation(rounds, mode)),
        _ => None,
    }
}
