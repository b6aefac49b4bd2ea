//! Core engine for searching differential and linear trail characteristics
//! through word-oriented SPN permutations.
//!
//! The engine propagates *partial knowledge* about bit values (a ternary
//! mask per bit: forced-0, forced-1, unknown) through alternating non-linear
//! (S-box) and linear (diffusion) layers until a fixed point is reached or a
//! contradiction is found. Candidate concrete transitions are ranked by
//! their bias (linear mode) or transition count (differential mode).
//!
//! The library knows nothing about concrete ciphers; a cipher is plugged in
//! by supplying word width, word count, round count, the linear functions
//! and the S-box functions. See the `wayfinder` crate for instantiations.

pub mod cache;
pub mod layer;
pub mod linear;
pub mod mask;
pub mod nonlinear;
pub mod permutation;
pub mod state;
