//! Cipher instantiations and trail-search drivers on top of the `tern`
//! propagation engine.

pub mod ciphers;
pub mod search;
