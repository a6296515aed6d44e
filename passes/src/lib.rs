//! Optimization passes over the murre graph IR.
//!
//! Three families:
//!
//! - [`fold`]: constant folding through the op registry's evaluation entry
//!   points.
//! - [`simplify`]: local algebraic identities (`x + 0`, `x * 1`, `--x`, ...).
//! - [`pruning`]: near-zero weight elimination, from mask initialization to
//!   shrunk constants.

pub mod fold;
pub mod pruning;
pub mod simplify;

pub use fold::constant_folding;
pub use pruning::{PropagateMasks, ShrinkWeights, init_const_mask, pruning};
pub use simplify::algebraic_simplify;

#[cfg(test)]
mod test;
