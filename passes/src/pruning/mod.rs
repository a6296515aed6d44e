//! Near-zero weight pruning.
//!
//! A four-stage pipeline over constant weights:
//!
//! 1. [`init_const_mask`] marks, along the requested dimensions, every slice
//!    of a constant whose elements all fall below a magnitude threshold.
//! 2. [`PropagateMasks`] flows those masks forward through mask-transparent
//!    ops, intersecting where dataflow joins, then narrows every mask to the
//!    slices all of its consumers can absorb. A mask stuck against an
//!    unshrinkable consumer is dropped rather than materialized.
//! 3. [`ShrinkWeights`] materializes each constant's mask as a chain of
//!    Gather ops over the kept indices, rewires the consumers and re-infers
//!    the downstream descriptors.
//! 4. Constant folding collapses the Gather chains into dense constants.
//!
//! Stages 1 and 2 are metadata-only and report no mutation; only stage 3
//! changes the graph structure.

mod init_mask;
mod propagate;
mod shrink;

pub use init_mask::{DEFAULT_THRESHOLD, init_const_mask};
pub use propagate::PropagateMasks;
pub use shrink::ShrinkWeights;

use murre_ir::prelude::*;

use crate::fold::constant_folding;

/// The full pruning pipeline for the given weight dimensions.
pub fn pruning(dims: Vec<usize>, threshold: f64) -> Pipeline {
    Pipeline::new("pruning")
        .with(init_const_mask(dims, threshold))
        .with(PropagateMasks)
        .with(ShrinkWeights)
        .with(constant_folding())
}
