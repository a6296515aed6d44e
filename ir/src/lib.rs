//! Graph IR and rewrite machinery for the murre compiler.
//!
//! This crate is the optimizing core: a mutable dataflow graph with arena
//! ownership and stable indices, a declarative pattern language over graph
//! values, a backtracking matcher with checkpoint/rollback, and the
//! rule/pass-driver layer every structural optimization is expressed
//! through.
//!
//! # Module Organization
//!
//! - [`types`] - Element types, shapes, attributes, constant payloads, masks
//! - [`op`] - Op-kind tags and the registry of per-kind schemas
//! - [`node`] / [`graph`] - The owned computation graph and its mutations
//! - [`pattern`] - Pattern combinators
//! - [`matcher`] - Backtracking unification with pattern maps
//! - [`rewrite`] - Rules, pass drivers, pipelines, fixed-point iteration
//!
//! Graph mutation is single-threaded by design; independent graphs may be
//! processed on separate threads with no shared mutable state.

pub mod error;
pub mod graph;
pub mod matcher;
pub mod node;
pub mod op;
pub mod pattern;
pub mod prelude;
pub mod rewrite;
pub mod types;

#[cfg(test)]
mod test;

pub use error::{Error, GraphInvariantViolation, OpValidationError, Result};
pub use graph::Graph;
pub use matcher::{Checkpoint, Matcher, PatternMap, match_pattern};
pub use node::{Consumer, Node, NodeId, OutputDesc, ValueRef};
pub use op::{Arity, OpKind, OpRegistry, OpSchema};
pub use pattern::{Pattern, Predicate};
pub use rewrite::{Convergence, FixedPoint, MutationResult, Pass, PassDriver, Pipeline, Rule};
pub use types::{AttrMap, AttrValue, Dim, ElementType, Mask, Shape, Tensor};
