//! Common imports for working with graphs and rewrites.
//!
//! ```rust,ignore
//! use murre_ir::prelude::*;
//! ```

pub use crate::error::{Error, GraphInvariantViolation, OpValidationError, Result};
pub use crate::graph::Graph;
pub use crate::matcher::{Matcher, PatternMap, match_pattern};
pub use crate::node::{Node, NodeId, OutputDesc, ValueRef};
pub use crate::op::{OpKind, OpRegistry};
pub use crate::pattern::Pattern;
pub use crate::rewrite::{
    Convergence, FixedPoint, MutationResult, Pass, PassDriver, Pipeline, Rule,
};
pub use crate::types::{AttrMap, AttrValue, Dim, ElementType, Mask, Shape, Tensor};
