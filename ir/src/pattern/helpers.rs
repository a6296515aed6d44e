//! Common predicates and pattern shorthands shared by the passes.

use crate::graph::Graph;
use crate::node::ValueRef;
use crate::op::OpKind;
use crate::pattern::Pattern;
use crate::types::Tensor;

/// Payload of a value, if it is port 0 of a Const node.
pub fn try_const(graph: &Graph, value: ValueRef) -> Option<Tensor> {
    if value.port != 0 {
        return None;
    }
    graph.constant_tensor(value.node)
}

/// Whether the value is produced by a Const node.
pub fn is_const(graph: &Graph, value: ValueRef) -> bool {
    graph.node(value.node).map(|n| n.kind() == OpKind::Const).unwrap_or(false)
}

/// Whether the value is a constant with every element equal to `expected`.
pub fn const_matches(graph: &Graph, value: ValueRef, expected: f64) -> bool {
    try_const(graph, value).is_some_and(|t| t.data.iter().all(|&v| v == expected))
}

pub fn is_zero(graph: &Graph, value: ValueRef) -> bool {
    const_matches(graph, value, 0.0)
}

pub fn is_one(graph: &Graph, value: ValueRef) -> bool {
    const_matches(graph, value, 1.0)
}

/// Named all-zeros constant.
pub fn zero_const(name: impl Into<String>) -> Pattern {
    Pattern::op(OpKind::Const, vec![]).named_where(name, is_zero)
}

/// Named all-ones constant.
pub fn one_const(name: impl Into<String>) -> Pattern {
    Pattern::op(OpKind::Const, vec![]).named_where(name, is_one)
}
