use snafu::Snafu;

use crate::node::{NodeId, ValueRef};
use crate::op::{Arity, OpKind};
use crate::types::{ElementType, Shape};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Raised during node construction when inputs violate an op-kind's
/// arity or type rules. Fatal to that construction call, surfaced to the
/// caller, never silently recovered.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum OpValidationError {
    /// Op kind has no registered schema.
    #[snafu(display("op kind {kind:?} is not registered"))]
    UnknownOpKind { kind: OpKind },

    /// Input count does not satisfy the op-kind's arity rule.
    #[snafu(display("arity mismatch for {kind:?}: expected {expected:?}, got {actual}"))]
    ArityMismatch { kind: OpKind, expected: Arity, actual: usize },

    /// Element type mismatch between operands.
    #[snafu(display("element type mismatch for {kind:?}: {lhs} vs {rhs}"))]
    ElementTypeMismatch { kind: OpKind, lhs: ElementType, rhs: ElementType },

    /// Operand shapes are incompatible for the operation.
    #[snafu(display("shape mismatch for {kind:?}: {lhs} vs {rhs}"))]
    ShapeMismatch { kind: OpKind, lhs: Shape, rhs: Shape },

    /// Required attribute is absent or has the wrong variant.
    #[snafu(display("{kind:?} requires attribute {name:?}"))]
    MissingAttribute { kind: OpKind, name: &'static str },

    /// Reshape target does not preserve the element count.
    #[snafu(display("reshape size mismatch: input size {input_size} != output size {output_size}"))]
    ReshapeSizeMismatch { input_size: usize, output_size: usize },

    /// Constant payload length disagrees with the declared shape.
    #[snafu(display("constant payload has {actual} elements but shape declares {expected}"))]
    ConstPayloadMismatch { expected: usize, actual: usize },

    /// Axis attribute outside the operand's rank.
    #[snafu(display("axis {axis} is invalid for {kind:?} operand of rank {rank}"))]
    AxisOutOfRange { kind: OpKind, axis: i64, rank: usize },

    /// Split dimension not evenly divisible.
    #[snafu(display("cannot split dimension of size {dim} into {parts} equal parts"))]
    SplitUneven { dim: usize, parts: usize },

    /// Gather index operand has a non-integer element type.
    #[snafu(display("gather indices must be integer typed, got {actual}"))]
    GatherIndexType { actual: ElementType },

    /// Gather index outside the gathered dimension.
    #[snafu(display("gather index {index} is out of bounds for dimension of size {dim}"))]
    GatherIndexOutOfBounds { index: i64, dim: usize },

    /// Evaluation requested for an op-kind with no eval entry point.
    #[snafu(display("op kind {kind:?} has no evaluation entry point"))]
    EvalUnsupported { kind: OpKind },
}

/// Raised when a mutation or validation detects a broken structural
/// invariant: a cycle or a dangling reference. Fatal to the enclosing pass.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum GraphInvariantViolation {
    /// Node id does not refer to a live arena slot.
    #[snafu(display("node {node} does not exist in the graph"))]
    MissingNode { node: NodeId },

    /// Value reference points to a dead node or an out-of-range port.
    #[snafu(display("value {value} does not resolve to a live node output"))]
    DanglingValue { value: ValueRef },

    /// The requested mutation would make the dependency relation cyclic.
    #[snafu(display("mutation would introduce a cycle through node {node}"))]
    CycleDetected { node: NodeId },

    /// Replacement target has a different output arity than the original.
    #[snafu(display(
        "cannot replace {old} ({old_ports} outputs) with {new} ({new_ports} outputs)"
    ))]
    OutputArityMismatch { old: NodeId, new: NodeId, old_ports: usize, new_ports: usize },

    /// Input index outside the node's input list.
    #[snafu(display("node {node} has no input slot {index}"))]
    InputIndexOutOfRange { node: NodeId, index: usize },
}

/// Top-level error for operations that can fail either way.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    OpValidation { source: OpValidationError },

    #[snafu(transparent)]
    GraphInvariant { source: GraphInvariantViolation },
}
