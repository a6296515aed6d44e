//! Op kinds and the op-kind registry.
//!
//! The op set is closed, so kinds are a plain tagged enum and the registry is
//! a table built once and shared between graphs. Each schema carries:
//!
//! - an arity rule checked at construction time,
//! - a type/shape-inference function producing the output descriptors,
//! - an optional evaluation entry point (consumed by constant folding),
//! - an optional mask-transfer rule (consumed by pruning's mask propagation).
//!
//! Concrete numeric kernels live outside this crate; the eval hooks here are
//! only as precise as folding needs.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use smallvec::{SmallVec, smallvec};

use crate::error::OpValidationError;
use crate::node::OutputDesc;
use crate::types::{AttrMap, Dim, ElementType, Mask, Shape, Tensor};

/// Operation kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Free graph input. No inputs; type and shape come from attributes.
    Parameter,
    /// Dense constant. Payload lives in the `value` attribute.
    Const,
    Add,
    Sub,
    Mul,
    Neg,
    Relu,
    MatMul,
    Reshape,
    /// Index selection along one axis: `Gather(data, indices)` with an
    /// `axis` attribute. Inserted by weight shrinking.
    Gather,
    /// Even split along one axis into `parts` outputs. The only builtin
    /// multi-output op.
    Split,
}

/// Arity rule for an op kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, actual: usize) -> bool {
        match self {
            Arity::Exact(n) => actual == *n,
            Arity::AtLeast(n) => actual >= *n,
        }
    }
}

/// Type/shape-inference function: attributes + input descriptors to output
/// descriptors.
pub type InferFn =
    fn(OpKind, &AttrMap, &[OutputDesc]) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError>;

/// Evaluation entry point over dense payloads, for constant folding.
pub type EvalFn =
    fn(OpKind, &AttrMap, &[Tensor]) -> Result<SmallVec<[Tensor; 2]>, OpValidationError>;

/// Mask-transfer rule: masks on the inputs to the mask on the (single)
/// output. Ops without a rule stop mask propagation.
pub type MaskTransferFn = fn(&AttrMap, &[Option<&Mask>]) -> Option<Mask>;

/// Per-kind behavior consulted by `Graph::add_node` and the passes.
pub struct OpSchema {
    pub arity: Arity,
    pub infer: InferFn,
    pub eval: Option<EvalFn>,
    pub mask_transfer: Option<MaskTransferFn>,
}

/// Registry mapping op-kind tags to their schemas.
pub struct OpRegistry {
    schemas: HashMap<OpKind, OpSchema>,
}

impl OpRegistry {
    /// Registry with every builtin op kind.
    pub fn builtin() -> Self {
        let mut r = OpRegistry { schemas: HashMap::new() };

        r.register(OpKind::Parameter, OpSchema {
            arity: Arity::Exact(0),
            infer: infer_from_attrs,
            eval: None,
            mask_transfer: None,
        });
        r.register(OpKind::Const, OpSchema {
            arity: Arity::Exact(0),
            infer: infer_const,
            eval: None,
            mask_transfer: None,
        });
        for kind in [OpKind::Add, OpKind::Sub, OpKind::Mul] {
            r.register(kind, OpSchema {
                arity: Arity::Exact(2),
                infer: infer_elementwise_binary,
                eval: Some(eval_elementwise_binary),
                mask_transfer: Some(transfer_intersect),
            });
        }
        for kind in [OpKind::Neg, OpKind::Relu] {
            r.register(kind, OpSchema {
                arity: Arity::Exact(1),
                infer: infer_elementwise_unary,
                eval: Some(eval_elementwise_unary),
                mask_transfer: Some(transfer_forward),
            });
        }
        r.register(OpKind::MatMul, OpSchema {
            arity: Arity::Exact(2),
            infer: infer_matmul,
            eval: None,
            mask_transfer: Some(transfer_matmul),
        });
        r.register(OpKind::Reshape, OpSchema {
            arity: Arity::Exact(1),
            infer: infer_reshape,
            eval: Some(eval_reshape),
            mask_transfer: None,
        });
        r.register(OpKind::Gather, OpSchema {
            arity: Arity::Exact(2),
            infer: infer_gather,
            eval: Some(eval_gather),
            mask_transfer: None,
        });
        r.register(OpKind::Split, OpSchema {
            arity: Arity::Exact(1),
            infer: infer_split,
            eval: None,
            mask_transfer: None,
        });
        r
    }

    /// The builtin registry, built once and shared between graphs.
    pub fn shared() -> Arc<OpRegistry> {
        static SHARED: OnceLock<Arc<OpRegistry>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(OpRegistry::builtin())).clone()
    }

    pub fn register(&mut self, kind: OpKind, schema: OpSchema) {
        self.schemas.insert(kind, schema);
    }

    pub fn schema(&self, kind: OpKind) -> Option<&OpSchema> {
        self.schemas.get(&kind)
    }
}

// ===== Attribute helpers =====

fn require_elem(kind: OpKind, attrs: &AttrMap) -> Result<ElementType, OpValidationError> {
    attrs
        .get("elem")
        .and_then(|a| a.as_str())
        .and_then(ElementType::parse)
        .ok_or(OpValidationError::MissingAttribute { kind, name: "elem" })
}

fn require_ints<'a>(
    kind: OpKind,
    attrs: &'a AttrMap,
    name: &'static str,
) -> Result<&'a [i64], OpValidationError> {
    attrs
        .get(name)
        .and_then(|a| a.as_ints())
        .ok_or(OpValidationError::MissingAttribute { kind, name })
}

fn require_int(kind: OpKind, attrs: &AttrMap, name: &'static str) -> Result<i64, OpValidationError> {
    attrs
        .get(name)
        .and_then(|a| a.as_int())
        .ok_or(OpValidationError::MissingAttribute { kind, name })
}

fn shape_from_ints(dims: &[i64]) -> Shape {
    Shape(dims.iter().map(|&d| if d < 0 { Dim::Dynamic } else { Dim::Static(d as usize) }).collect())
}

// ===== Inference rules =====

/// Parameter: type and shape are declared, not inferred. Negative dims are
/// statically unknown.
fn infer_from_attrs(
    kind: OpKind,
    attrs: &AttrMap,
    _inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let elem = require_elem(kind, attrs)?;
    let shape = shape_from_ints(require_ints(kind, attrs, "shape")?);
    Ok(smallvec![OutputDesc::new(elem, shape)])
}

/// Const: declared shape must be static and agree with the payload length.
fn infer_const(
    kind: OpKind,
    attrs: &AttrMap,
    _inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let elem = require_elem(kind, attrs)?;
    let shape = shape_from_ints(require_ints(kind, attrs, "shape")?);
    let expected = shape
        .num_elements()
        .ok_or(OpValidationError::MissingAttribute { kind, name: "shape" })?;
    let actual = attrs
        .get("value")
        .and_then(|a| a.as_floats())
        .ok_or(OpValidationError::MissingAttribute { kind, name: "value" })?
        .len();
    if actual != expected {
        return Err(OpValidationError::ConstPayloadMismatch { expected, actual });
    }
    Ok(smallvec![OutputDesc::new(elem, shape)])
}

fn infer_elementwise_unary(
    _kind: OpKind,
    _attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    Ok(smallvec![inputs[0].clone()])
}

fn infer_elementwise_binary(
    kind: OpKind,
    _attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    if lhs.elem != rhs.elem {
        return Err(OpValidationError::ElementTypeMismatch { kind, lhs: lhs.elem, rhs: rhs.elem });
    }
    if lhs.shape.rank() != rhs.shape.rank()
        || !lhs.shape.0.iter().zip(&rhs.shape.0).all(|(a, b)| a.compatible(b))
    {
        return Err(OpValidationError::ShapeMismatch {
            kind,
            lhs: lhs.shape.clone(),
            rhs: rhs.shape.clone(),
        });
    }
    let dims = lhs.shape.0.iter().zip(&rhs.shape.0).map(|(a, b)| a.merge(b)).collect();
    Ok(smallvec![OutputDesc::new(lhs.elem, Shape(dims))])
}

fn infer_matmul(
    kind: OpKind,
    _attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    let mismatch = || OpValidationError::ShapeMismatch {
        kind,
        lhs: lhs.shape.clone(),
        rhs: rhs.shape.clone(),
    };
    if lhs.elem != rhs.elem {
        return Err(OpValidationError::ElementTypeMismatch { kind, lhs: lhs.elem, rhs: rhs.elem });
    }
    if lhs.shape.rank() != 2 || rhs.shape.rank() != 2 {
        return Err(mismatch());
    }
    let (k_lhs, k_rhs) = (lhs.shape.0[1], rhs.shape.0[0]);
    if !k_lhs.compatible(&k_rhs) {
        return Err(mismatch());
    }
    let shape = Shape(smallvec![lhs.shape.0[0], rhs.shape.0[1]]);
    Ok(smallvec![OutputDesc::new(lhs.elem, shape)])
}

/// Reshape: the target shape is the `shape` attribute, fully static. The
/// element count must be preserved when the input is statically known.
fn infer_reshape(
    kind: OpKind,
    attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let target = shape_from_ints(require_ints(kind, attrs, "shape")?);
    let output_size = target
        .num_elements()
        .ok_or(OpValidationError::MissingAttribute { kind, name: "shape" })?;
    if let Some(input_size) = inputs[0].shape.num_elements() {
        if input_size != output_size {
            return Err(OpValidationError::ReshapeSizeMismatch { input_size, output_size });
        }
    }
    Ok(smallvec![OutputDesc::new(inputs[0].elem, target)])
}

fn infer_gather(
    kind: OpKind,
    attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let (data, indices) = (&inputs[0], &inputs[1]);
    if !indices.elem.is_integer() {
        return Err(OpValidationError::GatherIndexType { actual: indices.elem });
    }
    if indices.shape.rank() != 1 {
        return Err(OpValidationError::ShapeMismatch {
            kind,
            lhs: data.shape.clone(),
            rhs: indices.shape.clone(),
        });
    }
    let axis = require_int(kind, attrs, "axis")?;
    if axis < 0 || axis as usize >= data.shape.rank() {
        return Err(OpValidationError::AxisOutOfRange { kind, axis, rank: data.shape.rank() });
    }
    let mut dims = data.shape.0.clone();
    dims[axis as usize] = indices.shape.0[0];
    Ok(smallvec![OutputDesc::new(data.elem, Shape(dims))])
}

fn infer_split(
    kind: OpKind,
    attrs: &AttrMap,
    inputs: &[OutputDesc],
) -> Result<SmallVec<[OutputDesc; 2]>, OpValidationError> {
    let input = &inputs[0];
    let axis = require_int(kind, attrs, "axis")?;
    let parts = require_int(kind, attrs, "parts")?;
    if axis < 0 || axis as usize >= input.shape.rank() {
        return Err(OpValidationError::AxisOutOfRange { kind, axis, rank: input.shape.rank() });
    }
    if parts < 1 {
        return Err(OpValidationError::MissingAttribute { kind, name: "parts" });
    }
    let parts = parts as usize;
    let part_dim = match input.shape.0[axis as usize] {
        Dim::Static(n) => {
            if n % parts != 0 {
                return Err(OpValidationError::SplitUneven { dim: n, parts });
            }
            Dim::Static(n / parts)
        }
        Dim::Dynamic => Dim::Dynamic,
    };
    let mut dims = input.shape.0.clone();
    dims[axis as usize] = part_dim;
    let desc = OutputDesc::new(input.elem, Shape(dims));
    Ok((0..parts).map(|_| desc.clone()).collect())
}

// ===== Evaluation entry points =====

fn eval_elementwise_binary(
    kind: OpKind,
    _attrs: &AttrMap,
    inputs: &[Tensor],
) -> Result<SmallVec<[Tensor; 2]>, OpValidationError> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    let f: fn(f64, f64) -> f64 = match kind {
        OpKind::Sub => |a, b| a - b,
        OpKind::Mul => |a, b| a * b,
        _ => |a, b| a + b,
    };
    let data = lhs.data.iter().zip(&rhs.data).map(|(&a, &b)| f(a, b)).collect();
    Ok(smallvec![Tensor::new(lhs.elem, lhs.shape.clone(), data)])
}

fn eval_elementwise_unary(
    kind: OpKind,
    _attrs: &AttrMap,
    inputs: &[Tensor],
) -> Result<SmallVec<[Tensor; 2]>, OpValidationError> {
    let input = &inputs[0];
    let f: fn(f64) -> f64 = match kind {
        OpKind::Relu => |v| v.max(0.0),
        _ => |v| -v,
    };
    let data = input.data.iter().map(|&v| f(v)).collect();
    Ok(smallvec![Tensor::new(input.elem, input.shape.clone(), data)])
}

fn eval_reshape(
    kind: OpKind,
    attrs: &AttrMap,
    inputs: &[Tensor],
) -> Result<SmallVec<[Tensor; 2]>, OpValidationError> {
    let target = require_ints(kind, attrs, "shape")?;
    let shape: SmallVec<[usize; 4]> = target.iter().map(|&d| d as usize).collect();
    Ok(smallvec![Tensor::new(inputs[0].elem, shape, inputs[0].data.clone())])
}

fn eval_gather(
    kind: OpKind,
    attrs: &AttrMap,
    inputs: &[Tensor],
) -> Result<SmallVec<[Tensor; 2]>, OpValidationError> {
    let (data, indices) = (&inputs[0], &inputs[1]);
    let axis = require_int(kind, attrs, "axis")? as usize;
    let axis_len = data.shape[axis];

    let outer: usize = data.shape[..axis].iter().product();
    let inner: usize = data.shape[axis + 1..].iter().product();

    let mut out = Vec::with_capacity(outer * indices.data.len() * inner);
    for o in 0..outer {
        for &idx in &indices.data {
            if idx < 0.0 || idx as usize >= axis_len {
                return Err(OpValidationError::GatherIndexOutOfBounds {
                    index: idx as i64,
                    dim: axis_len,
                });
            }
            let base = (o * axis_len + idx as usize) * inner;
            out.extend_from_slice(&data.data[base..base + inner]);
        }
    }
    let mut shape = data.shape.clone();
    shape[axis] = indices.data.len();
    Ok(smallvec![Tensor::new(data.elem, shape, out)])
}

// ===== Mask-transfer rules =====

/// Elementwise unary: the output keeps exactly the input's mask.
fn transfer_forward(_attrs: &AttrMap, inputs: &[Option<&Mask>]) -> Option<Mask> {
    inputs[0].cloned()
}

/// Elementwise binary: an element is prunable only when both operands agree,
/// so the output mask is the per-dimension intersection. A missing operand
/// mask stops propagation.
fn transfer_intersect(_attrs: &AttrMap, inputs: &[Option<&Mask>]) -> Option<Mask> {
    match (inputs[0], inputs[1]) {
        (Some(a), Some(b)) if a.rank() == b.rank() => Some(a.intersect(b)),
        _ => None,
    }
}

/// Matrix product: lhs row masks and rhs column masks survive into the
/// product. Reduction-dim masks never reach the output; whether they are
/// legal at all is a question for the consumer-acceptance check, not for
/// the transfer.
fn transfer_matmul(_attrs: &AttrMap, inputs: &[Option<&Mask>]) -> Option<Mask> {
    let mut out = Mask::new(2);
    if let Some(lhs) = inputs[0].filter(|m| m.rank() == 2) {
        out.at_mut(0).extend(lhs.at(0).iter().copied());
    }
    if let Some(rhs) = inputs[1].filter(|m| m.rank() == 2) {
        out.at_mut(1).extend(rhs.at(1).iter().copied());
    }
    Some(out)
}
