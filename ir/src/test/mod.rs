
use crate::prelude::*;

/// Scalar f32 constant, as a value.
pub(crate) fn scalar_const(g: &mut Graph, v: f64) -> ValueRef {
    g.add_const(Tensor::scalar(ElementType::F32, v)).unwrap().into()
}

/// Rank-1 f32 constant, as a value.
pub(crate) fn vec_const(g: &mut Graph, data: &[f64]) -> ValueRef {
    let shape = smallvec::smallvec![data.len()];
    g.add_const(Tensor::new(ElementType::F32, shape, data.to_vec())).unwrap().into()
}

/// Attribute-free node over the given inputs, as a value.
pub(crate) fn simple(g: &mut Graph, kind: OpKind, inputs: &[ValueRef]) -> ValueRef {
    g.add_node(kind, AttrMap::new(), inputs).unwrap().into()
}
