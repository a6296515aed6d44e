
use murre_ir::prelude::*;

pub(crate) fn scalar_const(g: &mut Graph, v: f64) -> ValueRef {
    g.add_const(Tensor::scalar(ElementType::F32, v)).unwrap().into()
}

pub(crate) fn vec_const(g: &mut Graph, data: &[f64]) -> ValueRef {
    let shape = smallvec::smallvec![data.len()];
    g.add_const(Tensor::new(ElementType::F32, shape, data.to_vec())).unwrap().into()
}

/// Row-major matrix constant.
pub(crate) fn matrix_const(g: &mut Graph, rows: usize, cols: usize, data: &[f64]) -> ValueRef {
    let shape = smallvec::smallvec![rows, cols];
    g.add_const(Tensor::new(ElementType::F32, shape, data.to_vec())).unwrap().into()
}

pub(crate) fn simple(g: &mut Graph, kind: OpKind, inputs: &[ValueRef]) -> ValueRef {
    g.add_node(kind, AttrMap::new(), inputs).unwrap().into()
}
