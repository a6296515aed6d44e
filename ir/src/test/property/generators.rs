//! Strategies for generating scalar expression trees.
//!
//! A tree is generated as a plain description first, then lowered into a graph, so
//! shrinking operates on that description rather than on arena indices.

use proptest::prelude::*;

use crate::prelude::*;
use crate::test::scalar_const;

#[derive(Debug, Clone)]
pub enum ExprSpec {
    Leaf(f64),
    Unary(OpKind, Box<ExprSpec>),
    Binary(OpKind, Box<ExprSpec>, Box<ExprSpec>),
}

impl ExprSpec {
    /// Lower the tree into `g`, returning the root value.
    pub fn build(&self, g: &mut Graph) -> ValueRef {
        match self {
            ExprSpec::Leaf(v) => scalar_const(g, *v),
            ExprSpec::Unary(kind, inner) => {
                let input = inner.build(g);
                g.add_node(*kind, AttrMap::new(), &[input]).unwrap().into()
            }
            ExprSpec::Binary(kind, lhs, rhs) => {
                let lhs = lhs.build(g);
                let rhs = rhs.build(g);
                g.add_node(*kind, AttrMap::new(), &[lhs, rhs]).unwrap().into()
            }
        }
    }

    /// Reference evaluation of the tree.
    pub fn eval(&self) -> f64 {
        match self {
            ExprSpec::Leaf(v) => *v,
            ExprSpec::Unary(OpKind::Neg, inner) => -inner.eval(),
            ExprSpec::Unary(_, inner) => inner.eval().max(0.0),
            ExprSpec::Binary(OpKind::Add, lhs, rhs) => lhs.eval() + rhs.eval(),
            ExprSpec::Binary(OpKind::Sub, lhs, rhs) => lhs.eval() - rhs.eval(),
            ExprSpec::Binary(_, lhs, rhs) => lhs.eval() * rhs.eval(),
        }
    }
}

/// Small integer-valued leaves keep every intermediate exactly representable,
/// so reference evaluation and folding can be compared with `==`.
fn arb_leaf() -> impl Strategy<Value = ExprSpec> {
    (-10i64..=10).prop_map(|v| ExprSpec::Leaf(v as f64))
}

pub fn arb_expr() -> impl Strategy<Value = ExprSpec> {
    arb_leaf().prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (prop_oneof![Just(OpKind::Neg), Just(OpKind::Relu)], inner.clone())
                .prop_map(|(kind, e)| ExprSpec::Unary(kind, Box::new(e))),
            (
                prop_oneof![Just(OpKind::Add), Just(OpKind::Sub), Just(OpKind::Mul)],
                inner.clone(),
                inner
            )
                .prop_map(|(kind, l, r)| ExprSpec::Binary(kind, Box::new(l), Box::new(r))),
        ]
    })
}
