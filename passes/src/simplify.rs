//! Local algebraic identities.
//!
//! Each rule is an ordered alternation over both operand orders where the
//! identity is commutative. Rewrites only fire when the replacement value
//! has exactly the descriptor of the value it stands in for, so a rewrite
//! never loosens a shape downstream.

use murre_ir::pattern::helpers::{one_const, zero_const};
use murre_ir::prelude::*;

pub fn algebraic_simplify() -> PassDriver {
    PassDriver::new("algebraic-simplify")
        .with_rule(add_zero())
        .with_rule(sub_zero())
        .with_rule(mul_one())
        .with_rule(mul_zero())
        .with_rule(double_neg())
}

/// Replace the matched node's value with the binding of `name`, if the
/// descriptors agree.
fn replace_with(
    name: &'static str,
) -> impl Fn(&mut Graph, &PatternMap, NodeId) -> Result<MutationResult, Error> {
    move |graph, bindings, node| {
        let Some(replacement) = bindings.get(name) else {
            return Ok(MutationResult::Unchanged);
        };
        let out = ValueRef::new(node, 0);
        if graph.value_desc(out)? != graph.value_desc(replacement)? {
            return Ok(MutationResult::Unchanged);
        }
        graph.replace_value(out, replacement)?;
        Ok(MutationResult::Mutated)
    }
}

/// `x + 0 = x`, either operand order.
fn add_zero() -> Rule {
    let pattern = Pattern::or(vec![
        Pattern::op(OpKind::Add, vec![Pattern::var("x"), zero_const("z")]),
        Pattern::op(OpKind::Add, vec![zero_const("z"), Pattern::var("x")]),
    ]);
    Rule::new("add-zero", pattern, replace_with("x"))
}

/// `x - 0 = x`.
fn sub_zero() -> Rule {
    let pattern = Pattern::op(OpKind::Sub, vec![Pattern::var("x"), zero_const("z")]);
    Rule::new("sub-zero", pattern, replace_with("x"))
}

/// `x * 1 = x`, either operand order.
fn mul_one() -> Rule {
    let pattern = Pattern::or(vec![
        Pattern::op(OpKind::Mul, vec![Pattern::var("x"), one_const("one")]),
        Pattern::op(OpKind::Mul, vec![one_const("one"), Pattern::var("x")]),
    ]);
    Rule::new("mul-one", pattern, replace_with("x"))
}

/// `x * 0 = 0`: the product collapses onto the zero constant itself.
fn mul_zero() -> Rule {
    let pattern = Pattern::or(vec![
        Pattern::op(OpKind::Mul, vec![Pattern::wildcard(), zero_const("z")]),
        Pattern::op(OpKind::Mul, vec![zero_const("z"), Pattern::wildcard()]),
    ]);
    Rule::new("mul-zero", pattern, replace_with("z"))
}

/// `-(-x) = x`.
fn double_neg() -> Rule {
    let pattern = Pattern::op(OpKind::Neg, vec![Pattern::op(OpKind::Neg, vec![Pattern::var("x")])]);
    Rule::new("double-neg", pattern, replace_with("x"))
}
