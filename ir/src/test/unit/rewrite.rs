//! Rule application, driver ordering, pipelines and fixed-point tests.

use std::cell::Cell;
use std::rc::Rc;

use crate::pattern::helpers;
use crate::prelude::*;
use crate::test::{scalar_const, simple};

/// Folds `Add(const, const)` into a fresh constant.
fn fold_add_rule() -> Rule {
    let pattern = Pattern::op(OpKind::Add, vec![Pattern::cvar("a"), Pattern::cvar("b")]);
    Rule::new("fold-add", pattern, |graph, bindings, node| {
        let (Some(a), Some(b)) = (bindings.get("a"), bindings.get("b")) else {
            return Ok(MutationResult::Unchanged);
        };
        let (Some(lhs), Some(rhs)) =
            (helpers::try_const(graph, a), helpers::try_const(graph, b))
        else {
            return Ok(MutationResult::Unchanged);
        };
        let data = lhs.data.iter().zip(&rhs.data).map(|(&x, &y)| x + y).collect();
        let folded = graph.add_const(Tensor::new(lhs.elem, lhs.shape, data))?;
        graph.replace_node(node, folded)?;
        Ok(MutationResult::Mutated)
    })
}

// =========================================================================
// Single rules
// =========================================================================

#[test]
fn test_rule_rewrites_on_match() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    g.add_result(sum).unwrap();

    let mut pass = PassDriver::new("fold").with_rule(fold_add_rule());
    assert!(pass.run(&mut g).unwrap().mutated());

    assert_eq!(g.num_live_nodes(), 1);
    let result = g.results()[0];
    assert_eq!(g.constant_tensor(result.node).unwrap().data, vec![5.0]);
    g.validate().unwrap();
}

#[test]
fn test_rule_mismatch_reports_unchanged() {
    let mut g = Graph::new();
    let p = g.add_parameter(ElementType::F32, Shape::scalar()).unwrap();
    let sum = simple(&mut g, OpKind::Add, &[p.into(), p.into()]);
    g.add_result(sum).unwrap();

    let mut pass = PassDriver::new("fold").with_rule(fold_add_rule());
    assert!(!pass.run(&mut g).unwrap().mutated());
    assert!(g.contains(sum.node));
}

#[test]
fn test_cascading_folds_in_one_traversal() {
    // (1 + 2) + 3: folding the inner sum makes the outer one foldable
    // later in the same topologically ordered sweep.
    let mut g = Graph::new();
    let one = scalar_const(&mut g, 1.0);
    let two = scalar_const(&mut g, 2.0);
    let three = scalar_const(&mut g, 3.0);
    let inner = simple(&mut g, OpKind::Add, &[one, two]);
    let outer = simple(&mut g, OpKind::Add, &[inner, three]);
    g.add_result(outer).unwrap();

    let mut pass = PassDriver::new("fold").with_rule(fold_add_rule());
    assert!(pass.run(&mut g).unwrap().mutated());
    assert_eq!(g.num_live_nodes(), 1);
    assert_eq!(g.constant_tensor(g.results()[0].node).unwrap().data, vec![6.0]);
}

// =========================================================================
// Rule ordering
// =========================================================================

#[test]
fn test_first_mutating_rule_preempts_later_rules() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    g.add_result(sum).unwrap();

    let calls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&calls);
    let observer = Rule::new("observer", Pattern::wildcard(), move |_, _, _| {
        counter.set(counter.get() + 1);
        Ok(MutationResult::Unchanged)
    });

    let mut pass = PassDriver::new("fold").with_rule(fold_add_rule()).with_rule(observer);
    assert!(pass.run(&mut g).unwrap().mutated());
    // The observer saw the two constants, where fold-add did not match, but
    // never the Add node it folded.
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_declining_callback_yields_to_later_rules() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    g.add_result(sum).unwrap();

    let add_pattern = Pattern::op(OpKind::Add, vec![Pattern::wildcard(), Pattern::wildcard()]);
    let decliner =
        Rule::new("decline", add_pattern, |_, _, _| Ok(MutationResult::Unchanged));

    let mut pass = PassDriver::new("fold").with_rule(decliner).with_rule(fold_add_rule());
    assert!(pass.run(&mut g).unwrap().mutated());
    assert_eq!(g.num_live_nodes(), 1);
}

#[test]
fn test_callback_error_aborts_pass() {
    let mut g = Graph::new();
    let p = g.add_parameter(ElementType::F32, Shape::scalar()).unwrap();
    let sum = simple(&mut g, OpKind::Add, &[p.into(), p.into()]);
    let neg = simple(&mut g, OpKind::Neg, &[sum]);
    g.add_result(neg).unwrap();

    // Replacing the Add with its own consumer is a cycle; the violation must
    // surface instead of leaving a half-applied rewrite.
    let pattern = Pattern::op(OpKind::Add, vec![Pattern::wildcard(), Pattern::wildcard()]);
    let bad = Rule::new("bad", pattern, |graph, _, node| {
        let (consumer, _) = graph.node(node)?.consumers(0)[0];
        graph.replace_node(node, consumer)?;
        Ok(MutationResult::Mutated)
    });

    let mut pass = PassDriver::new("bad").with_rule(bad);
    let err = pass.run(&mut g).unwrap_err();
    assert!(matches!(
        err,
        Error::GraphInvariant { source: GraphInvariantViolation::CycleDetected { .. } }
    ));
    g.validate().unwrap();
}

// =========================================================================
// Pipelines
// =========================================================================

#[test]
fn test_pipeline_runs_passes_in_order() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    let neg = simple(&mut g, OpKind::Neg, &[sum]);
    g.add_result(neg).unwrap();

    let neg_pattern = Pattern::op(OpKind::Neg, vec![Pattern::cvar("c")]);
    let fold_neg = Rule::new("fold-neg", neg_pattern, |graph, bindings, node| {
        let Some(c) = bindings.get("c").and_then(|v| helpers::try_const(graph, v)) else {
            return Ok(MutationResult::Unchanged);
        };
        let data = c.data.iter().map(|&v| -v).collect();
        let folded = graph.add_const(Tensor::new(c.elem, c.shape, data))?;
        graph.replace_node(node, folded)?;
        Ok(MutationResult::Mutated)
    });

    let mut pipeline = Pipeline::new("fold-all")
        .with(PassDriver::new("fold-add").with_rule(fold_add_rule()))
        .with(PassDriver::new("fold-neg").with_rule(fold_neg));
    assert!(pipeline.run(&mut g).unwrap().mutated());

    assert_eq!(g.num_live_nodes(), 1);
    assert_eq!(g.constant_tensor(g.results()[0].node).unwrap().data, vec![-5.0]);
}

#[test]
fn test_pipeline_unchanged_when_nothing_applies() {
    let mut g = Graph::new();
    let p = g.add_parameter(ElementType::F32, Shape::scalar()).unwrap();
    g.add_result(p.into()).unwrap();

    let mut pipeline =
        Pipeline::new("noop").with(PassDriver::new("fold").with_rule(fold_add_rule()));
    assert!(!pipeline.run(&mut g).unwrap().mutated());
}

// =========================================================================
// Fixed point
// =========================================================================

#[test]
fn test_fixed_point_converges() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    g.add_result(sum).unwrap();

    let driver = PassDriver::new("fold").with_rule(fold_add_rule());
    let mut fixed = FixedPoint::new(driver, 16);
    let outcome = fixed.run_to_convergence(&mut g).unwrap();

    // One mutating iteration, one confirming iteration.
    assert_eq!(outcome, Convergence::Converged { iterations: 2 });
    assert_eq!(g.num_live_nodes(), 1);
}

#[test]
fn test_fixed_point_budget_exhaustion_is_reported() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let neg = simple(&mut g, OpKind::Neg, &[c]);
    g.add_result(neg).unwrap();

    // Regenerates every Neg it sees: never converges.
    let pattern = Pattern::op(OpKind::Neg, vec![Pattern::var("x")]);
    let churn = Rule::new("churn", pattern, |graph, bindings, node| {
        let Some(x) = bindings.get("x") else {
            return Ok(MutationResult::Unchanged);
        };
        let fresh = graph.add_node(OpKind::Neg, AttrMap::new(), &[x])?;
        graph.replace_node(node, fresh)?;
        Ok(MutationResult::Mutated)
    });

    let driver = PassDriver::new("churn").with_rule(churn);
    let mut fixed = FixedPoint::new(driver, 3);
    let outcome = fixed.run_to_convergence(&mut g).unwrap();
    assert_eq!(outcome, Convergence::BudgetExhausted { iterations: 3 });
    // The graph is still well formed after the truncated run.
    g.validate().unwrap();
}

#[test]
fn test_fixed_point_as_nested_pass() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);
    g.add_result(sum).unwrap();

    let driver = PassDriver::new("fold").with_rule(fold_add_rule());
    let mut pipeline = Pipeline::new("outer").with(FixedPoint::new(driver, 16));
    assert!(pipeline.run(&mut g).unwrap().mutated());
    assert!(!pipeline.run(&mut g).unwrap().mutated());
}

#[test]
fn test_fixed_point_as_pass_records_budget_exhaustion() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let neg = simple(&mut g, OpKind::Neg, &[c]);
    g.add_result(neg).unwrap();

    let pattern = Pattern::op(OpKind::Neg, vec![Pattern::var("x")]);
    let churn = Rule::new("churn", pattern, |graph, bindings, node| {
        let Some(x) = bindings.get("x") else {
            return Ok(MutationResult::Unchanged);
        };
        let fresh = graph.add_node(OpKind::Neg, AttrMap::new(), &[x])?;
        graph.replace_node(node, fresh)?;
        Ok(MutationResult::Mutated)
    });

    let driver = PassDriver::new("churn").with_rule(churn);
    let mut fixed = FixedPoint::new(driver, 3);
    assert_eq!(fixed.last_outcome(), None);
    // Through the Pass interface the result collapses to mutated-or-not;
    // the truncated run is still visible on the fixed point itself.
    assert!(Pass::run(&mut fixed, &mut g).unwrap().mutated());
    assert_eq!(fixed.last_outcome(), Some(Convergence::BudgetExhausted { iterations: 3 }));
}
