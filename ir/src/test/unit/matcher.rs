//! Matcher tests: dispatch, bindings, alternation rollback.

use std::collections::BTreeMap;

use crate::node::NodeId;
use crate::pattern::helpers;
use crate::prelude::*;
use crate::test::{scalar_const, simple};

fn bindings(map: &PatternMap) -> BTreeMap<String, ValueRef> {
    map.iter().map(|(name, value)| (name.to_string(), value)).collect()
}

// =========================================================================
// Primitive dispatch
// =========================================================================

#[test]
fn test_wildcard_matches_any_value() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let map = match_pattern(&g, &Pattern::wildcard(), c).unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_wildcard_predicate_gates_match() {
    let mut g = Graph::new();
    let zero = scalar_const(&mut g, 0.0);
    let one = scalar_const(&mut g, 1.0);
    let pat = Pattern::wildcard_where(helpers::is_zero);

    assert!(match_pattern(&g, &pat, zero).is_some());
    assert!(match_pattern(&g, &pat, one).is_none());
}

#[test]
fn test_op_kind_must_agree() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let neg = simple(&mut g, OpKind::Neg, &[a]);

    assert!(match_pattern(&g, &Pattern::op(OpKind::Neg, vec![Pattern::wildcard()]), neg).is_some());
    assert!(match_pattern(&g, &Pattern::op(OpKind::Relu, vec![Pattern::wildcard()]), neg).is_none());
}

#[test]
fn test_op_input_count_is_exact_without_variadic() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);

    assert!(match_pattern(&g, &Pattern::op(OpKind::Add, vec![Pattern::var("x")]), sum).is_none());
}

#[test]
fn test_variadic_matches_input_prefix() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);

    let map =
        match_pattern(&g, &Pattern::op_variadic(OpKind::Add, vec![Pattern::var("x")]), sum).unwrap();
    assert_eq!(map.get("x"), Some(a));
}

#[test]
fn test_nested_op_pattern() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let prod = simple(&mut g, OpKind::Mul, &[a, b]);
    let c = scalar_const(&mut g, 4.0);
    let sum = simple(&mut g, OpKind::Add, &[prod, c]);

    let pat = Pattern::op(
        OpKind::Add,
        vec![Pattern::op(OpKind::Mul, vec![Pattern::var("a"), Pattern::var("b")]), Pattern::var("c")],
    );
    let map = match_pattern(&g, &pat, sum).unwrap();
    assert_eq!(map.get("a"), Some(a));
    assert_eq!(map.get("b"), Some(b));
    assert_eq!(map.get("c"), Some(c));
}

#[test]
fn test_cvar_only_matches_constants() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let p = g.add_parameter(ElementType::F32, Shape::scalar()).unwrap();

    assert!(match_pattern(&g, &Pattern::cvar("c"), c).is_some());
    assert!(match_pattern(&g, &Pattern::cvar("c"), p.into()).is_none());
}

#[test]
fn test_invalid_value_never_matches() {
    let g = Graph::new();
    let bogus = ValueRef::new(NodeId(42), 0);
    assert!(match_pattern(&g, &Pattern::wildcard(), bogus).is_none());
}

// =========================================================================
// Labels and equal-binding
// =========================================================================

#[test]
fn test_label_reuse_requires_identical_value() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let same = simple(&mut g, OpKind::Add, &[c, c]);
    let c2 = scalar_const(&mut g, 1.0);
    let different = simple(&mut g, OpKind::Add, &[c, c2]);

    let pat = Pattern::op(OpKind::Add, vec![Pattern::var("x"), Pattern::var("x")]);
    let map = match_pattern(&g, &pat, same).unwrap();
    assert_eq!(map.get("x"), Some(c));
    // Distinct nodes, even with equal payloads, are not the same value.
    assert!(match_pattern(&g, &pat, different).is_none());
}

#[test]
fn test_label_distinguishes_ports() {
    let mut g = Graph::new();
    let p = g.add_parameter(ElementType::F32, Shape::fixed(&[4])).unwrap();
    let mut attrs = AttrMap::new();
    attrs.insert("axis".into(), AttrValue::Int(0));
    attrs.insert("parts".into(), AttrValue::Int(2));
    let s = g.add_node(OpKind::Split, attrs, &[p.into()]).unwrap();

    let map = match_pattern(&g, &Pattern::var("x"), ValueRef::new(s, 1)).unwrap();
    assert_eq!(map.get("x"), Some(ValueRef::new(s, 1)));
}

#[test]
fn test_named_where_predicate_blocks_binding() {
    let mut g = Graph::new();
    let one = scalar_const(&mut g, 1.0);
    let pat = Pattern::wildcard().named_where("z", helpers::is_zero);
    assert!(match_pattern(&g, &pat, one).is_none());
}

// =========================================================================
// Alternation and rollback
// =========================================================================

#[test]
fn test_or_first_alternative_wins() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let pat = Pattern::or(vec![Pattern::var("a"), Pattern::var("b")]);
    let map = match_pattern(&g, &pat, c).unwrap();
    assert_eq!(map.get("a"), Some(c));
    assert!(!map.contains("b"));
}

#[test]
fn test_or_rolls_back_partial_bindings() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let sum = simple(&mut g, OpKind::Add, &[a, b]);

    // The first alternative binds "lhs" before failing on the Neg input;
    // that binding must not leak into the second alternative's result.
    let failing = Pattern::op(
        OpKind::Add,
        vec![Pattern::var("lhs"), Pattern::op(OpKind::Neg, vec![Pattern::wildcard()])],
    );
    let succeeding = Pattern::op(OpKind::Add, vec![Pattern::var("x"), Pattern::var("y")]);
    let map = match_pattern(&g, &Pattern::or(vec![failing, succeeding]), sum).unwrap();

    assert!(!map.contains("lhs"));
    assert_eq!(map.get("x"), Some(a));
    assert_eq!(map.get("y"), Some(b));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_failed_or_leaves_matcher_clean() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let pat = Pattern::or(vec![
        Pattern::op(OpKind::Neg, vec![Pattern::var("n")]),
        Pattern::op(OpKind::Relu, vec![Pattern::var("r")]),
    ]);
    assert!(match_pattern(&g, &pat, c).is_none());
}

#[test]
fn test_optional_absent_succeeds_without_binding() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 1.0);
    let b = scalar_const(&mut g, 2.0);
    let plain = simple(&mut g, OpKind::Add, &[a, b]);
    let neg = simple(&mut g, OpKind::Neg, &[b]);
    let with_neg = simple(&mut g, OpKind::Add, &[a, neg]);

    let pat = Pattern::op(
        OpKind::Add,
        vec![
            Pattern::var("x"),
            Pattern::optional(Pattern::op(OpKind::Neg, vec![Pattern::wildcard()]).named("n")),
        ],
    );
    let absent = match_pattern(&g, &pat, plain).unwrap();
    assert!(!absent.contains("n"));
    let present = match_pattern(&g, &pat, with_neg).unwrap();
    assert_eq!(present.get("n"), Some(neg));
}

// =========================================================================
// Determinism and the checkpoint protocol
// =========================================================================

#[test]
fn test_match_is_deterministic() {
    let mut g = Graph::new();
    let a = scalar_const(&mut g, 2.0);
    let b = scalar_const(&mut g, 3.0);
    let prod = simple(&mut g, OpKind::Mul, &[a, b]);
    let sum = simple(&mut g, OpKind::Add, &[prod, a]);

    let pat = Pattern::op(
        OpKind::Add,
        vec![Pattern::op(OpKind::Mul, vec![Pattern::var("a"), Pattern::var("b")]), Pattern::var("c")],
    );
    let first = match_pattern(&g, &pat, sum).unwrap();
    let second = match_pattern(&g, &pat, sum).unwrap();
    assert_eq!(bindings(&first), bindings(&second));
}

#[test]
fn test_finish_false_discards_bindings() {
    let mut g = Graph::new();
    let c = scalar_const(&mut g, 1.0);
    let mut matcher = Matcher::new(&g);

    let checkpoint = matcher.start_match();
    assert!(matcher.match_value(&Pattern::var("x"), c));
    assert!(!matcher.finish(checkpoint, false));
    assert!(matcher.pattern_map().is_empty());

    let checkpoint = matcher.start_match();
    assert!(matcher.match_value(&Pattern::var("x"), c));
    assert!(matcher.finish(checkpoint, true));
    assert_eq!(matcher.into_map().get("x"), Some(c));
}
