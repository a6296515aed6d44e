//! Pattern DSL for describing sub-shapes of the graph.
//!
//! Patterns are immutable trees built from primitive combinators, with no
//! dependency on any particular graph: build once, match many times. It
//! supports:
//!
//! - Wildcard matching (`Pattern::wildcard()` matches any value)
//! - Op-kind matching with recursive input patterns (`Pattern::op(...)`)
//! - Named captures with equal-binding on reuse (`Pattern::var("x")`)
//! - Ordered alternation (`Pattern::or(...)`, first success wins)
//! - Optional sub-patterns (`Pattern::optional(...)`)
//!
//! # Example
//!
//! ```ignore
//! // Match: x + c (anything plus a constant), binding both
//! let pat = Pattern::op(OpKind::Add, vec![Pattern::var("x"), Pattern::cvar("c")]);
//! ```

pub mod helpers;

use std::sync::Arc;

use crate::graph::Graph;
use crate::node::ValueRef;
use crate::op::OpKind;

/// Pure predicate over a resolved graph value. Must not mutate the graph;
/// evaluation against a value it does not understand returns false rather
/// than raising.
pub type Predicate = Arc<dyn Fn(&Graph, ValueRef) -> bool>;

/// A declarative template describing a sub-shape of the graph.
#[derive(Clone)]
pub enum Pattern {
    /// Matches any graph value satisfying the optional predicate. Binds
    /// nothing by itself.
    Wildcard { pred: Option<Predicate> },

    /// Matches `inner`; on success (and predicate pass) binds `name` to the
    /// matched value. A name already bound only re-matches the identical
    /// value (same node, same port).
    Label { name: String, inner: Box<Pattern>, pred: Option<Predicate> },

    /// Matches a value produced by a node of the given kind (or passing the
    /// predicate) whose inputs match `inputs` element-wise. Without
    /// `variadic` the input count must equal `inputs.len()`; with it,
    /// `inputs` is matched as a prefix.
    Op { kind: Option<OpKind>, pred: Option<Predicate>, inputs: Vec<Pattern>, variadic: bool },

    /// Ordered alternation: first alternative to match wins. Order is
    /// semantically significant.
    Or(Vec<Pattern>),

    /// Tries `inner`; on failure succeeds trivially with no bindings.
    Optional(Box<Pattern>),
}

impl Pattern {
    /// Matches any value.
    pub fn wildcard() -> Self {
        Pattern::Wildcard { pred: None }
    }

    /// Matches any value passing the predicate.
    pub fn wildcard_where(pred: impl Fn(&Graph, ValueRef) -> bool + 'static) -> Self {
        Pattern::Wildcard { pred: Some(Arc::new(pred)) }
    }

    /// Named wildcard: matches any value and binds it.
    pub fn var(name: impl Into<String>) -> Self {
        Pattern::wildcard().named(name)
    }

    /// Named constant: matches any Const value and binds it.
    pub fn cvar(name: impl Into<String>) -> Self {
        Pattern::op(OpKind::Const, vec![]).named(name)
    }

    /// Matches a node of `kind` with exactly the given input patterns.
    pub fn op(kind: OpKind, inputs: Vec<Pattern>) -> Self {
        Pattern::Op { kind: Some(kind), pred: None, inputs, variadic: false }
    }

    /// Like [`Pattern::op`], additionally gated by a predicate: a value
    /// passes when its producer has the kind or the predicate holds.
    pub fn op_where(
        kind: OpKind,
        pred: impl Fn(&Graph, ValueRef) -> bool + 'static,
        inputs: Vec<Pattern>,
    ) -> Self {
        Pattern::Op { kind: Some(kind), pred: Some(Arc::new(pred)), inputs, variadic: false }
    }

    /// Matches a node of `kind` with at least `prefix.len()` inputs, the
    /// first of which match `prefix` element-wise.
    pub fn op_variadic(kind: OpKind, prefix: Vec<Pattern>) -> Self {
        Pattern::Op { kind: Some(kind), pred: None, inputs: prefix, variadic: true }
    }

    /// Ordered alternation.
    pub fn or(alternatives: Vec<Pattern>) -> Self {
        Pattern::Or(alternatives)
    }

    /// Optional sub-pattern.
    pub fn optional(inner: Pattern) -> Self {
        Pattern::Optional(Box::new(inner))
    }

    /// Bind the value matched by this pattern to a name.
    pub fn named(self, name: impl Into<String>) -> Self {
        Pattern::Label { name: name.into(), inner: Box::new(self), pred: None }
    }

    /// Bind with an additional predicate that must hold for the binding to
    /// commit.
    pub fn named_where(
        self,
        name: impl Into<String>,
        pred: impl Fn(&Graph, ValueRef) -> bool + 'static,
    ) -> Self {
        Pattern::Label { name: name.into(), inner: Box::new(self), pred: Some(Arc::new(pred)) }
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Wildcard { pred } => {
                f.debug_struct("Wildcard").field("pred", &pred.is_some()).finish()
            }
            Pattern::Label { name, inner, pred } => f
                .debug_struct("Label")
                .field("name", name)
                .field("inner", inner)
                .field("pred", &pred.is_some())
                .finish(),
            Pattern::Op { kind, pred, inputs, variadic } => f
                .debug_struct("Op")
                .field("kind", kind)
                .field("pred", &pred.is_some())
                .field("inputs", inputs)
                .field("variadic", variadic)
                .finish(),
            Pattern::Or(alts) => f.debug_tuple("Or").field(alts).finish(),
            Pattern::Optional(inner) => f.debug_tuple("Optional").field(inner).finish(),
        }
    }
}
