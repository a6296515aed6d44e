//! Backtracking pattern matcher.
//!
//! Unifies a [`Pattern`] against a concrete graph value, accumulating named
//! bindings in a pattern map. Backtracking is driven by an explicit
//! checkpoint log rather than any unwinding primitive: every compound match
//! (a labeled pattern, an op pattern and its inputs, an alternation branch)
//! is wrapped in [`Matcher::start_match`] / [`Matcher::finish`], and a
//! failed branch removes exactly the bindings it added, restoring anything
//! it shadowed. No partial commit escapes a failed compound match.
//!
//! Matching is value-level: a pattern's root matches a specific
//! `(node, port)` pair, not merely a node, so multi-output operations can be
//! matched selectively per port.

use std::collections::HashMap;

use crate::graph::Graph;
use crate::node::ValueRef;
use crate::pattern::Pattern;

/// Name → bound graph value, produced by a successful top-level match.
/// Created fresh per match attempt, discarded on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMap {
    map: HashMap<String, ValueRef>,
}

impl PatternMap {
    pub fn get(&self, name: &str) -> Option<ValueRef> {
        self.map.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueRef)> {
        self.map.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// Marker for one open checkpoint; carries the trail position it recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    mark: usize,
}

impl Checkpoint {
    pub fn mark(&self) -> usize {
        self.mark
    }
}

/// Matcher state for one match attempt: the pattern map and the binding
/// trail (insertion order plus any shadowed previous value).
pub struct Matcher<'g> {
    graph: &'g Graph,
    map: HashMap<String, ValueRef>,
    trail: Vec<(String, Option<ValueRef>)>,
}

impl<'g> Matcher<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Matcher { graph, map: HashMap::new(), trail: Vec::new() }
    }

    /// Open a checkpoint recording the current trail position.
    pub fn start_match(&mut self) -> Checkpoint {
        Checkpoint { mark: self.trail.len() }
    }

    /// Close a checkpoint. On success the bindings added since it opened
    /// are kept (and stay on the trail, so an enclosing failure can still
    /// undo them); on failure exactly those bindings are removed, restoring
    /// any value they shadowed. Returns `ok` for chaining.
    pub fn finish(&mut self, checkpoint: Checkpoint, ok: bool) -> bool {
        if !ok {
            while self.trail.len() > checkpoint.mark {
                if let Some((name, shadowed)) = self.trail.pop() {
                    match shadowed {
                        Some(prev) => {
                            self.map.insert(name, prev);
                        }
                        None => {
                            self.map.remove(&name);
                        }
                    }
                }
            }
        }
        ok
    }

    fn bind(&mut self, name: &str, value: ValueRef) {
        let prev = self.map.insert(name.to_string(), value);
        self.trail.push((name.to_string(), prev));
    }

    /// Unify `pattern` against the graph value. On overall failure the
    /// pattern map is unchanged from before the call.
    pub fn match_value(&mut self, pattern: &Pattern, value: ValueRef) -> bool {
        let graph = self.graph;
        if graph.value_desc(value).is_err() {
            return false;
        }
        match pattern {
            Pattern::Wildcard { pred } => pred.as_ref().is_none_or(|p| p(graph, value)),

            Pattern::Label { name, inner, pred } => {
                let checkpoint = self.start_match();
                let mut ok = self.match_value(inner, value);
                if ok {
                    ok = pred.as_ref().is_none_or(|p| p(graph, value));
                }
                if ok {
                    match self.map.get(name) {
                        Some(&existing) => ok = existing == value,
                        None => self.bind(name, value),
                    }
                }
                self.finish(checkpoint, ok)
            }

            Pattern::Op { kind, pred, inputs, variadic } => {
                let Ok(producer) = graph.node(value.node) else {
                    return false;
                };
                let gate = match (kind, pred) {
                    (Some(k), Some(p)) => producer.kind() == *k || p(graph, value),
                    (Some(k), None) => producer.kind() == *k,
                    (None, Some(p)) => p(graph, value),
                    (None, None) => true,
                };
                if !gate {
                    return false;
                }
                let actual = producer.inputs().len();
                let arity_ok =
                    if *variadic { actual >= inputs.len() } else { actual == inputs.len() };
                if !arity_ok {
                    return false;
                }

                // All-or-nothing: bindings made while matching earlier
                // inputs are rolled back if a later input fails.
                let checkpoint = self.start_match();
                let mut ok = true;
                for (i, input_pattern) in inputs.iter().enumerate() {
                    match producer.input(i) {
                        Some(input) if self.match_value(input_pattern, input) => {}
                        _ => {
                            ok = false;
                            break;
                        }
                    }
                }
                self.finish(checkpoint, ok)
            }

            Pattern::Or(alternatives) => {
                for alt in alternatives {
                    let checkpoint = self.start_match();
                    let ok = self.match_value(alt, value);
                    if self.finish(checkpoint, ok) {
                        return true;
                    }
                }
                false
            }

            Pattern::Optional(inner) => {
                let checkpoint = self.start_match();
                let ok = self.match_value(inner, value);
                self.finish(checkpoint, ok);
                true
            }
        }
    }

    pub fn pattern_map(&self) -> &HashMap<String, ValueRef> {
        &self.map
    }

    pub fn into_map(self) -> PatternMap {
        PatternMap { map: self.map }
    }
}

/// One-shot convenience: match and return the bindings on success.
pub fn match_pattern(graph: &Graph, pattern: &Pattern, value: ValueRef) -> Option<PatternMap> {
    let mut matcher = Matcher::new(graph);
    if matcher.match_value(pattern, value) {
        Some(matcher.into_map())
    } else {
        None
    }
}
