//! Rewrite rules and the pass driver / pipeline machinery.
//!
//! A [`Rule`] pairs a root pattern with a mutation callback. A
//! [`PassDriver`] applies an ordered list of rules across the graph in a
//! single traversal; a [`Pipeline`] sequences passes; [`FixedPoint`] re-runs
//! a pass until an iteration reports no mutation or the budget runs out.
//!
//! Two driver policies are load-bearing and deliberate:
//!
//! - Rules are mutually exclusive per node per traversal: the first rule
//!   that reports a mutation stops the scan for that node. Later rules may
//!   assume the graph shape left behind by an earlier rule.
//! - The traversal order is a topological order computed up front, so a
//!   rule firing on a node sees producers that earlier visits have already
//!   rewritten. Nodes created by a mutation are not revisited within the
//!   same traversal.

use crate::error::Error;
use crate::graph::Graph;
use crate::matcher::{Matcher, PatternMap};
use crate::node::{NodeId, ValueRef};
use crate::pattern::Pattern;

/// Whether a callback or pass changed the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationResult {
    Mutated,
    Unchanged,
}

impl MutationResult {
    pub fn mutated(&self) -> bool {
        matches!(self, MutationResult::Mutated)
    }

    pub fn or(self, other: MutationResult) -> MutationResult {
        if self.mutated() || other.mutated() { MutationResult::Mutated } else { MutationResult::Unchanged }
    }
}

/// Mutation callback of a rule. Receives the bindings of the successful
/// match plus the matched node, performs the graph mutation (typically one
/// or more `replace_node`/`replace_value` calls) and reports whether it
/// changed anything. A callback may decline by returning `Unchanged`.
pub type RuleCallback = Box<dyn Fn(&mut Graph, &PatternMap, NodeId) -> Result<MutationResult, Error>>;

/// The unit of optimization: a root pattern plus a mutation callback.
pub struct Rule {
    name: String,
    pattern: Pattern,
    callback: RuleCallback,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        pattern: Pattern,
        callback: impl Fn(&mut Graph, &PatternMap, NodeId) -> Result<MutationResult, Error> + 'static,
    ) -> Self {
        Rule { name: name.into(), pattern, callback: Box::new(callback) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try the rule against each output port of the candidate node in order;
    /// on the first matching port, invoke the callback. Pattern mismatch is
    /// not an error, just `Unchanged`.
    pub fn apply(&self, graph: &mut Graph, node: NodeId) -> Result<MutationResult, Error> {
        let ports = graph.node(node)?.num_outputs() as u32;
        for port in 0..ports {
            let value = ValueRef::new(node, port);
            let bindings = {
                let mut matcher = Matcher::new(graph);
                if matcher.match_value(&self.pattern, value) {
                    Some(matcher.into_map())
                } else {
                    None
                }
            };
            if let Some(bindings) = bindings {
                if (self.callback)(graph, &bindings, node)?.mutated() {
                    return Ok(MutationResult::Mutated);
                }
            }
        }
        Ok(MutationResult::Unchanged)
    }
}

/// A unit of graph transformation runnable by a pipeline.
pub trait Pass {
    fn name(&self) -> &str;

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error>;
}

/// Applies an ordered list of rules across the graph in one traversal.
pub struct PassDriver {
    name: String,
    rules: Vec<Rule>,
}

impl PassDriver {
    pub fn new(name: impl Into<String>) -> Self {
        PassDriver { name: name.into(), rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }
}

impl Pass for PassDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error> {
        let order = graph.topological_order()?;
        let mut overall = MutationResult::Unchanged;
        for node in order {
            // A replacement earlier in the traversal may have evicted this
            // node already.
            if !graph.contains(node) {
                continue;
            }
            for rule in &self.rules {
                if rule.apply(graph, node)?.mutated() {
                    tracing::debug!(pass = %self.name, rule = %rule.name, %node, "rule fired");
                    // Transient garbage from the mutation must not outlive
                    // this visit.
                    graph.remove_dead_nodes();
                    overall = MutationResult::Mutated;
                    break;
                }
            }
        }
        Ok(overall)
    }
}

/// An ordered sequence of passes (or nested pipelines), run once per call.
pub struct Pipeline {
    name: String,
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Pipeline { name: name.into(), passes: Vec::new() }
    }

    pub fn with(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn push(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }
}

impl Pass for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error> {
        let mut overall = MutationResult::Unchanged;
        for pass in &mut self.passes {
            tracing::debug!(pipeline = %self.name, pass = %pass.name(), "running pass");
            overall = overall.or(pass.run(graph)?);
        }
        Ok(overall)
    }
}

/// Outcome of a fixed-point run. Budget exhaustion is a reported status,
/// never an error or a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// An iteration reported zero mutations. `iterations` counts every
    /// iteration run, including the final non-mutating one.
    Converged { iterations: usize },
    /// The budget ran out while iterations were still mutating.
    BudgetExhausted { iterations: usize },
}

impl Convergence {
    pub fn converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match self {
            Convergence::Converged { iterations } | Convergence::BudgetExhausted { iterations } => {
                *iterations
            }
        }
    }
}

/// Repeats a pass until an iteration reports zero mutations or the
/// iteration budget is exhausted.
pub struct FixedPoint<P> {
    inner: P,
    budget: usize,
    last: Option<Convergence>,
}

impl<P: Pass> FixedPoint<P> {
    pub fn new(inner: P, budget: usize) -> Self {
        FixedPoint { inner, budget, last: None }
    }

    pub fn run_to_convergence(&mut self, graph: &mut Graph) -> Result<Convergence, Error> {
        for iteration in 1..=self.budget {
            if !self.inner.run(graph)?.mutated() {
                tracing::debug!(pass = %self.inner.name(), iterations = iteration, "converged");
                let outcome = Convergence::Converged { iterations: iteration };
                self.last = Some(outcome);
                return Ok(outcome);
            }
        }
        tracing::warn!(pass = %self.inner.name(), budget = self.budget, "iteration budget exhausted");
        let outcome = Convergence::BudgetExhausted { iterations: self.budget };
        self.last = Some(outcome);
        Ok(outcome)
    }

    /// Outcome of the most recent run. The [`Pass`] interface collapses the
    /// result to mutated-or-not, so callers driving this as a nested pass
    /// query budget exhaustion here afterwards.
    pub fn last_outcome(&self) -> Option<Convergence> {
        self.last
    }
}

impl<P: Pass> Pass for FixedPoint<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run(&mut self, graph: &mut Graph) -> Result<MutationResult, Error> {
        match self.run_to_convergence(graph)? {
            Convergence::Converged { iterations: 1 } => Ok(MutationResult::Unchanged),
            _ => Ok(MutationResult::Mutated),
        }
    }
}
