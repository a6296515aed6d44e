//! The computation graph: exclusive owner of its nodes.
//!
//! Nodes live in an arena with stable indices; all cross-references (input
//! bindings, consumer sets, results) are plain indices, never owning handles.
//! Slots are evicted only by [`Graph::remove_dead_nodes`], and ids are never
//! reused, so a held [`NodeId`] stays meaningful across compaction.
//!
//! Every mutation keeps two invariants: the dependency relation is acyclic,
//! and consumer sets are exactly the inverse of input bindings.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Error, GraphInvariantViolation, OpValidationError};
use crate::node::{Node, NodeId, OutputDesc, ValueRef};
use crate::op::{OpKind, OpRegistry};
use crate::types::{AttrMap, AttrValue, ElementType, Mask, Shape, Tensor};

pub struct Graph {
    nodes: Vec<Option<Node>>,
    parameters: Vec<NodeId>,
    results: Vec<ValueRef>,
    registry: Arc<OpRegistry>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Empty graph over the builtin op registry.
    pub fn new() -> Self {
        Self::with_registry(OpRegistry::shared())
    }

    pub fn with_registry(registry: Arc<OpRegistry>) -> Self {
        Graph { nodes: Vec::new(), parameters: Vec::new(), results: Vec::new(), registry }
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    // ===== Accessors =====

    /// Whether the id refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(Option::is_some)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphInvariantViolation> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(GraphInvariantViolation::MissingNode { node: id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphInvariantViolation> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphInvariantViolation::MissingNode { node: id })
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn num_live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Descriptor of a graph value.
    pub fn value_desc(&self, value: ValueRef) -> Result<&OutputDesc, GraphInvariantViolation> {
        self.node(value.node)?
            .outputs
            .get(value.port as usize)
            .ok_or(GraphInvariantViolation::DanglingValue { value })
    }

    fn check_value(&self, value: ValueRef) -> Result<(), GraphInvariantViolation> {
        self.value_desc(value).map(|_| ())
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[ValueRef] {
        &self.results
    }

    // ===== Construction =====

    /// Create a node: resolve its input bindings, check the op-kind's arity
    /// rule, infer the output descriptors and register the new node in its
    /// producers' consumer sets.
    pub fn add_node(
        &mut self,
        kind: OpKind,
        attrs: AttrMap,
        inputs: &[ValueRef],
    ) -> Result<NodeId, Error> {
        for &value in inputs {
            self.check_value(value)?;
        }
        let schema = self
            .registry
            .schema(kind)
            .ok_or(OpValidationError::UnknownOpKind { kind })?;
        if !schema.arity.accepts(inputs.len()) {
            return Err(OpValidationError::ArityMismatch {
                kind,
                expected: schema.arity,
                actual: inputs.len(),
            }
            .into());
        }

        let input_descs: Vec<OutputDesc> = inputs
            .iter()
            .map(|&v| self.value_desc(v).cloned())
            .collect::<Result<_, _>>()?;
        let outputs = (schema.infer)(kind, &attrs, &input_descs)?;

        let id = NodeId(self.nodes.len() as u32);
        let num_outputs = outputs.len();
        self.nodes.push(Some(Node {
            id,
            kind,
            attrs,
            inputs: SmallVec::from_slice(inputs),
            outputs,
            consumers: (0..num_outputs).map(|_| SmallVec::new()).collect(),
            masks: (0..num_outputs).map(|_| None).collect(),
        }));
        for (slot, &value) in inputs.iter().enumerate() {
            if let Some(producer) = self.nodes[value.node.index()].as_mut() {
                producer.consumers[value.port as usize].push((id, slot as u32));
            }
        }
        Ok(id)
    }

    /// Add a free graph input and record it in the parameter list.
    pub fn add_parameter(&mut self, elem: ElementType, shape: Shape) -> Result<NodeId, Error> {
        let dims: Vec<i64> = shape
            .0
            .iter()
            .map(|d| d.as_static().map_or(-1, |n| n as i64))
            .collect();
        let mut attrs = AttrMap::new();
        attrs.insert("elem".into(), AttrValue::Str(elem.name().into()));
        attrs.insert("shape".into(), AttrValue::Ints(dims));
        let id = self.add_node(OpKind::Parameter, attrs, &[])?;
        self.parameters.push(id);
        Ok(id)
    }

    /// Add a dense constant node carrying the tensor as its payload.
    pub fn add_const(&mut self, tensor: Tensor) -> Result<NodeId, Error> {
        let mut attrs = AttrMap::new();
        attrs.insert("elem".into(), AttrValue::Str(tensor.elem.name().into()));
        attrs.insert(
            "shape".into(),
            AttrValue::Ints(tensor.shape.iter().map(|&d| d as i64).collect()),
        );
        attrs.insert("value".into(), AttrValue::Floats(tensor.data));
        self.add_node(OpKind::Const, attrs, &[])
    }

    /// Payload of a Const node, if `id` is one.
    pub fn constant_tensor(&self, id: NodeId) -> Option<Tensor> {
        let node = self.node(id).ok()?;
        if node.kind != OpKind::Const {
            return None;
        }
        let desc = &node.outputs[0];
        let shape = desc.shape.static_dims()?;
        let data = node.attrs.get("value")?.as_floats()?.to_vec();
        Some(Tensor { elem: desc.elem, shape, data })
    }

    /// Designate a graph result.
    pub fn add_result(&mut self, value: ValueRef) -> Result<(), GraphInvariantViolation> {
        self.check_value(value)?;
        self.results.push(value);
        Ok(())
    }

    // ===== Mask metadata =====

    pub fn mask(&self, value: ValueRef) -> Option<&Mask> {
        self.node(value.node).ok()?.masks.get(value.port as usize)?.as_ref()
    }

    pub fn set_mask(&mut self, value: ValueRef, mask: Mask) -> Result<(), GraphInvariantViolation> {
        self.check_value(value)?;
        self.node_mut(value.node)?.masks[value.port as usize] = Some(mask);
        Ok(())
    }

    pub fn clear_mask(&mut self, value: ValueRef) -> Result<(), GraphInvariantViolation> {
        self.check_value(value)?;
        self.node_mut(value.node)?.masks[value.port as usize] = None;
        Ok(())
    }

    // ===== Mutation =====

    /// Whether `from` transitively reads `target` through input bindings.
    /// Not reflexive: a node does not depend on itself.
    fn depends_on(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = match self.node(from) {
            Ok(n) => n.inputs.iter().map(|v| v.node).collect(),
            Err(_) => return false,
        };
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id) {
                if let Ok(n) = self.node(id) {
                    stack.extend(n.inputs.iter().map(|v| v.node));
                }
            }
        }
        false
    }

    /// Redirect every consumer edge and every result from `old` to `new`.
    /// The caller has already validated both values and ruled out cycles.
    fn redirect_value(&mut self, old: ValueRef, new: ValueRef) {
        let moved = if let Some(n) = self.nodes[old.node.index()].as_mut() {
            std::mem::take(&mut n.consumers[old.port as usize])
        } else {
            return;
        };
        for &(consumer, slot) in &moved {
            if let Some(c) = self.nodes[consumer.index()].as_mut() {
                c.inputs[slot as usize] = new;
            }
        }
        if let Some(n) = self.nodes[new.node.index()].as_mut() {
            n.consumers[new.port as usize].extend(moved);
        }
        for result in &mut self.results {
            if *result == old {
                *result = new;
            }
        }
    }

    /// Redirect all consumers of `old` (every port, same port number) to
    /// `new`, leaving `old` with no consumers.
    ///
    /// Atomic: the output-arity check and the cycle check (`new` transitively
    /// depending on `old`) both run before any edge moves.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), GraphInvariantViolation> {
        if old == new {
            return Ok(());
        }
        let old_ports = self.node(old)?.num_outputs();
        let new_ports = self.node(new)?.num_outputs();
        if old_ports != new_ports {
            return Err(GraphInvariantViolation::OutputArityMismatch {
                old,
                new,
                old_ports,
                new_ports,
            });
        }
        if self.depends_on(new, old) {
            return Err(GraphInvariantViolation::CycleDetected { node: new });
        }
        tracing::trace!(%old, %new, ports = old_ports, "replace_node");
        for port in 0..old_ports as u32 {
            self.redirect_value(ValueRef::new(old, port), ValueRef::new(new, port));
        }
        Ok(())
    }

    /// Single-value variant of [`Graph::replace_node`] for value-level
    /// rewrites on multi-output producers.
    pub fn replace_value(
        &mut self,
        old: ValueRef,
        new: ValueRef,
    ) -> Result<(), GraphInvariantViolation> {
        if old == new {
            return Ok(());
        }
        self.check_value(old)?;
        self.check_value(new)?;
        if new.node != old.node && self.depends_on(new.node, old.node) {
            return Err(GraphInvariantViolation::CycleDetected { node: new.node });
        }
        tracing::trace!(%old, %new, "replace_value");
        self.redirect_value(old, new);
        Ok(())
    }

    /// Re-bind one input edge, with consumer-set maintenance and cycle check.
    pub fn set_input(
        &mut self,
        node: NodeId,
        index: usize,
        value: ValueRef,
    ) -> Result<(), GraphInvariantViolation> {
        self.check_value(value)?;
        let old = self
            .node(node)?
            .input(index)
            .ok_or(GraphInvariantViolation::InputIndexOutOfRange { node, index })?;
        if old == value {
            return Ok(());
        }
        if value.node == node || self.depends_on(value.node, node) {
            return Err(GraphInvariantViolation::CycleDetected { node: value.node });
        }
        if let Some(producer) = self.nodes[old.node.index()].as_mut() {
            producer.consumers[old.port as usize]
                .retain(|&mut (c, s)| !(c == node && s == index as u32));
        }
        self.node_mut(node)?.inputs[index] = value;
        if let Some(producer) = self.nodes[value.node.index()].as_mut() {
            producer.consumers[value.port as usize].push((node, index as u32));
        }
        Ok(())
    }

    /// Evict every node unreachable from the results and parameters.
    ///
    /// Unreachable nodes are permitted to exist transiently during a rewrite;
    /// the pass driver calls this after every mutation so they never outlive
    /// the visit that created them.
    pub fn remove_dead_nodes(&mut self) {
        let mut live: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = self
            .results
            .iter()
            .map(|v| v.node)
            .chain(self.parameters.iter().copied())
            .collect();
        while let Some(id) = queue.pop_front() {
            if live.insert(id) {
                if let Ok(node) = self.node(id) {
                    queue.extend(node.inputs.iter().map(|v| v.node));
                }
            }
        }

        let dead: Vec<NodeId> = self
            .live_nodes()
            .map(Node::id)
            .filter(|id| !live.contains(id))
            .collect();
        for &id in &dead {
            let inputs = match self.nodes[id.index()].take() {
                Some(node) => node.inputs,
                None => continue,
            };
            for value in inputs {
                if let Some(producer) = self.nodes[value.node.index()].as_mut() {
                    producer.consumers[value.port as usize].retain(|&mut (c, _)| c != id);
                }
            }
        }
        if !dead.is_empty() {
            tracing::trace!(evicted = dead.len(), "remove_dead_nodes");
        }
    }

    // ===== Validation / ordering =====

    /// Topological order over the live nodes (producers first), recomputed on
    /// demand via Kahn's algorithm. Deterministic for a given graph.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphInvariantViolation> {
        let mut indegree: Vec<usize> = vec![0; self.nodes.len()];
        let mut live_count = 0usize;
        for node in self.live_nodes() {
            live_count += 1;
            for &value in node.inputs() {
                self.check_value(value)?;
            }
            indegree[node.id().index()] = node.inputs.len();
        }

        let mut queue: VecDeque<NodeId> = self
            .live_nodes()
            .map(Node::id)
            .filter(|id| indegree[id.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(live_count);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let node = self.node(id)?;
            for port in 0..node.num_outputs() as u32 {
                for &(consumer, _) in node.consumers(port) {
                    indegree[consumer.index()] -= 1;
                    if indegree[consumer.index()] == 0 {
                        queue.push_back(consumer);
                    }
                }
            }
        }

        if order.len() != live_count {
            let stuck = self
                .live_nodes()
                .map(Node::id)
                .find(|id| indegree[id.index()] > 0)
                .unwrap_or(NodeId(0));
            return Err(GraphInvariantViolation::CycleDetected { node: stuck });
        }
        Ok(order)
    }

    /// Re-run type inference over every live node in topological order and
    /// refresh its output descriptors from the current input descriptors.
    /// Needed after a structural rewrite that changes value shapes in place,
    /// such as shrinking a weight constant under its consumers.
    pub fn reinfer_types(&mut self) -> Result<(), Error> {
        let order = self.topological_order()?;
        for id in order {
            let (kind, attrs, inputs) = {
                let node = self.node(id)?;
                // Source nodes declare their own descriptors.
                if node.inputs.is_empty() {
                    continue;
                }
                (node.kind, node.attrs.clone(), node.inputs.clone())
            };
            let infer = self
                .registry
                .schema(kind)
                .ok_or(OpValidationError::UnknownOpKind { kind })?
                .infer;
            let input_descs: Vec<OutputDesc> = inputs
                .iter()
                .map(|&v| self.value_desc(v).cloned())
                .collect::<Result<_, _>>()?;
            let outputs = infer(kind, &attrs, &input_descs)?;
            let node = self.node_mut(id)?;
            if outputs.len() != node.outputs.len() {
                return Err(GraphInvariantViolation::OutputArityMismatch {
                    old: id,
                    new: id,
                    old_ports: node.outputs.len(),
                    new_ports: outputs.len(),
                }
                .into());
            }
            node.outputs = outputs;
        }
        Ok(())
    }

    /// Recompute a topological order and check every result, failing on a
    /// cycle or a dangling reference.
    pub fn validate(&self) -> Result<(), GraphInvariantViolation> {
        self.topological_order()?;
        for &result in &self.results {
            self.check_value(result)?;
        }
        Ok(())
    }
}
