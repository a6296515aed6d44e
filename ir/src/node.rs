//! Node representation: stable identity, typed outputs, bound inputs and
//! consumer back-references.

use smallvec::SmallVec;

use crate::op::OpKind;
use crate::types::{AttrMap, ElementType, Mask, Shape};

/// Stable arena index of a node. Ids survive dead-node compaction and are
/// never reused within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A graph value: one output port of one node. The unit everything else
/// works in terms of — input bindings, results, pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef {
    pub node: NodeId,
    pub port: u32,
}

impl ValueRef {
    pub fn new(node: NodeId, port: u32) -> Self {
        ValueRef { node, port }
    }
}

impl From<NodeId> for ValueRef {
    /// Port zero of the node; the common single-output case.
    fn from(node: NodeId) -> Self {
        ValueRef { node, port: 0 }
    }
}

impl std::fmt::Display for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// Type and shape of one output port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDesc {
    pub elem: ElementType,
    pub shape: Shape,
}

impl OutputDesc {
    pub fn new(elem: ElementType, shape: Shape) -> Self {
        OutputDesc { elem, shape }
    }
}

/// A consumer edge: which node reads a value, through which input slot.
pub type Consumer = (NodeId, u32);

/// A single operation instance.
///
/// Inputs are plain value references (indices, never owning handles); the
/// per-port consumer sets are the exact inverse of the input bindings and are
/// maintained by every graph mutation, not derived lazily.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: OpKind,
    pub(crate) attrs: AttrMap,
    pub(crate) inputs: SmallVec<[ValueRef; 4]>,
    pub(crate) outputs: SmallVec<[OutputDesc; 2]>,
    pub(crate) consumers: SmallVec<[SmallVec<[Consumer; 4]>; 2]>,
    pub(crate) masks: SmallVec<[Option<Mask>; 2]>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&crate::types::AttrValue> {
        self.attrs.get(name)
    }

    pub fn inputs(&self) -> &[ValueRef] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<ValueRef> {
        self.inputs.get(index).copied()
    }

    pub fn outputs(&self) -> &[OutputDesc] {
        &self.outputs
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Consumer edges of one output port.
    pub fn consumers(&self, port: u32) -> &[Consumer] {
        &self.consumers[port as usize]
    }

    /// Total consumer edges across all ports.
    pub fn num_consumer_edges(&self) -> usize {
        self.consumers.iter().map(SmallVec::len).sum()
    }
}
