//! Fundamental value types for the graph IR.
//!
//! Element types, shapes with statically-unknown dimensions, attribute maps,
//! dense constant payloads and pruning masks.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

/// Element type of a tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::Bool => "bool",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "f32" => Some(ElementType::F32),
            "f64" => Some(ElementType::F64),
            "i32" => Some(ElementType::I32),
            "i64" => Some(ElementType::I64),
            "bool" => Some(ElementType::Bool),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::F32 | ElementType::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ElementType::I32 | ElementType::I64)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single shape dimension, statically known or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    Dynamic,
}

impl Dim {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dim::Static(n) => Some(*n),
            Dim::Dynamic => None,
        }
    }

    /// Two dimensions are compatible when equal or when either is dynamic.
    pub fn compatible(&self, other: &Dim) -> bool {
        match (self, other) {
            (Dim::Static(a), Dim::Static(b)) => a == b,
            _ => true,
        }
    }

    /// Merge two compatible dimensions, preferring the static one.
    pub fn merge(&self, other: &Dim) -> Dim {
        match (self, other) {
            (Dim::Static(n), _) | (_, Dim::Static(n)) => Dim::Static(*n),
            _ => Dim::Dynamic,
        }
    }
}

/// Ordered list of dimensions.
///
/// Kept in a SmallVec: the vast majority of shapes in real models are rank
/// four or less.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub SmallVec<[Dim; 4]>);

impl Shape {
    /// Build a fully static shape.
    pub fn fixed(dims: &[usize]) -> Self {
        Shape(dims.iter().map(|&d| Dim::Static(d)).collect())
    }

    pub fn scalar() -> Self {
        Shape(SmallVec::new())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dim(&self, axis: usize) -> Option<Dim> {
        self.0.get(axis).copied()
    }

    pub fn is_fully_static(&self) -> bool {
        self.0.iter().all(|d| matches!(d, Dim::Static(_)))
    }

    /// Total element count, if every dimension is static.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().map(Dim::as_static).product()
    }

    /// Static dimension values, if the shape is fully static.
    pub fn static_dims(&self) -> Option<SmallVec<[usize; 4]>> {
        self.0.iter().map(Dim::as_static).collect()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match d {
                Dim::Static(n) => write!(f, "{n}")?,
                Dim::Dynamic => f.write_str("?")?,
            }
        }
        f.write_str("]")
    }
}

/// Attribute value: a scalar or an array of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }
}

/// Node attribute map. BTreeMap keeps debug output deterministic.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Dense constant payload used by folding and pruning.
///
/// Storage is always `f64`, which losslessly carries every supported element
/// type. Numeric kernels proper live outside this crate; evaluation here only
/// has to be good enough for constant folding and mask initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub elem: ElementType,
    pub shape: SmallVec<[usize; 4]>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn new(elem: ElementType, shape: impl Into<SmallVec<[usize; 4]>>, data: Vec<f64>) -> Self {
        let shape = shape.into();
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Tensor { elem, shape, data }
    }

    pub fn scalar(elem: ElementType, value: f64) -> Self {
        Tensor { elem, shape: SmallVec::new(), data: vec![value] }
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

/// Pruning mask for one graph value: per dimension, the set of indices along
/// that dimension whose slices are eligible for removal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mask {
    dims: Vec<BTreeSet<usize>>,
}

impl Mask {
    pub fn new(rank: usize) -> Self {
        Mask { dims: vec![BTreeSet::new(); rank] }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn at(&self, dim: usize) -> &BTreeSet<usize> {
        &self.dims[dim]
    }

    pub fn at_mut(&mut self, dim: usize) -> &mut BTreeSet<usize> {
        &mut self.dims[dim]
    }

    /// True when no dimension has any pruned index.
    pub fn is_empty(&self) -> bool {
        self.dims.iter().all(BTreeSet::is_empty)
    }

    /// Per-dimension intersection with another mask of the same rank.
    pub fn intersect(&self, other: &Mask) -> Mask {
        let dims = self
            .dims
            .iter()
            .zip(&other.dims)
            .map(|(a, b)| a.intersection(b).copied().collect())
            .collect();
        Mask { dims }
    }
}
