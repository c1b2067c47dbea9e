//! Operator nodes and their typed attributes.

use std::collections::BTreeMap;
use std::fmt;

use crate::ir::block::BlockId;
use crate::ir::types::TensorData;
use crate::ir::value::ValueId;

/// An opaque, index-based reference to a node within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The origin namespace of an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Target-format operators; already in final form.
    Onnx,
    /// Generic tensor operators recorded by the tracer.
    Tensor,
    /// Structural / control-flow primitives (`Param`, `Constant`, `Loop`, ...).
    Trace,
    /// Anything the exporter does not recognize; passed through untouched.
    Custom(String),
}

impl Namespace {
    pub fn as_str(&self) -> &str {
        match self {
            Namespace::Onnx => "onnx",
            Namespace::Tensor => "tensor",
            Namespace::Trace => "trace",
            Namespace::Custom(s) => s,
        }
    }
}

/// A namespaced operator kind, e.g. `tensor::add` or `onnx::Slice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKind {
    pub namespace: Namespace,
    pub op: String,
}

impl NodeKind {
    pub fn onnx(op: impl Into<String>) -> NodeKind {
        NodeKind {
            namespace: Namespace::Onnx,
            op: op.into(),
        }
    }

    pub fn tensor(op: impl Into<String>) -> NodeKind {
        NodeKind {
            namespace: Namespace::Tensor,
            op: op.into(),
        }
    }

    pub fn trace(op: impl Into<String>) -> NodeKind {
        NodeKind {
            namespace: Namespace::Trace,
            op: op.into(),
        }
    }

    /// Parses a `namespace::op` string; an unrecognized namespace becomes
    /// `Namespace::Custom`.
    pub fn parse(kind: &str) -> NodeKind {
        let (ns, op) = match kind.split_once("::") {
            Some((ns, op)) => (ns, op),
            None => ("onnx", kind),
        };
        let namespace = match ns {
            "onnx" => Namespace::Onnx,
            "tensor" => Namespace::Tensor,
            "trace" => Namespace::Trace,
            other => Namespace::Custom(other.to_owned()),
        };
        NodeKind {
            namespace,
            op: op.to_owned(),
        }
    }

    pub fn is(&self, namespace: &Namespace, op: &str) -> bool {
        self.namespace == *namespace && self.op == op
    }

    pub fn is_onnx(&self, op: &str) -> bool {
        self.namespace == Namespace::Onnx && self.op == op
    }

    pub fn is_trace(&self, op: &str) -> bool {
        self.namespace == Namespace::Trace && self.op == op
    }

    pub fn is_tensor(&self, op: &str) -> bool {
        self.namespace == Namespace::Tensor && self.op == op
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace.as_str(), self.op)
    }
}

/// A typed attribute value: scalar or list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Float(f64),
    Int(i64),
    Str(String),
    Tensor(TensorData),
    /// A reference to a child block serialized as a subgraph.
    Graph(BlockId),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
    Strs(Vec<String>),
    Tensors(Vec<TensorData>),
}

impl AttrValue {
    /// The attribute's type code, as used in builder attribute suffixes
    /// and diagnostic messages.
    pub fn kind_code(&self) -> &'static str {
        match self {
            AttrValue::Float(_) => "f",
            AttrValue::Int(_) => "i",
            AttrValue::Str(_) => "s",
            AttrValue::Tensor(_) => "t",
            AttrValue::Graph(_) => "g",
            AttrValue::Floats(_) => "fs",
            AttrValue::Ints(_) => "is",
            AttrValue::Strs(_) => "ss",
            AttrValue::Tensors(_) => "ts",
        }
    }
}

/// A single operator instance.
///
/// All fields are `pub(crate)`: mutation goes through `Graph` methods so the
/// value use-lists stay consistent.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    /// The block this node currently lives in.
    pub(crate) block: BlockId,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
    pub(crate) attrs: BTreeMap<String, AttrValue>,
    /// Child blocks, for structural control-flow nodes only.
    pub(crate) blocks: Vec<BlockId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// The single output of a one-output node.
    pub fn output(&self) -> Option<ValueId> {
        match self.outputs.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Attributes in sorted name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn child_blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// True for the per-block parameter-source node.
    pub fn is_param_source(&self) -> bool {
        self.kind.is_trace("Param")
    }
}
