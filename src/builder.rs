//! Node construction façade for target-format operators.
//!
//! `GraphBuilder` wraps a `Graph` plus an insertion point and is the only
//! way translation functions and tests emit target-namespace nodes. It owns
//! the attribute-suffix convention: attribute names are suffixed with a type
//! code (`alpha_f`, `axis_i`, `name_s`, `value_t`), list-ness is inferred
//! from the supplied value, and a name without a recognized suffix is
//! rejected. The suffix is stripped before the attribute is stored.
//!
//! Any raw tensor passed as an operator input is first wrapped in an
//! implicit `Constant` node.

use crate::error::BuildError;
use crate::ir::{AttrValue, BlockId, Graph, NodeId, NodeKind, TensorData, Type, ValueId};

/// A positional operator input: an existing value, or a literal tensor to be
/// wrapped in an implicit `Constant` node.
pub enum OpInput {
    Val(ValueId),
    Const(TensorData),
}

impl From<ValueId> for OpInput {
    fn from(v: ValueId) -> OpInput {
        OpInput::Val(v)
    }
}

impl From<TensorData> for OpInput {
    fn from(t: TensorData) -> OpInput {
        OpInput::Const(t)
    }
}

pub struct GraphBuilder<'g> {
    graph: &'g mut Graph,
    block: BlockId,
    at: usize,
}

impl<'g> GraphBuilder<'g> {
    /// A builder inserting at the end of `block`.
    pub fn new(graph: &'g mut Graph, block: BlockId) -> GraphBuilder<'g> {
        let at = graph.block(block).nodes().len();
        GraphBuilder { graph, block, at }
    }

    /// A builder inserting at a specific position within `block`.
    pub fn at(graph: &'g mut Graph, block: BlockId, index: usize) -> GraphBuilder<'g> {
        GraphBuilder {
            graph,
            block,
            at: index,
        }
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    /// The current insertion index within the block.
    pub fn insertion_index(&self) -> usize {
        self.at
    }

    fn insert(&mut self, kind: NodeKind, inputs: &[ValueId]) -> NodeId {
        let id = self.graph.insert_node(self.block, self.at, kind, inputs);
        self.at += 1;
        id
    }

    /// Constructs a target-namespace node and returns its id.
    ///
    /// `n_outputs` fresh tensor-typed outputs are attached. Attribute names
    /// follow the suffix convention described in the module docs.
    pub fn op_node(
        &mut self,
        op_type: &str,
        inputs: Vec<OpInput>,
        attrs: Vec<(&str, AttrValue)>,
        n_outputs: usize,
    ) -> Result<NodeId, BuildError> {
        // Wrap literal inputs first so the implicit constants precede the op.
        let mut input_values = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                OpInput::Val(v) => input_values.push(v),
                OpInput::Const(t) => input_values.push(self.constant(t)),
            }
        }
        let id = self.insert(NodeKind::onnx(op_type), &input_values);
        for _ in 0..n_outputs {
            self.graph.add_node_output(id, Type::tensor());
        }
        for (name, value) in attrs {
            let stripped = check_attr_name(name, &value)?;
            self.graph.set_attr(id, stripped, value);
        }
        Ok(id)
    }

    /// Constructs a single-output target-namespace node and returns its
    /// output value.
    pub fn op(
        &mut self,
        op_type: &str,
        inputs: Vec<OpInput>,
        attrs: Vec<(&str, AttrValue)>,
    ) -> Result<ValueId, BuildError> {
        let id = self.op_node(op_type, inputs, attrs, 1)?;
        Ok(self.graph.node(id).outputs()[0])
    }

    /// Constructs a multi-output target-namespace node and returns its
    /// output values.
    pub fn op_multi(
        &mut self,
        op_type: &str,
        inputs: Vec<OpInput>,
        attrs: Vec<(&str, AttrValue)>,
        n_outputs: usize,
    ) -> Result<Vec<ValueId>, BuildError> {
        let id = self.op_node(op_type, inputs, attrs, n_outputs)?;
        Ok(self.graph.node(id).outputs().to_vec())
    }

    /// Constructs a literal `Constant` node from a scalar or small tensor.
    pub fn constant(&mut self, value: TensorData) -> ValueId {
        let ty = value.value_type();
        let id = self.insert(NodeKind::onnx("Constant"), &[]);
        self.graph.set_attr(id, "value", AttrValue::Tensor(value));
        self.graph.add_node_output(id, ty)
    }

    /// Constructs an opaque wrapper node tagging an untranslated operator
    /// name, carrying the source node's attributes verbatim.
    pub fn opaque(
        &mut self,
        operator: &str,
        inputs: Vec<OpInput>,
        raw_attrs: Vec<(String, AttrValue)>,
        n_outputs: usize,
    ) -> Result<Vec<ValueId>, BuildError> {
        let mut input_values = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                OpInput::Val(v) => input_values.push(v),
                OpInput::Const(t) => input_values.push(self.constant(t)),
            }
        }
        let id = self.insert(NodeKind::onnx("Opaque"), &input_values);
        for _ in 0..n_outputs {
            self.graph.add_node_output(id, Type::tensor());
        }
        self.graph
            .set_attr(id, "operator", AttrValue::Str(operator.to_owned()));
        for (name, value) in raw_attrs {
            self.graph.set_attr(id, name, value);
        }
        Ok(self.graph.node(id).outputs().to_vec())
    }
}

/// Validates the `name_<code>` suffix against the attribute value's kind and
/// returns the stripped base name.
fn check_attr_name<'a>(name: &'a str, value: &AttrValue) -> Result<&'a str, BuildError> {
    let (base, code) = name.rsplit_once('_').ok_or_else(|| BuildError::InvalidAttrName {
        name: name.to_owned(),
    })?;
    if base.is_empty() || !matches!(code, "f" | "i" | "s" | "t") {
        return Err(BuildError::InvalidAttrName {
            name: name.to_owned(),
        });
    }
    // List-ness is inferred from the value; the suffix carries only the
    // element code.
    let value_code = match value.kind_code() {
        "f" | "fs" => "f",
        "i" | "is" => "i",
        "s" | "ss" => "s",
        "t" | "ts" => "t",
        other => other,
    };
    if value_code != code {
        return Err(BuildError::AttrKindMismatch {
            name: name.to_owned(),
            code: code.to_owned(),
            kind: value.kind_code().to_owned(),
        });
    }
    Ok(base)
}
