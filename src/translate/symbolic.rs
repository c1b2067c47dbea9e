//! Translation functions for generic tensor operators.
//!
//! Each function receives the builder positioned in the destination block,
//! a context exposing the source node's attributes, and the
//! already-translated input values. It returns the destination values that
//! stand for the source node's outputs — newly built nodes, or existing
//! values when the operator translates to nothing (`dropout` in inference
//! mode just forwards its input).
//!
//! Argument-shape mismatches are reported through `ctx.mismatch(...)`,
//! which attaches the offending operator name; the translator re-raises
//! them as fatal.

use std::collections::HashMap;

use crate::builder::{GraphBuilder, OpInput};
use crate::error::{Error, TranslateError};
use crate::ir::{AttrValue, Graph, Node, TensorData, Type, ValueId};
use crate::translate::registry::SymbolicRegistry;

/// A translation function: source node → destination values.
pub type SymbolicFn =
    fn(&mut GraphBuilder, &SymbolicCtx, &[ValueId]) -> Result<Vec<ValueId>, Error>;

/// Read-only view of the node being translated.
pub struct SymbolicCtx<'a> {
    pub source: &'a Graph,
    pub node: &'a Node,
    pub(crate) env: &'a HashMap<ValueId, ValueId>,
}

impl<'a> SymbolicCtx<'a> {
    pub fn op_name(&self) -> &str {
        &self.node.kind().op
    }

    /// An argument-shape mismatch, tagged with the operator name.
    pub fn mismatch(&self, detail: impl Into<String>) -> Error {
        TranslateError::ArgumentMismatch {
            op: self.node.kind().to_string(),
            detail: detail.into(),
        }
        .into()
    }

    pub fn int_attr(&self, name: &str) -> Result<i64, Error> {
        match self.node.attr(name) {
            Some(AttrValue::Int(v)) => Ok(*v),
            _ => Err(self.mismatch(format!("expected integer attribute '{}'", name))),
        }
    }

    pub fn opt_int_attr(&self, name: &str) -> Option<i64> {
        match self.node.attr(name) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn ints_attr(&self, name: &str) -> Result<Vec<i64>, Error> {
        match self.node.attr(name) {
            Some(AttrValue::Ints(v)) => Ok(v.clone()),
            Some(AttrValue::Int(v)) => Ok(vec![*v]),
            _ => Err(self.mismatch(format!("expected integer-list attribute '{}'", name))),
        }
    }

    pub fn opt_float_attr(&self, name: &str) -> Option<f64> {
        match self.node.attr(name) {
            Some(AttrValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// The known rank of source input `index`, if its type records one.
    pub fn input_rank(&self, index: usize) -> Option<usize> {
        let input = *self.node.inputs().get(index)?;
        match self.source.value_type(input) {
            Type::Tensor {
                shape: Some(shape), ..
            } => Some(shape.len()),
            _ => None,
        }
    }

    /// If source input `index` is produced by a `ListConstruct`, the
    /// already-translated element values.
    pub fn unpack_list(&self, index: usize) -> Option<Vec<ValueId>> {
        let input = *self.node.inputs().get(index)?;
        let (producer, _) = self.source.value(input).producer();
        let node = self.source.node(producer);
        if !node.kind().is_trace("ListConstruct") {
            return None;
        }
        node.inputs()
            .iter()
            .map(|v| self.env.get(v).copied())
            .collect()
    }
}

/// Registers every translation function this crate ships.
pub fn register_standard(registry: &mut SymbolicRegistry) {
    registry.register_tensor_op("add", add);
    registry.register_tensor_op("sub", sub);
    registry.register_tensor_op("mul", mul);
    registry.register_tensor_op("div", div);
    registry.register_tensor_op("pow", pow);
    registry.register_tensor_op("neg", neg);
    registry.register_tensor_op("exp", exp);
    registry.register_tensor_op("log", log_);
    registry.register_tensor_op("sqrt", sqrt);
    registry.register_tensor_op("abs", abs);
    registry.register_tensor_op("relu", relu);
    registry.register_tensor_op("sigmoid", sigmoid);
    registry.register_tensor_op("tanh", tanh);
    registry.register_tensor_op("softmax", softmax);
    registry.register_tensor_op("matmul", matmul);
    registry.register_tensor_op("t", t);
    registry.register_tensor_op("transpose", transpose);
    registry.register_tensor_op("permute", permute);
    registry.register_tensor_op("cat", cat);
    registry.register_tensor_op("stack", stack);
    registry.register_tensor_op("unsqueeze", unsqueeze);
    registry.register_tensor_op("squeeze", squeeze);
    registry.register_tensor_op("slice", slice);
    registry.register_tensor_op("reshape", reshape);
    registry.register_tensor_op("view", reshape);
    registry.register_tensor_op("flatten", flatten);
    registry.register_tensor_op("clamp", clamp);
    registry.register_tensor_op("mean", mean);
    registry.register_tensor_op("sum", sum);
    registry.register_tensor_op("cast", cast);
    registry.register_tensor_op("dropout", dropout);

    registry.register_structural_op("NumToTensor", num_to_tensor);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn exactly<const N: usize>(
    ctx: &SymbolicCtx,
    inputs: &[ValueId],
) -> Result<[ValueId; N], Error> {
    <[ValueId; N]>::try_from(inputs)
        .map_err(|_| ctx.mismatch(format!("expected {} inputs, got {}", N, inputs.len())))
}

fn binary(
    b: &mut GraphBuilder,
    ctx: &SymbolicCtx,
    inputs: &[ValueId],
    op_type: &str,
) -> Result<Vec<ValueId>, Error> {
    let [lhs, rhs] = exactly::<2>(ctx, inputs)?;
    let out = b.op(op_type, vec![lhs.into(), rhs.into()], vec![])?;
    Ok(vec![out])
}

fn unary(
    b: &mut GraphBuilder,
    ctx: &SymbolicCtx,
    inputs: &[ValueId],
    op_type: &str,
) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, inputs)?;
    let out = b.op(op_type, vec![x.into()], vec![])?;
    Ok(vec![out])
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn add(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "Add")
}

fn sub(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "Sub")
}

fn mul(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "Mul")
}

fn div(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "Div")
}

fn pow(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "Pow")
}

fn matmul(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    binary(b, ctx, i, "MatMul")
}

fn neg(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Neg")
}

fn exp(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Exp")
}

fn log_(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Log")
}

fn sqrt(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Sqrt")
}

fn abs(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Abs")
}

// ---------------------------------------------------------------------------
// Activations
// ---------------------------------------------------------------------------

fn relu(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Relu")
}

fn sigmoid(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Sigmoid")
}

fn tanh(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    unary(b, ctx, i, "Tanh")
}

fn softmax(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let axis = ctx.int_attr("dim")?;
    let out = b.op("Softmax", vec![x.into()], vec![("axis_i", AttrValue::Int(axis))])?;
    Ok(vec![out])
}

/// Inference-mode export: dropout is the identity, so translate to nothing
/// and forward the input.
fn dropout(_b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    Ok(vec![x])
}

/// Scalar numbers were already erased to 0-d tensors, so the conversion
/// primitive forwards its operand.
fn num_to_tensor(
    _b: &mut GraphBuilder,
    ctx: &SymbolicCtx,
    i: &[ValueId],
) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    Ok(vec![x])
}

// ---------------------------------------------------------------------------
// Shape manipulation
// ---------------------------------------------------------------------------

fn t(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let out = b.op(
        "Transpose",
        vec![x.into()],
        vec![("perm_i", AttrValue::Ints(vec![1, 0]))],
    )?;
    Ok(vec![out])
}

fn transpose(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let dim0 = ctx.int_attr("dim0")?;
    let dim1 = ctx.int_attr("dim1")?;
    let rank = ctx
        .input_rank(0)
        .ok_or_else(|| ctx.mismatch("transpose requires a known input rank"))? as i64;
    let fix = |d: i64| if d < 0 { d + rank } else { d };
    let (dim0, dim1) = (fix(dim0), fix(dim1));
    if dim0 < 0 || dim0 >= rank || dim1 < 0 || dim1 >= rank {
        return Err(ctx.mismatch(format!(
            "dimensions ({}, {}) out of range for rank {}",
            dim0, dim1, rank
        )));
    }
    let mut perm: Vec<i64> = (0..rank).collect();
    perm.swap(dim0 as usize, dim1 as usize);
    let out = b.op("Transpose", vec![x.into()], vec![("perm_i", AttrValue::Ints(perm))])?;
    Ok(vec![out])
}

fn permute(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let dims = ctx.ints_attr("dims")?;
    let out = b.op("Transpose", vec![x.into()], vec![("perm_i", AttrValue::Ints(dims))])?;
    Ok(vec![out])
}

fn cat(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let axis = ctx.int_attr("dim")?;
    // The list marker flows through; target peephole splices the elements
    // into the Concat's operand list.
    let [list] = exactly::<1>(ctx, i)?;
    let out = b.op("Concat", vec![list.into()], vec![("axis_i", AttrValue::Int(axis))])?;
    Ok(vec![out])
}

fn stack(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let axis = ctx.int_attr("dim")?;
    let [_list] = exactly::<1>(ctx, i)?;
    let elements = ctx
        .unpack_list(0)
        .ok_or_else(|| ctx.mismatch("stack requires a literal tensor list"))?;
    let mut unsqueezed: Vec<OpInput> = Vec::with_capacity(elements.len());
    for element in elements {
        let u = b.op(
            "Unsqueeze",
            vec![element.into()],
            vec![("axes_i", AttrValue::Ints(vec![axis]))],
        )?;
        unsqueezed.push(u.into());
    }
    let out = b.op("Concat", unsqueezed, vec![("axis_i", AttrValue::Int(axis))])?;
    Ok(vec![out])
}

fn unsqueeze(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let axes = ctx.ints_attr("dim")?;
    let out = b.op("Unsqueeze", vec![x.into()], vec![("axes_i", AttrValue::Ints(axes))])?;
    Ok(vec![out])
}

fn squeeze(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let attrs = match ctx.opt_int_attr("dim") {
        Some(dim) => vec![("axes_i", AttrValue::Ints(vec![dim]))],
        None => vec![],
    };
    let out = b.op("Squeeze", vec![x.into()], attrs)?;
    Ok(vec![out])
}

fn slice(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let dim = ctx.int_attr("dim")?;
    let start = ctx.int_attr("start")?;
    let end = ctx.int_attr("end")?;
    if ctx.opt_int_attr("step").unwrap_or(1) != 1 {
        return Err(ctx.mismatch("strided slice is not representable in the target format"));
    }
    let out = b.op(
        "Slice",
        vec![x.into()],
        vec![
            ("axes_i", AttrValue::Ints(vec![dim])),
            ("starts_i", AttrValue::Ints(vec![start])),
            ("ends_i", AttrValue::Ints(vec![end])),
        ],
    )?;
    Ok(vec![out])
}

fn reshape(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let shape = ctx.ints_attr("shape")?;
    let len = shape.len() as i64;
    let shape_tensor = TensorData::from_i64s(shape, vec![len])
        .map_err(|detail| ctx.mismatch(detail))?;
    // The shape operand is a raw tensor; the builder wraps it in an
    // implicit Constant.
    let out = b.op("Reshape", vec![x.into(), shape_tensor.into()], vec![])?;
    Ok(vec![out])
}

fn flatten(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let start_dim = ctx.opt_int_attr("start_dim").unwrap_or(0);
    let end_dim = ctx.opt_int_attr("end_dim").unwrap_or(-1);
    if end_dim != -1 {
        return Err(ctx.mismatch("only flattening through the last dimension is supported"));
    }
    let out = b.op("Flatten", vec![x.into()], vec![("axis_i", AttrValue::Int(start_dim))])?;
    Ok(vec![out])
}

fn clamp(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let mut attrs = Vec::new();
    if let Some(min) = ctx.opt_float_attr("min") {
        attrs.push(("min_f", AttrValue::Float(min)));
    }
    if let Some(max) = ctx.opt_float_attr("max") {
        attrs.push(("max_f", AttrValue::Float(max)));
    }
    if attrs.is_empty() {
        return Err(ctx.mismatch("clamp requires at least one of 'min' and 'max'"));
    }
    let out = b.op("Clip", vec![x.into()], attrs)?;
    Ok(vec![out])
}

// ---------------------------------------------------------------------------
// Reductions and casts
// ---------------------------------------------------------------------------

fn reduce(
    b: &mut GraphBuilder,
    ctx: &SymbolicCtx,
    inputs: &[ValueId],
    op_type: &str,
) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, inputs)?;
    let mut attrs = Vec::new();
    if let Some(AttrValue::Ints(dims)) = ctx.node.attr("dim") {
        attrs.push(("axes_i", AttrValue::Ints(dims.clone())));
    } else if let Some(dim) = ctx.opt_int_attr("dim") {
        attrs.push(("axes_i", AttrValue::Ints(vec![dim])));
    }
    let keepdims = ctx.opt_int_attr("keepdim").unwrap_or(0);
    attrs.push(("keepdims_i", AttrValue::Int(keepdims)));
    let out = b.op(op_type, vec![x.into()], attrs)?;
    Ok(vec![out])
}

fn mean(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    reduce(b, ctx, i, "ReduceMean")
}

fn sum(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    reduce(b, ctx, i, "ReduceSum")
}

fn cast(b: &mut GraphBuilder, ctx: &SymbolicCtx, i: &[ValueId]) -> Result<Vec<ValueId>, Error> {
    let [x] = exactly::<1>(ctx, i)?;
    let to = match ctx.node.attr("to") {
        Some(AttrValue::Str(s)) => s.clone(),
        _ => return Err(ctx.mismatch("expected string attribute 'to'")),
    };
    // Target-format element type codes.
    let code = match to.as_str() {
        "f32" => 1,
        "f64" => 11,
        "i32" => 6,
        "i64" => 7,
        "bool" => 9,
        other => return Err(ctx.mismatch(format!("unknown cast target '{}'", other))),
    };
    let out = b.op("Cast", vec![x.into()], vec![("to_i", AttrValue::Int(code))])?;
    Ok(vec![out])
}
