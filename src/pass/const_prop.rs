//! Constant propagation through pure elementwise operators.
//!
//! The tracer records shape constructors and literal arithmetic as real ops
//! feeding from `trace::Constant` nodes. Folding those here keeps the rest
//! of the pipeline free of symbolics it would otherwise need, and maximizes
//! what the (optional) post-translation constant-folding engine can reach.
//!
//! Only `tensor::{add, sub, mul, div, neg}` over same-shape tensor literals
//! are evaluated; anything the interpreter cannot handle (mixed dtypes,
//! integer division, division by zero) is left untouched.

use crate::error::Error;
use crate::ir::{ArithOp, AttrValue, Graph, Namespace, NodeId, NodeKind, TensorData};
use crate::pass::GraphPass;

pub struct ConstPropPass;

impl GraphPass for ConstPropPass {
    fn name(&self) -> &'static str {
        "const-prop"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                propagate_node(graph, nid)?;
            }
        }
        Ok(())
    }
}

/// Returns the literal payload of `value`'s producer if it is a constant
/// node carrying a tensor.
fn literal_input(graph: &Graph, node: NodeId, index: usize) -> Option<TensorData> {
    let input = *graph.node(node).inputs().get(index)?;
    let (producer, _) = graph.value(input).producer();
    let kind = graph.node(producer).kind();
    if !kind.is_trace("Constant") && !kind.is_onnx("Constant") {
        return None;
    }
    match graph.node(producer).attr("value") {
        Some(AttrValue::Tensor(t)) => Some(t.clone()),
        _ => None,
    }
}

fn propagate_node(graph: &mut Graph, nid: NodeId) -> Result<(), Error> {
    let kind = graph.node(nid).kind().clone();
    let n_inputs = graph.node(nid).inputs().len();
    let folded = if kind.namespace == Namespace::Tensor {
        match (kind.op.as_str(), n_inputs) {
            ("neg", 1) => literal_input(graph, nid, 0).and_then(|t| t.neg().ok()),
            ("add", 2) | ("sub", 2) | ("mul", 2) | ("div", 2) => {
                let op = match kind.op.as_str() {
                    "add" => ArithOp::Add,
                    "sub" => ArithOp::Sub,
                    "mul" => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                match (literal_input(graph, nid, 0), literal_input(graph, nid, 1)) {
                    (Some(lhs), Some(rhs)) => lhs.elementwise(&rhs, op).ok(),
                    _ => None,
                }
            }
            _ => None,
        }
    } else {
        None
    };

    let folded = match folded {
        Some(t) => t,
        None => return Ok(()),
    };
    let out = match graph.node(nid).output() {
        Some(out) => out,
        // Multi-output nodes are never propagated.
        None => return Ok(()),
    };

    let (block, pos) = graph.position(nid);
    let ty = folded.value_type();
    let constant = graph.insert_node(block, pos, NodeKind::trace("Constant"), &[]);
    graph.set_attr(constant, "value", AttrValue::Tensor(folded));
    let new_out = graph.add_node_output(constant, ty);
    graph.replace_all_uses(out, new_out);
    graph.erase_node(nid)?;
    Ok(())
}
