//! Constant folding over parameter-backed and literal-backed subgraphs.
//!
//! After translation, any node whose inputs are all compile-time known —
//! trained parameters or literal constants — can be replaced by its
//! precomputed value. The engine walks the block tree bottom-up (children
//! before parents, with an explicit traversal rather than recursion) and,
//! per node:
//!
//! 1. classifies every input as parameter-backed, constant-backed, or
//!    neither, and only proceeds when all inputs are classified;
//! 2. dispatches to a fixed set of interpreters (`Slice`, `Concat`,
//!    `Unsqueeze`, `Transpose`, plus same-shape elementwise `Add`/`Sub`/
//!    `Mul`); any other operator skips folding silently, but a foldable
//!    operator with malformed attributes is a fatal error;
//! 3. on success, registers the computed value as a fresh output of the
//!    block's parameter-source node, redirects all uses, strips the folded
//!    node's inputs, and garbage-collects parameter outputs (and their
//!    table entries) that lost their last use.
//!
//! Only single-output nodes are folded. Each invocation is a single pass:
//! a chain of dependent foldable nodes folds one level per call. Pass
//! `FoldOptions { to_fixed_point: true }` to repeat until nothing changes.

use crate::error::{Error, FoldError};
use crate::ir::{ArithOp, AttrValue, BlockId, Graph, NodeId, ParamMap, TensorData, ValueId};

/// Folding configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldOptions {
    /// Repeat the fold until no node changes, folding chains of dependent
    /// constant computations to arbitrary depth.
    pub to_fixed_point: bool,
}

/// Runs constant folding over the whole graph.
///
/// `params` is updated in place: folded results are added, and entries for
/// parameter outputs that lose their last use are removed.
pub fn fold_constants(
    graph: &mut Graph,
    params: &mut ParamMap,
    options: FoldOptions,
) -> Result<(), Error> {
    loop {
        let mut changed = false;
        for block in graph.blocks_post_order() {
            changed |= fold_block(graph, block, params)?;
        }
        if !changed || !options.to_fixed_point {
            return Ok(());
        }
    }
}

/// How a fully determinable input is backed.
enum Leaf {
    /// Output of the parameter-source node with a table entry.
    Param(ValueId),
    /// Output of a literal constant node.
    Constant,
}

fn fold_block(graph: &mut Graph, block: BlockId, params: &mut ParamMap) -> Result<bool, Error> {
    let source = graph.block(block).param_source();
    let mut changed = false;

    for nid in graph.node_ids(block) {
        // Only single-output nodes are folded.
        let out = match graph.node(nid).output() {
            Some(out) => out,
            None => continue,
        };
        let inputs = graph.node(nid).inputs().to_vec();
        if inputs.is_empty() {
            continue;
        }

        // Classify every input; bail on the first unclassifiable one.
        let mut tensors: Vec<TensorData> = Vec::with_capacity(inputs.len());
        let mut leaves: Vec<Leaf> = Vec::with_capacity(inputs.len());
        let mut determinable = true;
        for &input in &inputs {
            let (producer, _) = graph.value(input).producer();
            if producer == source && params.contains_key(&input) {
                tensors.push(params[&input].clone());
                leaves.push(Leaf::Param(input));
                continue;
            }
            let kind = graph.node(producer).kind();
            let is_constant = kind.is_onnx("Constant") || kind.is_trace("Constant");
            let literal = if is_constant {
                match graph.node(producer).attr("value") {
                    Some(AttrValue::Tensor(t)) => Some(t.clone()),
                    Some(AttrValue::Ints(is)) => Some(TensorData::stack_i64s(is)),
                    _ => None,
                }
            } else {
                None
            };
            match literal {
                Some(t) => {
                    tensors.push(t);
                    leaves.push(Leaf::Constant);
                }
                None => {
                    determinable = false;
                    break;
                }
            }
        }
        if !determinable {
            continue;
        }

        let computed = match run_backend(graph, nid, &tensors)? {
            Some(t) => t,
            // Not one of the foldable operators; skip, not an error.
            None => continue,
        };

        // Register the folded value as a new parameter-source output and
        // rewire all consumers onto it.
        let new_out = graph.add_block_input(block, None, computed.value_type());
        params.insert(new_out, computed);
        graph.replace_all_uses(out, new_out);
        graph.remove_all_inputs(nid);

        // A parameter output we just consumed may now be dead: prune it and
        // its table entry.
        for leaf in leaves {
            if let Leaf::Param(v) = leaf {
                if !graph.value(v).has_uses() {
                    params.remove(&v);
                    let index = graph
                        .node(source)
                        .outputs()
                        .iter()
                        .position(|&o| o == v);
                    if let Some(index) = index {
                        graph.erase_source_output(block, index)?;
                    }
                }
            }
        }
        changed = true;
    }

    // End-of-block sweep: any parameter-source output left without uses
    // goes, together with its table entry.
    for v in graph.node(source).outputs().to_vec() {
        if !graph.value(v).has_uses() {
            params.remove(&v);
        }
    }
    graph.erase_unused_source_outputs(block);
    Ok(changed)
}

/// Interprets one of the foldable target-format operators over concrete
/// inputs. Returns `Ok(None)` for any other operator.
fn run_backend(
    graph: &Graph,
    nid: NodeId,
    inputs: &[TensorData],
) -> Result<Option<TensorData>, FoldError> {
    let node = graph.node(nid);
    let op = node.kind().op.as_str();
    if !matches!(
        op,
        "Slice" | "Concat" | "Unsqueeze" | "Transpose" | "Add" | "Sub" | "Mul"
    ) || node.kind().namespace != crate::ir::Namespace::Onnx
    {
        return Ok(None);
    }

    let ints_attr = |name: &'static str| -> Result<Vec<i64>, FoldError> {
        match node.attr(name) {
            Some(AttrValue::Ints(v)) => Ok(v.clone()),
            Some(AttrValue::Int(v)) => Ok(vec![*v]),
            _ => Err(FoldError::MissingAttr {
                op: node.kind().to_string(),
                attr: name,
            }),
        }
    };

    match op {
        "Slice" => {
            expect_arity(node.kind().to_string(), inputs, 1)?;
            let axes = ints_attr("axes")?;
            let starts = ints_attr("starts")?;
            let ends = ints_attr("ends")?;
            if axes.len() != starts.len() || axes.len() != ends.len() {
                return Err(FoldError::SliceLengthMismatch {
                    op: node.kind().to_string(),
                });
            }
            let mut updated = inputs[0].clone();
            for ((&dim, &start), &end) in axes.iter().zip(&starts).zip(&ends) {
                updated = updated
                    .narrow(dim, start, end - start)
                    .map_err(|detail| FoldError::EvalFailed {
                        op: node.kind().to_string(),
                        detail,
                    })?;
            }
            Ok(Some(updated))
        }
        "Concat" => {
            let axis = match node.attr("axis") {
                Some(AttrValue::Int(v)) => *v,
                _ => {
                    return Err(FoldError::MissingAttr {
                        op: node.kind().to_string(),
                        attr: "axis",
                    })
                }
            };
            let parts: Vec<&TensorData> = inputs.iter().collect();
            TensorData::concat(&parts, axis)
                .map(Some)
                .map_err(|detail| FoldError::EvalFailed {
                    op: node.kind().to_string(),
                    detail,
                })
        }
        "Unsqueeze" => {
            expect_arity(node.kind().to_string(), inputs, 1)?;
            let axes = ints_attr("axes")?;
            let mut updated = inputs[0].clone();
            for &dim in &axes {
                updated = updated.unsqueeze(dim).map_err(|detail| FoldError::EvalFailed {
                    op: node.kind().to_string(),
                    detail,
                })?;
            }
            Ok(Some(updated))
        }
        "Transpose" => {
            expect_arity(node.kind().to_string(), inputs, 1)?;
            let perm = ints_attr("perm")?;
            inputs[0]
                .permute(&perm)
                .map(Some)
                .map_err(|detail| FoldError::EvalFailed {
                    op: node.kind().to_string(),
                    detail,
                })
        }
        // Same-shape elementwise arithmetic. Operands the interpreter cannot
        // handle (broadcasting, mixed dtypes) skip folding rather than fail:
        // the unfolded node is still perfectly serializable.
        "Add" | "Sub" | "Mul" => {
            if inputs.len() != 2 {
                return Ok(None);
            }
            let arith = match op {
                "Add" => ArithOp::Add,
                "Sub" => ArithOp::Sub,
                _ => ArithOp::Mul,
            };
            Ok(inputs[0].elementwise(&inputs[1], arith).ok())
        }
        _ => Ok(None),
    }
}

fn expect_arity(op: String, inputs: &[TensorData], arity: usize) -> Result<(), FoldError> {
    if inputs.len() != arity {
        return Err(FoldError::EvalFailed {
            detail: format!("expected {} input, got {}", arity, inputs.len()),
            op,
        });
    }
    Ok(())
}
