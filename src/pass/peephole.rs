//! Peephole simplification of local patterns.
//!
//! Runs in two flavors:
//! - `generic()` — before translation, over tracer-namespace ops:
//!   identity/double transposes and `ListConstruct`/`ListUnpack` pairs.
//! - `target()` — after translation, over target-namespace ops: identity
//!   `Transpose` removal, `Transpose` composition, and absorbing leftover
//!   `ListConstruct` markers into the operand lists of their consumers
//!   (translation clones the markers as-is and leaves the cleanup here).
//!
//! With the re-optimize flag set (the default in the pipeline), rule
//! application repeats until a sweep changes nothing.

use crate::error::Error;
use crate::ir::{AttrValue, Graph, Namespace, NodeId};
use crate::pass::GraphPass;

pub struct PeepholePass {
    target_mode: bool,
    reoptimize: bool,
}

impl PeepholePass {
    /// Pre-translation peephole over tracer-namespace ops.
    pub fn generic() -> PeepholePass {
        PeepholePass {
            target_mode: false,
            reoptimize: true,
        }
    }

    /// Post-translation peephole over target-namespace ops.
    pub fn target() -> PeepholePass {
        PeepholePass {
            target_mode: true,
            reoptimize: true,
        }
    }
}

impl GraphPass for PeepholePass {
    fn name(&self) -> &'static str {
        if self.target_mode {
            "peephole-target"
        } else {
            "peephole"
        }
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        loop {
            let mut changed = false;
            for block in graph.blocks_post_order() {
                for nid in graph.node_ids(block) {
                    if !graph.node_exists(nid) {
                        // Removed by an earlier rule in this sweep.
                        continue;
                    }
                    changed |= if self.target_mode {
                        simplify_target(graph, nid)?
                    } else {
                        simplify_generic(graph, nid)?
                    };
                }
            }
            if !changed || !self.reoptimize {
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Generic rules
// ---------------------------------------------------------------------------

fn simplify_generic(graph: &mut Graph, nid: NodeId) -> Result<bool, Error> {
    let kind = graph.node(nid).kind().clone();

    // permute(x, dims=identity) → x
    if kind.is_tensor("permute") {
        if let Some(AttrValue::Ints(dims)) = graph.node(nid).attr("dims") {
            if is_identity(dims) {
                return forward_to_input(graph, nid);
            }
        }
    }

    // transpose(x, dim0, dim1) with dim0 == dim1 → x
    if kind.is_tensor("transpose") {
        let dim0 = graph.node(nid).attr("dim0").cloned();
        let dim1 = graph.node(nid).attr("dim1").cloned();
        if let (Some(AttrValue::Int(a)), Some(AttrValue::Int(b))) = (dim0, dim1) {
            if a == b {
                return forward_to_input(graph, nid);
            }
        }
    }

    // t(t(x)) → x
    if kind.is_tensor("t") {
        if let Some(inner) = single_input_producer(graph, nid) {
            if graph.node(inner).kind().is_tensor("t") {
                let x = graph.node(inner).inputs()[0];
                let out = graph.node(nid).outputs()[0];
                graph.replace_all_uses(out, x);
                graph.erase_node(nid)?;
                return Ok(true);
            }
        }
    }

    // ListUnpack(ListConstruct(xs...)) → xs...
    if kind.is_trace("ListUnpack") {
        return cancel_list_pair(graph, nid);
    }

    Ok(false)
}

// ---------------------------------------------------------------------------
// Target rules
// ---------------------------------------------------------------------------

fn simplify_target(graph: &mut Graph, nid: NodeId) -> Result<bool, Error> {
    let kind = graph.node(nid).kind().clone();

    if kind.is_onnx("Transpose") {
        if let Some(AttrValue::Ints(perm)) = graph.node(nid).attr("perm") {
            if is_identity(perm) {
                return forward_to_input(graph, nid);
            }
        }
        // Transpose(Transpose(x, p1), p2) → Transpose(x, p1 ∘ p2)
        if let Some(inner) = single_input_producer(graph, nid) {
            if graph.node(inner).kind().is_onnx("Transpose") {
                let outer_perm = graph.node(nid).attr("perm").cloned();
                let inner_perm = graph.node(inner).attr("perm").cloned();
                if let (Some(AttrValue::Ints(outer)), Some(AttrValue::Ints(inner_p))) =
                    (outer_perm, inner_perm)
                {
                    let in_range = outer
                        .iter()
                        .all(|&i| 0 <= i && (i as usize) < inner_p.len());
                    if outer.len() == inner_p.len() && in_range {
                        let composed: Vec<i64> =
                            outer.iter().map(|&i| inner_p[i as usize]).collect();
                        let x = graph.node(inner).inputs()[0];
                        graph.replace_input(nid, 0, x);
                        graph.set_attr(nid, "perm", AttrValue::Ints(composed));
                        return Ok(true);
                    }
                }
            }
        }
    }

    // Marker cancellation survives into target mode: translation clones the
    // list markers unchanged.
    if kind.is_trace("ListUnpack") {
        return cancel_list_pair(graph, nid);
    }

    // Absorb a ListConstruct operand into the consumer's operand list.
    if kind.namespace == Namespace::Onnx {
        for (index, &input) in graph.node(nid).inputs().to_vec().iter().enumerate() {
            let (producer, _) = graph.value(input).producer();
            if graph.node(producer).kind().is_trace("ListConstruct") {
                let elements = graph.node(producer).inputs().to_vec();
                graph.splice_input(nid, index, &elements);
                return Ok(true);
            }
        }
    }

    Ok(false)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn is_identity(perm: &[i64]) -> bool {
    perm.iter().enumerate().all(|(i, &p)| p == i as i64)
}

/// The producer of the node's single input, if it has exactly one input.
fn single_input_producer(graph: &Graph, nid: NodeId) -> Option<NodeId> {
    match graph.node(nid).inputs() {
        [input] => Some(graph.value(*input).producer().0),
        _ => None,
    }
}

/// Replaces all uses of a single-output node with its first input and
/// erases it.
fn forward_to_input(graph: &mut Graph, nid: NodeId) -> Result<bool, Error> {
    let input = graph.node(nid).inputs()[0];
    let out = graph.node(nid).outputs()[0];
    graph.replace_all_uses(out, input);
    graph.erase_node(nid)?;
    Ok(true)
}

/// Cancels a `ListUnpack` against the `ListConstruct` feeding it.
fn cancel_list_pair(graph: &mut Graph, unpack: NodeId) -> Result<bool, Error> {
    let construct = match single_input_producer(graph, unpack) {
        Some(n) if graph.node(n).kind().is_trace("ListConstruct") => n,
        _ => return Ok(false),
    };
    let elements = graph.node(construct).inputs().to_vec();
    let outputs = graph.node(unpack).outputs().to_vec();
    if elements.len() != outputs.len() {
        return Ok(false);
    }
    for (&out, &element) in outputs.iter().zip(elements.iter()) {
        graph.replace_all_uses(out, element);
    }
    graph.erase_node(unpack)?;
    // The construct node dies with its last unpack; DCE sweeps it later if
    // other consumers remain.
    if graph
        .node(construct)
        .outputs()
        .iter()
        .all(|&o| !graph.value(o).has_uses())
    {
        graph.erase_node(construct)?;
    }
    Ok(true)
}
