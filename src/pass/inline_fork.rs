//! Inlines deferred fork/wait subcomputations.
//!
//! A tracer records a deferred computation as a `trace::Fork` node owning a
//! child block, producing a future value that one or more `trace::Wait`
//! nodes resolve. The target format is strictly sequential, so this pass
//! splices every fork body inline at the fork site and rewires each wait's
//! outputs to the body's outputs. No concurrency marker survives the pass;
//! the rest of the pipeline assumes sequential execution.

use crate::error::{Error, PassError};
use crate::ir::{Graph, NodeId, Use};
use crate::pass::GraphPass;

pub struct InlineForkWaitPass;

impl GraphPass for InlineForkWaitPass {
    fn name(&self) -> &'static str {
        "inline-fork-wait"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                if graph.node(nid).kind().is_trace("Fork") {
                    inline_one(graph, nid)?;
                }
            }
        }
        Ok(())
    }
}

fn inline_one(graph: &mut Graph, fork: NodeId) -> Result<(), Error> {
    let body = match graph.node(fork).child_blocks() {
        [body] => *body,
        other => {
            return Err(PassError::Internal {
                pass: "inline-fork-wait",
                detail: format!("fork node owns {} blocks, expected 1", other.len()),
            }
            .into())
        }
    };

    // Substitute the body's declared inputs with the fork's actual arguments.
    let body_inputs = graph.block_inputs(body).to_vec();
    let fork_inputs = graph.node(fork).inputs().to_vec();
    if body_inputs.len() != fork_inputs.len() {
        return Err(PassError::Internal {
            pass: "inline-fork-wait",
            detail: format!(
                "fork passes {} arguments but its body declares {} inputs",
                fork_inputs.len(),
                body_inputs.len()
            ),
        }
        .into());
    }
    for (&bi, &fi) in body_inputs.iter().zip(fork_inputs.iter()) {
        graph.replace_all_uses(bi, fi);
    }

    // Splice the body's nodes into the enclosing block, just before the fork.
    let (owner, pos) = graph.position(fork);
    for (offset, nid) in graph.node_ids(body).into_iter().enumerate() {
        graph.move_node_to(nid, owner, pos + offset);
    }

    // Resolve every wait on the fork's future against the body's outputs.
    let body_outputs = graph.block(body).outputs().to_vec();
    let futures = graph.node(fork).outputs().to_vec();
    let mut waits: Vec<NodeId> = Vec::new();
    for &future in &futures {
        for u in graph.value(future).uses() {
            if let Use::Operand { node, .. } = *u {
                if graph.node(node).kind().is_trace("Wait") && !waits.contains(&node) {
                    waits.push(node);
                }
            }
        }
    }
    for wait in waits {
        let wait_outputs = graph.node(wait).outputs().to_vec();
        if wait_outputs.len() != body_outputs.len() {
            return Err(PassError::Internal {
                pass: "inline-fork-wait",
                detail: format!(
                    "wait produces {} values but the forked body returns {}",
                    wait_outputs.len(),
                    body_outputs.len()
                ),
            }
            .into());
        }
        for (&wo, &bo) in wait_outputs.iter().zip(body_outputs.iter()) {
            graph.replace_all_uses(wo, bo);
        }
        graph.erase_node(wait)?;
    }

    graph.clear_block_outputs(body);
    graph.erase_node(fork)?;
    Ok(())
}
