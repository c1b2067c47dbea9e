//! Structural graph lint.
//!
//! Re-checks the invariants every pass must preserve:
//! 1. Every live value's producer slot points back at it.
//! 2. Every use-list entry references a live operand slot or block-output
//!    declaration currently holding that value.
//! 3. Every operand references a live value, and that value records the use.
//! 4. Every block has its unique parameter-source node, and every live
//!    block is reachable from the top block.
//! 5. Every operand is defined before its first use, respecting block
//!    scoping (a nested block sees values defined earlier in enclosing
//!    blocks, but not vice versa, and not those of sibling blocks).
//!
//! A lint failure means the capture or an earlier pass is malformed; it is
//! fatal and never recovered.

use std::collections::HashSet;

use crate::error::{Error, PassError};
use crate::ir::{BlockId, Graph, Use, ValueId};
use crate::pass::GraphPass;

pub struct LintPass;

impl GraphPass for LintPass {
    fn name(&self) -> &'static str {
        "lint"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        check_producers(graph)?;
        check_uses(graph)?;
        check_operands(graph)?;
        check_blocks(graph)?;
        check_def_before_use(graph)?;
        Ok(())
    }
}

fn check_producers(graph: &Graph) -> Result<(), PassError> {
    for v in graph.live_values() {
        let (node, index) = graph.value(v).producer();
        if !graph.node_exists(node) {
            return Err(PassError::UseOfDeadValue {
                value: graph.value_name(v).to_owned(),
                node: node.to_string(),
            });
        }
        if graph.node(node).outputs().get(index) != Some(&v) {
            return Err(PassError::ProducerMismatch {
                node: graph.node(node).kind().to_string(),
                value: graph.value_name(v).to_owned(),
                index,
            });
        }
    }
    Ok(())
}

fn check_uses(graph: &Graph) -> Result<(), PassError> {
    for v in graph.live_values() {
        for u in graph.value(v).uses() {
            let holds = match *u {
                Use::Operand { node, index } => {
                    graph.node_exists(node) && graph.node(node).inputs().get(index) == Some(&v)
                }
                Use::BlockOutput { block, index } => {
                    graph.block_exists(block)
                        && graph.block(block).outputs().get(index) == Some(&v)
                }
            };
            if !holds {
                return Err(PassError::DanglingUse {
                    value: graph.value_name(v).to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn check_operands(graph: &Graph) -> Result<(), PassError> {
    for nid in graph.live_nodes() {
        for (index, &v) in graph.node(nid).inputs().iter().enumerate() {
            if !graph.value_exists(v) {
                return Err(PassError::UseOfDeadValue {
                    value: v.to_string(),
                    node: graph.node(nid).kind().to_string(),
                });
            }
            let recorded = graph
                .value(v)
                .uses()
                .iter()
                .any(|u| *u == Use::Operand { node: nid, index });
            if !recorded {
                return Err(PassError::DanglingUse {
                    value: graph.value_name(v).to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn check_blocks(graph: &Graph) -> Result<(), PassError> {
    let reachable: HashSet<_> = graph.blocks_post_order().into_iter().collect();
    for b in graph.live_blocks() {
        if !reachable.contains(&b) {
            return Err(PassError::Internal {
                pass: "lint",
                detail: format!("block {} is live but unreachable from the top block", b),
            });
        }
        let ps = graph.block(b).param_source();
        if !graph.node_exists(ps) || !graph.node(ps).is_param_source() {
            return Err(PassError::MissingParamSource);
        }
    }
    Ok(())
}

/// Walks the block tree with an explicit frame stack, tracking which values
/// are in scope at each point.
fn check_def_before_use(graph: &Graph) -> Result<(), PassError> {
    struct Frame {
        block: BlockId,
        /// Next node index to process within the block.
        next: usize,
        /// How many scope entries this frame pushed (popped on exit).
        pushed: usize,
    }

    fn enter(
        graph: &Graph,
        block: BlockId,
        scope: &mut Vec<ValueId>,
        in_scope: &mut HashSet<ValueId>,
    ) -> Frame {
        let mut pushed = 0;
        for &v in graph.block_inputs(block) {
            scope.push(v);
            in_scope.insert(v);
            pushed += 1;
        }
        Frame {
            block,
            next: 0,
            pushed,
        }
    }

    let mut scope: Vec<ValueId> = Vec::new();
    let mut in_scope: HashSet<ValueId> = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    let top = enter(graph, graph.top(), &mut scope, &mut in_scope);
    stack.push(top);
    while let Some(last) = stack.len().checked_sub(1) {
        let block = stack[last].block;
        let next = stack[last].next;
        if next >= graph.block(block).nodes().len() {
            // Leave the block: drop the values this frame brought into scope.
            for _ in 0..stack[last].pushed {
                if let Some(v) = scope.pop() {
                    in_scope.remove(&v);
                }
            }
            stack.pop();
            continue;
        }
        stack[last].next += 1;

        let nid = graph.block(block).nodes()[next];
        for &input in graph.node(nid).inputs() {
            if !in_scope.contains(&input) {
                return Err(PassError::UseBeforeDef {
                    value: graph.value_name(input).to_owned(),
                });
            }
        }
        for &out in graph.node(nid).outputs() {
            scope.push(out);
            in_scope.insert(out);
            // The node's outputs stay visible for the rest of this block.
            stack[last].pushed += 1;
        }
        for &child in graph.node(nid).child_blocks().iter().rev() {
            let child_frame = enter(graph, child, &mut scope, &mut in_scope);
            stack.push(child_frame);
        }
    }
    Ok(())
}
