//! Dead-code elimination.
//!
//! A node is dead when every one of its outputs has no uses; block-output
//! declarations count as uses, so anything feeding a graph or loop-body
//! result stays live. Blocks are processed children-first and nodes in
//! reverse program order, so one sweep removes transitively dead chains:
//! erasing a consumer frees its operands' uses before their producers are
//! visited.

use crate::error::Error;
use crate::ir::Graph;
use crate::pass::GraphPass;

pub struct DcePass;

impl GraphPass for DcePass {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block).into_iter().rev() {
                let dead = graph
                    .node(nid)
                    .outputs()
                    .iter()
                    .all(|&out| !graph.value(out).has_uses());
                if dead {
                    graph.erase_node(nid)?;
                }
            }
        }
        Ok(())
    }
}
