//! Splits list-of-tensor literals into explicit list construction.
//!
//! Constant propagation can produce a single `Constant` whose payload is a
//! list of tensors, but the target format cannot represent a list-valued
//! literal. Each such constant becomes N scalar `Constant` nodes feeding a
//! `trace::ListConstruct`, which downstream peephole cleanup knows how to
//! absorb into its consumers.

use crate::error::Error;
use crate::ir::{AttrValue, Graph, NodeKind, Type};
use crate::pass::GraphPass;

pub struct SplitListConstantsPass;

impl GraphPass for SplitListConstantsPass {
    fn name(&self) -> &'static str {
        "split-list-constants"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                if !graph.node(nid).kind().is_trace("Constant") {
                    continue;
                }
                let tensors = match graph.node(nid).attr("value") {
                    Some(AttrValue::Tensors(ts)) => ts.clone(),
                    _ => continue,
                };
                let out = match graph.node(nid).output() {
                    Some(out) => out,
                    None => continue,
                };

                let (owner, pos) = graph.position(nid);
                let mut elements = Vec::with_capacity(tensors.len());
                for (offset, t) in tensors.into_iter().enumerate() {
                    let ty = t.value_type();
                    let c =
                        graph.insert_node(owner, pos + offset, NodeKind::trace("Constant"), &[]);
                    graph.set_attr(c, "value", AttrValue::Tensor(t));
                    elements.push(graph.add_node_output(c, ty));
                }
                let (_, pos) = graph.position(nid);
                let lc = graph.insert_node(owner, pos, NodeKind::trace("ListConstruct"), &elements);
                let lc_out = graph.add_node_output(lc, Type::TensorList);
                graph.replace_all_uses(out, lc_out);
                graph.erase_node(nid)?;
            }
        }
        Ok(())
    }
}
