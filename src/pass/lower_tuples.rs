//! Tuple lowering.
//!
//! The target format has no tuple type. A tracer records tuple packing and
//! unpacking as `trace::TupleConstruct` / `trace::TupleUnpack` pairs; this
//! pass cancels each pair by rewiring the unpack's outputs straight to the
//! construct's inputs, iterating until nothing changes (tuples can nest).
//! Any tuple-typed value that survives — a tuple crossing a control-flow
//! boundary, which the flattening cannot express — is a fatal error.

use crate::error::{Error, PassError};
use crate::ir::{Graph, Type};
use crate::pass::GraphPass;

pub struct LowerTuplesPass;

impl GraphPass for LowerTuplesPass {
    fn name(&self) -> &'static str {
        "lower-tuples"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        loop {
            let mut changed = false;
            for block in graph.blocks_post_order() {
                for nid in graph.node_ids(block) {
                    if !graph.node_exists(nid) || !graph.node(nid).kind().is_trace("TupleUnpack")
                    {
                        continue;
                    }
                    let input = graph.node(nid).inputs()[0];
                    let (construct, _) = graph.value(input).producer();
                    if !graph.node(construct).kind().is_trace("TupleConstruct") {
                        continue;
                    }
                    let elements = graph.node(construct).inputs().to_vec();
                    let outputs = graph.node(nid).outputs().to_vec();
                    if elements.len() != outputs.len() {
                        continue;
                    }
                    for (&out, &element) in outputs.iter().zip(elements.iter()) {
                        graph.replace_all_uses(out, element);
                    }
                    graph.erase_node(nid)?;
                    if graph
                        .node(construct)
                        .outputs()
                        .iter()
                        .all(|&o| !graph.value(o).has_uses())
                    {
                        graph.erase_node(construct)?;
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Anything still tuple-typed cannot be expressed in the target.
        for v in graph.live_values() {
            if matches!(graph.value_type(v), Type::Tuple(_)) {
                return Err(PassError::TupleNotLowered {
                    value: graph.value_name(v).to_owned(),
                }
                .into());
            }
        }
        Ok(())
    }
}
