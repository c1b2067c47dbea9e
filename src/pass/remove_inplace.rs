//! Rewrites in-place mutating operators into their non-mutating forms.
//!
//! The tracer marks an in-place tensor op with a trailing underscore on the
//! operator name (`tensor::add_`). The target format has no in-place
//! semantics. Dropping the annotation is sound, but it does lose an
//! optimization hint the downstream consumer could have used; the export
//! keeps no record of it.

use crate::error::Error;
use crate::ir::{Graph, Namespace, NodeKind};
use crate::pass::GraphPass;

pub struct RemoveInplacePass;

impl GraphPass for RemoveInplacePass {
    fn name(&self) -> &'static str {
        "remove-inplace"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                let kind = graph.node(nid).kind();
                if kind.namespace == Namespace::Tensor
                    && kind.op.len() > 1
                    && kind.op.ends_with('_')
                {
                    let trimmed = kind.op.trim_end_matches('_').to_owned();
                    graph.set_kind(nid, NodeKind::tensor(trimmed));
                }
            }
        }
        Ok(())
    }
}
