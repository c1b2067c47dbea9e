//! Canonicalization passes.
//!
//! `CanonicalizeOpsPass` rewrites a small set of operator synonyms to a
//! single canonical form early in the pipeline, so every later pass and
//! every translation function only has to know one spelling.
//!
//! `CanonicalizePass` runs last and renames all values to sequential
//! program-order names, so two exports of the same model serialize
//! byte-identically.

use crate::error::Error;
use crate::ir::{Graph, Namespace, NodeKind};
use crate::pass::GraphPass;

/// Synonym table: recorded spelling → canonical spelling.
const SYNONYMS: &[(&str, &str)] = &[
    ("mm", "matmul"),
    ("concatenate", "cat"),
    ("multiply", "mul"),
    ("divide", "div"),
    ("subtract", "sub"),
    ("swapaxes", "transpose"),
];

pub struct CanonicalizeOpsPass;

impl GraphPass for CanonicalizeOpsPass {
    fn name(&self) -> &'static str {
        "canonicalize-ops"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                let kind = graph.node(nid).kind();
                if kind.namespace != Namespace::Tensor {
                    continue;
                }
                if let Some(&(_, canonical)) =
                    SYNONYMS.iter().find(|&&(alias, _)| alias == kind.op)
                {
                    graph.set_kind(nid, NodeKind::tensor(canonical));
                }
            }
        }
        Ok(())
    }
}

pub struct CanonicalizePass;

impl GraphPass for CanonicalizePass {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        graph.canonicalize_names();
        Ok(())
    }
}
