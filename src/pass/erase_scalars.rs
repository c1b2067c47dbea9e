//! Erases scalar number types.
//!
//! The target format has no native scalar-number type: every edge must be a
//! tensor. Scalar `Int`/`Float`/`Bool` values are retyped as 0-dimensional
//! tensors, and the tracer's explicit `trace::NumToTensor` conversions
//! become no-ops whose uses collapse onto their inputs.

use crate::error::Error;
use crate::ir::{DType, Graph, Type};
use crate::pass::GraphPass;

pub struct EraseScalarsPass;

impl GraphPass for EraseScalarsPass {
    fn name(&self) -> &'static str {
        "erase-scalars"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            // NumToTensor becomes a no-op once its operand is itself a
            // 0-d tensor.
            for nid in graph.node_ids(block) {
                if !graph.node(nid).kind().is_trace("NumToTensor") {
                    continue;
                }
                let input = match graph.node(nid).inputs() {
                    [input] => *input,
                    _ => continue,
                };
                if let Some(out) = graph.node(nid).output() {
                    graph.replace_all_uses(out, input);
                    graph.erase_node(nid)?;
                }
            }

            // Retype every scalar-number value in this block.
            let mut values = graph.block_inputs(block).to_vec();
            for nid in graph.node_ids(block) {
                values.extend_from_slice(graph.node(nid).outputs());
            }
            for v in values {
                let dtype = match graph.value_type(v) {
                    Type::Int => DType::I64,
                    Type::Float => DType::F32,
                    Type::Bool => DType::Bool,
                    _ => continue,
                };
                graph.set_value_type(v, Type::tensor_of(dtype, Vec::new()));
            }
        }
        Ok(())
    }
}
