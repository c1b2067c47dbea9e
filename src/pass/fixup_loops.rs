//! Loop-node fixup for the target format.
//!
//! A translated `onnx::Loop` body must declare an `i64` iteration counter
//! and a `Bool` continue-condition as its first two inputs, and re-emit a
//! continue-condition as its first output. A traced while-loop body carries
//! only its loop-carried values, so this pass prepends the missing pair and,
//! when the body has one fewer output than `carried + 1`, re-emits the
//! incoming condition unchanged (the traced loop's exit test is evaluated
//! outside the body).

use crate::error::Error;
use crate::ir::{DType, Graph, Type};
use crate::pass::GraphPass;

pub struct FixupLoopsPass;

impl GraphPass for FixupLoopsPass {
    fn name(&self) -> &'static str {
        "fixup-loops"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                if !graph.node(nid).kind().is_onnx("Loop") {
                    continue;
                }
                for &body in graph.node(nid).child_blocks().to_vec().iter() {
                    // Loop node inputs: trip count, condition, carried values.
                    let carried = graph.node(nid).inputs().len().saturating_sub(2);
                    let body_inputs = graph.block_inputs(body).len();
                    if body_inputs == carried {
                        graph.insert_block_input(
                            body,
                            0,
                            Some("iter"),
                            Type::tensor_of(DType::I64, Vec::new()),
                        );
                        graph.insert_block_input(
                            body,
                            1,
                            Some("cond"),
                            Type::tensor_of(DType::Bool, Vec::new()),
                        );
                    }
                    // Body outputs: condition, then next carried values.
                    let body_outputs = graph.block(body).outputs().len();
                    if body_outputs == carried {
                        let cond = graph.block_inputs(body)[1];
                        let outputs = graph.block(body).outputs().to_vec();
                        graph.clear_block_outputs(body);
                        graph.add_block_output(body, cond);
                        for out in outputs {
                            graph.add_block_output(body, out);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
