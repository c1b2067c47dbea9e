//! Division legalization.
//!
//! The source semantics promote division results to floating point
//! (`1 / 2 == 0.5`), but the target format's division truncates on integer
//! operands. Every operand of `tensor::div` that is not already a known
//! float tensor gets an explicit `tensor::cast{to=f32}` inserted below it,
//! so the translated `Div` always sees floating-point inputs.

use crate::error::Error;
use crate::ir::{AttrValue, DType, Graph, NodeKind, Type};
use crate::pass::GraphPass;

pub struct LegalizeDivPass;

impl GraphPass for LegalizeDivPass {
    fn name(&self) -> &'static str {
        "legalize-div"
    }

    fn run(&mut self, graph: &mut Graph) -> Result<(), Error> {
        for block in graph.blocks_post_order() {
            for nid in graph.node_ids(block) {
                if !graph.node(nid).kind().is_tensor("div") {
                    continue;
                }
                for index in 0..graph.node(nid).inputs().len() {
                    let operand = graph.node(nid).inputs()[index];
                    if graph.value_type(operand).is_float_tensor() {
                        continue;
                    }
                    let (owner, pos) = graph.position(nid);
                    let cast = graph.insert_node(owner, pos, NodeKind::tensor("cast"), &[operand]);
                    graph.set_attr(cast, "to", AttrValue::Str("f32".to_owned()));
                    let shape = match graph.value_type(operand) {
                        Type::Tensor { shape, .. } => shape.clone(),
                        _ => None,
                    };
                    let cast_out = graph.add_node_output(
                        cast,
                        Type::Tensor {
                            dtype: Some(DType::F32),
                            shape,
                        },
                    );
                    graph.replace_input(nid, index, cast_out);
                }
            }
        }
        Ok(())
    }
}
