//! Integration tests for the rewrite pass pipeline.
//! Builds graphs via the public IR API and runs passes directly.

use tracegraph::ir::{AttrValue, DType, Graph, Namespace, NodeKind, TensorData, Type};
use tracegraph::pass::{
    CanonicalizePass, ConstPropPass, DcePass, EraseScalarsPass, FixupLoopsPass, GraphPass,
    InlineForkWaitPass, LegalizeDivPass, LintPass, LowerTuplesPass, PeepholePass,
    RemoveInplacePass, SplitListConstantsPass,
};

fn f32_ty(shape: &[i64]) -> Type {
    Type::tensor_of(DType::F32, shape.to_vec())
}

fn constant(graph: &mut Graph, t: TensorData) -> tracegraph::ir::ValueId {
    let ty = t.value_type();
    let node = graph.create_node(graph.top(), NodeKind::trace("Constant"), &[]);
    graph.set_attr(node, "value", AttrValue::Tensor(t));
    graph.add_node_output(node, ty)
}

// ---------------------------------------------------------------------------
// Dead-code elimination
// ---------------------------------------------------------------------------

#[test]
fn test_dce_removes_transitively_dead_chain() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let live = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let live_out = graph.add_node_output(live, f32_ty(&[2]));
    graph.add_block_output(graph.top(), live_out);
    // Dead chain: tanh feeding sigmoid, nothing consuming the sigmoid.
    let dead1 = graph.create_node(graph.top(), NodeKind::tensor("tanh"), &[x]);
    let dead1_out = graph.add_node_output(dead1, f32_ty(&[2]));
    let dead2 = graph.create_node(graph.top(), NodeKind::tensor("sigmoid"), &[dead1_out]);
    graph.add_node_output(dead2, f32_ty(&[2]));

    assert_eq!(graph.node_count(), 3);
    DcePass.run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 1);
    LintPass.run(&mut graph).unwrap();
}

#[test]
fn test_dce_is_idempotent() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let live = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let live_out = graph.add_node_output(live, f32_ty(&[2]));
    graph.add_block_output(graph.top(), live_out);
    let dead = graph.create_node(graph.top(), NodeKind::tensor("tanh"), &[x]);
    graph.add_node_output(dead, f32_ty(&[2]));

    DcePass.run(&mut graph).unwrap();
    let after_once = graph.node_count();
    DcePass.run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), after_once);
}

#[test]
fn test_dce_recurses_into_loop_bodies() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let loop_node = graph.create_node(graph.top(), NodeKind::trace("Loop"), &[x]);
    let body = graph.attach_child_block(loop_node);
    let carried = graph.add_block_input(body, None, f32_ty(&[2]));
    let live = graph.create_node(body, NodeKind::tensor("relu"), &[carried]);
    let live_out = graph.add_node_output(live, f32_ty(&[2]));
    graph.add_block_output(body, live_out);
    let dead = graph.create_node(body, NodeKind::tensor("tanh"), &[carried]);
    graph.add_node_output(dead, f32_ty(&[2]));
    let loop_out = graph.add_node_output(loop_node, f32_ty(&[2]));
    graph.add_block_output(graph.top(), loop_out);

    DcePass.run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 2); // loop + relu
    LintPass.run(&mut graph).unwrap();
}

// ---------------------------------------------------------------------------
// Lint
// ---------------------------------------------------------------------------

#[test]
fn test_lint_rejects_use_before_def() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let producer = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let out = graph.add_node_output(producer, f32_ty(&[2]));
    // Insert a consumer of `out` *before* its producer.
    let early = graph.insert_node(graph.top(), 0, NodeKind::tensor("tanh"), &[out]);
    let early_out = graph.add_node_output(early, f32_ty(&[2]));
    graph.add_block_output(graph.top(), early_out);

    assert!(LintPass.run(&mut graph).is_err());
}

// ---------------------------------------------------------------------------
// Normalization passes
// ---------------------------------------------------------------------------

#[test]
fn test_remove_inplace_strips_marker() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let node = graph.create_node(graph.top(), NodeKind::tensor("add_"), &[x, x]);
    let out = graph.add_node_output(node, f32_ty(&[2]));
    graph.add_block_output(graph.top(), out);

    RemoveInplacePass.run(&mut graph).unwrap();
    assert!(graph.node(node).kind().is_tensor("add"));
}

#[test]
fn test_const_prop_folds_literal_arithmetic() {
    let mut graph = Graph::new("g");
    let a = constant(
        &mut graph,
        TensorData::from_f32s(vec![1.0, 2.0], vec![2]).unwrap(),
    );
    let b = constant(
        &mut graph,
        TensorData::from_f32s(vec![10.0, 20.0], vec![2]).unwrap(),
    );
    let add = graph.create_node(graph.top(), NodeKind::tensor("add"), &[a, b]);
    let out = graph.add_node_output(add, f32_ty(&[2]));
    graph.add_block_output(graph.top(), out);

    ConstPropPass.run(&mut graph).unwrap();
    DcePass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    // One constant node remains, holding the folded sum.
    assert_eq!(graph.node_count(), 1);
    let result = graph.outputs()[0];
    let (producer, _) = graph.value(result).producer();
    assert!(graph.node(producer).kind().is_trace("Constant"));
    match graph.node(producer).attr("value") {
        Some(AttrValue::Tensor(t)) => {
            assert_eq!(
                *t,
                TensorData::from_f32s(vec![11.0, 22.0], vec![2]).unwrap()
            );
        }
        other => panic!("expected folded tensor payload, got {:?}", other),
    }
}

#[test]
fn test_const_prop_skips_division_by_zero() {
    let mut graph = Graph::new("g");
    let a = constant(
        &mut graph,
        TensorData::from_f32s(vec![1.0], vec![1]).unwrap(),
    );
    let b = constant(
        &mut graph,
        TensorData::from_f32s(vec![0.0], vec![1]).unwrap(),
    );
    let div = graph.create_node(graph.top(), NodeKind::tensor("div"), &[a, b]);
    let out = graph.add_node_output(div, f32_ty(&[1]));
    graph.add_block_output(graph.top(), out);

    ConstPropPass.run(&mut graph).unwrap();
    // The div is left in place.
    assert!(graph.node(div).kind().is_tensor("div"));
}

#[test]
fn test_split_list_constants() {
    let mut graph = Graph::new("g");
    let node = graph.create_node(graph.top(), NodeKind::trace("Constant"), &[]);
    let t1 = TensorData::from_f32s(vec![1.0], vec![1]).unwrap();
    let t2 = TensorData::from_f32s(vec![2.0], vec![1]).unwrap();
    graph.set_attr(node, "value", AttrValue::Tensors(vec![t1, t2]));
    let out = graph.add_node_output(node, Type::TensorList);
    graph.add_block_output(graph.top(), out);

    SplitListConstantsPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    // Two scalar constants plus a ListConstruct.
    assert_eq!(graph.node_count(), 3);
    let list_out = graph.outputs()[0];
    let (list_node, _) = graph.value(list_out).producer();
    assert!(graph.node(list_node).kind().is_trace("ListConstruct"));
    assert_eq!(graph.node(list_node).inputs().len(), 2);
}

#[test]
fn test_peephole_removes_identity_permute() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2, 3]));
    let node = graph.create_node(graph.top(), NodeKind::tensor("permute"), &[x]);
    graph.set_attr(node, "dims", AttrValue::Ints(vec![0, 1]));
    let out = graph.add_node_output(node, f32_ty(&[2, 3]));
    graph.add_block_output(graph.top(), out);

    PeepholePass::generic().run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs(), &[x]);
}

#[test]
fn test_peephole_composes_double_transpose() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2, 3, 4]));
    let t1 = graph.create_node(graph.top(), NodeKind::onnx("Transpose"), &[x]);
    graph.set_attr(t1, "perm", AttrValue::Ints(vec![2, 0, 1]));
    let t1_out = graph.add_node_output(t1, f32_ty(&[4, 2, 3]));
    let t2 = graph.create_node(graph.top(), NodeKind::onnx("Transpose"), &[t1_out]);
    graph.set_attr(t2, "perm", AttrValue::Ints(vec![1, 2, 0]));
    let t2_out = graph.add_node_output(t2, f32_ty(&[2, 3, 4]));
    graph.add_block_output(graph.top(), t2_out);

    PeepholePass::target().run(&mut graph).unwrap();
    DcePass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    // Composition yields the identity permutation, which the next sweep of
    // the same pass erases entirely.
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs(), &[x]);
}

#[test]
fn test_peephole_cancels_list_pair() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let b = graph.add_block_input(graph.top(), Some("b"), f32_ty(&[1]));
    let construct = graph.create_node(graph.top(), NodeKind::trace("ListConstruct"), &[a, b]);
    let list = graph.add_node_output(construct, Type::TensorList);
    let unpack = graph.create_node(graph.top(), NodeKind::trace("ListUnpack"), &[list]);
    let u1 = graph.add_node_output(unpack, f32_ty(&[1]));
    let u2 = graph.add_node_output(unpack, f32_ty(&[1]));
    graph.add_block_output(graph.top(), u1);
    graph.add_block_output(graph.top(), u2);

    PeepholePass::generic().run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs(), &[a, b]);
}

#[test]
fn test_legalize_div_casts_non_float_operands() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), Type::tensor_of(DType::I64, vec![2]));
    let y = graph.add_block_input(graph.top(), Some("y"), f32_ty(&[2]));
    let div = graph.create_node(graph.top(), NodeKind::tensor("div"), &[x, y]);
    let out = graph.add_node_output(div, f32_ty(&[2]));
    graph.add_block_output(graph.top(), out);

    LegalizeDivPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    // Only the integer operand gets a cast.
    let lhs = graph.node(div).inputs()[0];
    let (lhs_producer, _) = graph.value(lhs).producer();
    assert!(graph.node(lhs_producer).kind().is_tensor("cast"));
    assert_eq!(graph.node(div).inputs()[1], y);
    assert!(graph.value_type(lhs).is_float_tensor());
}

#[test]
fn test_erase_scalars_retypes_and_drops_conversions() {
    let mut graph = Graph::new("g");
    let n = graph.add_block_input(graph.top(), Some("n"), Type::Int);
    let conv = graph.create_node(graph.top(), NodeKind::trace("NumToTensor"), &[n]);
    let conv_out = graph.add_node_output(conv, Type::tensor());
    graph.add_block_output(graph.top(), conv_out);

    EraseScalarsPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs(), &[n]);
    assert_eq!(*graph.value_type(n), Type::tensor_of(DType::I64, vec![]));
}

#[test]
fn test_lower_tuples_cancels_pairs() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let b = graph.add_block_input(graph.top(), Some("b"), f32_ty(&[1]));
    let construct = graph.create_node(graph.top(), NodeKind::trace("TupleConstruct"), &[a, b]);
    let tup = graph.add_node_output(
        construct,
        Type::Tuple(vec![f32_ty(&[1]), f32_ty(&[1])]),
    );
    let unpack = graph.create_node(graph.top(), NodeKind::trace("TupleUnpack"), &[tup]);
    let u1 = graph.add_node_output(unpack, f32_ty(&[1]));
    let u2 = graph.add_node_output(unpack, f32_ty(&[1]));
    graph.add_block_output(graph.top(), u2);
    graph.add_block_output(graph.top(), u1);

    LowerTuplesPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs(), &[b, a]);
}

#[test]
fn test_lower_tuples_rejects_surviving_tuple() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let construct = graph.create_node(graph.top(), NodeKind::trace("TupleConstruct"), &[a]);
    let tup = graph.add_node_output(construct, Type::Tuple(vec![f32_ty(&[1])]));
    // The tuple escapes as a block output; no unpack cancels it.
    graph.add_block_output(graph.top(), tup);

    assert!(LowerTuplesPass.run(&mut graph).is_err());
}

#[test]
fn test_inline_fork_wait_splices_body() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let fork = graph.create_node(graph.top(), NodeKind::trace("Fork"), &[x]);
    let body = graph.attach_child_block(fork);
    let arg = graph.add_block_input(body, None, f32_ty(&[2]));
    let relu = graph.create_node(body, NodeKind::tensor("relu"), &[arg]);
    let relu_out = graph.add_node_output(relu, f32_ty(&[2]));
    graph.add_block_output(body, relu_out);
    let future = graph.add_node_output(fork, Type::Unknown);
    let wait = graph.create_node(graph.top(), NodeKind::trace("Wait"), &[future]);
    let wait_out = graph.add_node_output(wait, f32_ty(&[2]));
    graph.add_block_output(graph.top(), wait_out);

    InlineForkWaitPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    // Only the relu remains, now in the top block, consuming x directly.
    assert_eq!(graph.node_count(), 1);
    assert!(graph.node(relu).kind().is_tensor("relu"));
    assert_eq!(graph.node(relu).inputs(), &[x]);
    assert_eq!(graph.outputs(), &[relu_out]);
}

#[test]
fn test_fixup_loops_adds_iteration_and_condition() {
    let mut graph = Graph::new("g");
    let trip = graph.add_block_input(graph.top(), Some("trip"), Type::tensor_of(DType::I64, vec![]));
    let cond = graph.add_block_input(graph.top(), Some("cond"), Type::tensor_of(DType::Bool, vec![]));
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let loop_node = graph.create_node(graph.top(), NodeKind::onnx("Loop"), &[trip, cond, x]);
    let body = graph.attach_child_block(loop_node);
    let carried = graph.add_block_input(body, None, f32_ty(&[2]));
    let relu = graph.create_node(body, NodeKind::tensor("relu"), &[carried]);
    let relu_out = graph.add_node_output(relu, f32_ty(&[2]));
    graph.add_block_output(body, relu_out);
    let loop_out = graph.add_node_output(loop_node, f32_ty(&[2]));
    graph.add_block_output(graph.top(), loop_out);

    FixupLoopsPass.run(&mut graph).unwrap();
    LintPass.run(&mut graph).unwrap();

    let body_inputs = graph.block_inputs(body);
    assert_eq!(body_inputs.len(), 3);
    assert_eq!(
        *graph.value_type(body_inputs[0]),
        Type::tensor_of(DType::I64, vec![])
    );
    assert_eq!(
        *graph.value_type(body_inputs[1]),
        Type::tensor_of(DType::Bool, vec![])
    );
    // The body now re-emits the incoming condition first.
    let body_outputs = graph.block(body).outputs();
    assert_eq!(body_outputs.len(), 2);
    assert_eq!(body_outputs[0], graph.block_inputs(body)[1]);
}

#[test]
fn test_canonicalize_renames_generated_keeps_user_names() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let node = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let out = graph.add_node_output(node, f32_ty(&[2])); // generated name
    graph.add_block_output(graph.top(), out);

    CanonicalizePass.run(&mut graph).unwrap();
    assert_eq!(graph.value_name(x), "x");
    assert_eq!(graph.value_name(out), "v0");
}

#[test]
fn test_namespace_parsing_round_trips() {
    let kind = NodeKind::parse("tensor::add");
    assert_eq!(kind.namespace, Namespace::Tensor);
    assert_eq!(kind.to_string(), "tensor::add");
    let custom = NodeKind::parse("vendor::Special");
    assert_eq!(custom.namespace, Namespace::Custom("vendor".to_owned()));
}
