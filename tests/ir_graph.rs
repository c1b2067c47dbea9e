//! Integration tests for the graph data structure: construction, use-list
//! maintenance, erasure rules, and renaming.

use tracegraph::ir::{DType, Graph, NodeKind, TensorData, Type, Use};
use tracegraph::pass::{GraphPass, LintPass};

fn f32_ty(shape: &[i64]) -> Type {
    Type::tensor_of(DType::F32, shape.to_vec())
}

#[test]
fn test_build_add_graph() {
    let mut graph = Graph::new("add");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let w = graph.add_block_input(graph.top(), Some("w"), f32_ty(&[2]));
    let add = graph.create_node(graph.top(), NodeKind::tensor("add"), &[x, w]);
    let y = graph.add_node_output(add, f32_ty(&[2]));
    graph.add_block_output(graph.top(), y);

    assert_eq!(graph.inputs(), &[x, w]);
    assert_eq!(graph.outputs(), &[y]);
    assert_eq!(graph.value(x).uses().len(), 1);
    assert_eq!(graph.value(y).uses(), &[Use::BlockOutput {
        block: graph.top(),
        index: 0
    }]);
    assert_eq!(graph.value(y).producer(), (add, 0));
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_erase_requires_unused_outputs() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let relu = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let y = graph.add_node_output(relu, f32_ty(&[2]));
    graph.add_block_output(graph.top(), y);

    // The output is a declared block output, so erasure must fail.
    assert!(graph.erase_node(relu).is_err());

    graph.clear_block_outputs(graph.top());
    assert!(graph.erase_node(relu).is_ok());
    assert_eq!(graph.node_count(), 0);
    // The input lost its only use.
    assert!(!graph.value(x).has_uses());
}

#[test]
fn test_replace_all_uses_rewires_operands_and_outputs() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]));
    let a = graph.create_node(graph.top(), NodeKind::tensor("relu"), &[x]);
    let a_out = graph.add_node_output(a, f32_ty(&[2]));
    let b = graph.create_node(graph.top(), NodeKind::tensor("tanh"), &[a_out]);
    let b_out = graph.add_node_output(b, f32_ty(&[2]));
    graph.add_block_output(graph.top(), a_out);

    graph.replace_all_uses(a_out, x);
    assert_eq!(graph.node(b).inputs(), &[x]);
    assert_eq!(graph.outputs(), &[x]);
    assert!(!graph.value(a_out).has_uses());
    let _ = b_out;
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_rename_preserves_identity() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[3]));
    graph.set_value_name(x, "renamed");
    assert_eq!(graph.value_name(x), "renamed");
    assert_eq!(graph.value(x).producer().0, graph.block(graph.top()).param_source());
    assert_eq!(*graph.value_type(x), f32_ty(&[3]));
}

#[test]
fn test_remove_input_shifts_use_indices() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let b = graph.add_block_input(graph.top(), Some("b"), f32_ty(&[1]));
    let c = graph.add_block_input(graph.top(), Some("c"), f32_ty(&[1]));
    let node = graph.create_node(graph.top(), NodeKind::trace("ListConstruct"), &[a, b, c]);
    let out = graph.add_node_output(node, Type::TensorList);
    graph.add_block_output(graph.top(), out);

    graph.remove_input(node, 1);
    assert_eq!(graph.node(node).inputs(), &[a, c]);
    assert!(!graph.value(b).has_uses());
    // Lint verifies `c`'s recorded operand index was shifted down.
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_splice_input_expands_operand_run() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let b = graph.add_block_input(graph.top(), Some("b"), f32_ty(&[1]));
    let list = graph.create_node(graph.top(), NodeKind::trace("ListConstruct"), &[a, b]);
    let list_out = graph.add_node_output(list, Type::TensorList);
    let cat = graph.create_node(graph.top(), NodeKind::onnx("Concat"), &[list_out]);
    let cat_out = graph.add_node_output(cat, f32_ty(&[2]));
    graph.add_block_output(graph.top(), cat_out);

    graph.splice_input(cat, 0, &[a, b]);
    assert_eq!(graph.node(cat).inputs(), &[a, b]);
    assert!(!graph.value(list_out).has_uses());
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_blocks_post_order_children_first() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[1]));
    let loop_node = graph.create_node(graph.top(), NodeKind::trace("Loop"), &[x]);
    let body = graph.attach_child_block(loop_node);
    let inner = graph.add_block_input(body, None, f32_ty(&[1]));
    let relu = graph.create_node(body, NodeKind::tensor("relu"), &[inner]);
    let relu_out = graph.add_node_output(relu, f32_ty(&[1]));
    graph.add_block_output(body, relu_out);
    let loop_out = graph.add_node_output(loop_node, f32_ty(&[1]));
    graph.add_block_output(graph.top(), loop_out);

    let order = graph.blocks_post_order();
    assert_eq!(order.last(), Some(&graph.top()));
    assert!(order.contains(&body));
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_erase_node_frees_child_blocks() {
    let mut graph = Graph::new("g");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[1]));
    let loop_node = graph.create_node(graph.top(), NodeKind::trace("Loop"), &[x]);
    let body = graph.attach_child_block(loop_node);
    let inner = graph.add_block_input(body, None, f32_ty(&[1]));
    let relu = graph.create_node(body, NodeKind::tensor("relu"), &[inner]);
    let relu_out = graph.add_node_output(relu, f32_ty(&[1]));
    graph.add_block_output(body, relu_out);
    let _loop_out = graph.add_node_output(loop_node, f32_ty(&[1]));

    // No uses on the loop output: the whole subtree may be erased.
    assert!(graph.erase_node(loop_node).is_ok());
    assert_eq!(graph.node_count(), 0);
    assert!(!graph.value(x).has_uses());
    assert!(LintPass.run(&mut graph).is_ok());
}

#[test]
fn test_display_dump_mentions_nodes_and_attrs() {
    let mut graph = Graph::new("dumped");
    let x = graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2, 2]));
    let node = graph.create_node(graph.top(), NodeKind::tensor("permute"), &[x]);
    graph.set_attr(node, "dims", tracegraph::ir::AttrValue::Ints(vec![1, 0]));
    let out = graph.add_node_output(node, f32_ty(&[2, 2]));
    graph.add_block_output(graph.top(), out);

    let text = graph.to_string();
    assert!(text.contains("graph dumped"));
    assert!(text.contains("tensor::permute"));
    assert!(text.contains("dims"));
}

#[test]
fn test_tensor_kernels_match_direct_computation() {
    let t = TensorData::from_f32s((0..15).map(|i| i as f32).collect(), vec![5, 3]).unwrap();

    let narrowed = t.narrow(0, 1, 3).unwrap();
    assert_eq!(narrowed.shape(), &[3, 3]);
    assert_eq!(
        narrowed,
        TensorData::from_f32s((3..12).map(|i| i as f32).collect(), vec![3, 3]).unwrap()
    );

    let unsqueezed = t.unsqueeze(0).unwrap();
    assert_eq!(unsqueezed.shape(), &[1, 5, 3]);

    let transposed = t.permute(&[1, 0]).unwrap();
    assert_eq!(transposed.shape(), &[3, 5]);
    // Element (i, j) of the transpose is element (j, i) of the source.
    let expect: Vec<f32> = (0..3)
        .flat_map(|i| (0..5).map(move |j| (j * 3 + i) as f32))
        .collect();
    assert_eq!(transposed, TensorData::from_f32s(expect, vec![3, 5]).unwrap());

    let a = TensorData::from_f32s(vec![1.0, 2.0], vec![2]).unwrap();
    let b = TensorData::from_f32s(vec![3.0, 4.0], vec![2]).unwrap();
    let cat = TensorData::concat(&[&a, &b], 0).unwrap();
    assert_eq!(
        cat,
        TensorData::from_f32s(vec![1.0, 2.0, 3.0, 4.0], vec![4]).unwrap()
    );
}
