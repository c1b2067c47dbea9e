//! Operator translation: source-namespace nodes → target-format nodes.
//!
//! `translate_graph` builds a fresh graph in the target vocabulary, walking
//! the source block tree with an explicit worklist (one entry per
//! source/destination block pair, so nesting depth never grows the call
//! stack). Dispatch is by namespace:
//!
//! - `onnx::*` — already in final form; cloned into the new graph unchanged.
//! - `tensor::*` — looked up in the symbolic registry. The export type
//!   selects what happens on a miss: `Direct` wraps every tensor op in an
//!   opaque node unconditionally, `DirectFallback` wraps only unregistered
//!   ops, and `Standard` warns and clones the node untranslated (the
//!   consumer may still understand it; an untranslatable node is not an
//!   export-time error).
//! - `trace::*` — special-cased: literal constants become target literals
//!   (integer lists are stacked into a tensor), the `None`/list markers are
//!   cloned as-is for peephole cleanup, `Loop`/`If` become target
//!   control-flow nodes with each body translated into a freshly attached
//!   child block, and anything else dispatches to a registered structural
//!   handler or warns and clones.
//! - Unrecognized namespaces warn and clone — never fatal.

pub mod registry;
pub mod symbolic;

pub use registry::SymbolicRegistry;
pub use symbolic::{SymbolicCtx, SymbolicFn};

use std::collections::HashMap;

use crate::builder::{GraphBuilder, OpInput};
use crate::error::{Error, TranslateError};
use crate::export::OperatorExportType;
use crate::ir::{AttrValue, BlockId, Graph, Namespace, NodeId, NodeKind, TensorData, ValueId};

/// Source-value → destination-value mapping produced by translation.
pub type TranslationEnv = HashMap<ValueId, ValueId>;

/// Translates `source` into the target vocabulary, returning the new graph
/// and the value mapping (callers re-key the parameter table through it).
pub fn translate_graph(
    source: &Graph,
    export_type: OperatorExportType,
) -> Result<(Graph, TranslationEnv), Error> {
    let registry = registry::standard();
    let mut dest = Graph::new(source.name());
    let mut env: TranslationEnv = HashMap::new();

    for &input in source.inputs() {
        let mapped = dest.add_block_input(
            dest.top(),
            Some(source.value_name(input)),
            source.value_type(input).clone(),
        );
        env.insert(input, mapped);
    }

    let mut work: Vec<(BlockId, BlockId)> = vec![(source.top(), dest.top())];
    while let Some((src_block, dest_block)) = work.pop() {
        for nid in source.node_ids(src_block) {
            translate_node(
                source,
                &mut dest,
                dest_block,
                nid,
                &mut env,
                export_type,
                registry,
                &mut work,
            )?;
        }
        for &out in source.block(src_block).outputs() {
            let mapped = mapped_value(source, &env, out, src_block)?;
            dest.add_block_output(dest_block, mapped);
        }
    }

    Ok((dest, env))
}

fn mapped_value(
    source: &Graph,
    env: &TranslationEnv,
    value: ValueId,
    context: BlockId,
) -> Result<ValueId, Error> {
    env.get(&value).copied().ok_or_else(|| {
        TranslateError::UntranslatedInput {
            node: context.to_string(),
            value: source.value_name(value).to_owned(),
        }
        .into()
    })
}

#[allow(clippy::too_many_arguments)]
fn translate_node(
    source: &Graph,
    dest: &mut Graph,
    dest_block: BlockId,
    nid: NodeId,
    env: &mut TranslationEnv,
    export_type: OperatorExportType,
    registry: &SymbolicRegistry,
    work: &mut Vec<(BlockId, BlockId)>,
) -> Result<(), Error> {
    let node = source.node(nid);
    let mut inputs = Vec::with_capacity(node.inputs().len());
    for &input in node.inputs() {
        let mapped = env.get(&input).copied().ok_or_else(|| {
            Error::from(TranslateError::UntranslatedInput {
                node: node.kind().to_string(),
                value: source.value_name(input).to_owned(),
            })
        })?;
        inputs.push(mapped);
    }

    match node.kind().namespace.clone() {
        // Target-namespace nodes pass through unchanged.
        Namespace::Onnx => clone_node(source, dest, dest_block, nid, &inputs, env, work, None),

        Namespace::Tensor => {
            let op = node.kind().op.trim_end_matches('_').to_owned();
            let symbolic = registry.tensor_op(&op);
            match (export_type, symbolic) {
                // Direct export wraps every generic tensor op.
                (OperatorExportType::Direct, _) => {
                    emit_opaque(source, dest, dest_block, nid, &inputs, env)
                }
                (_, Some(f)) => {
                    run_symbolic(source, dest, dest_block, nid, &inputs, env, f)
                }
                (OperatorExportType::DirectFallback, None) => {
                    emit_opaque(source, dest, dest_block, nid, &inputs, env)
                }
                (_, None) => {
                    log::warn!(
                        "export failed on generic tensor operator '{}': no translation \
                         registered; passing the node through untranslated",
                        op
                    );
                    clone_node(source, dest, dest_block, nid, &inputs, env, work, None)
                }
            }
        }

        Namespace::Trace => match node.kind().op.as_str() {
            "Constant" => translate_constant(source, dest, dest_block, nid, env),
            // Markers translate to nothing: clone as-is, peephole cleanup
            // erases them once their consumers are translated.
            "None" | "ListConstruct" | "ListUnpack" => {
                clone_node(source, dest, dest_block, nid, &inputs, env, work, None)
            }
            "Loop" | "If" => {
                let target = NodeKind::onnx(node.kind().op.clone());
                clone_node(source, dest, dest_block, nid, &inputs, env, work, Some(target))
            }
            other => match registry.structural_op(other) {
                Some(f) => run_symbolic(source, dest, dest_block, nid, &inputs, env, f),
                None => {
                    log::warn!(
                        "export failed on structural operator '{}': no handler registered; \
                         passing the node through untranslated",
                        other
                    );
                    clone_node(source, dest, dest_block, nid, &inputs, env, work, None)
                }
            },
        },

        Namespace::Custom(ns) => {
            log::warn!(
                "export failed on an operator with unrecognized namespace '{}::{}'; \
                 passing the node through untranslated",
                ns,
                node.kind().op
            );
            clone_node(source, dest, dest_block, nid, &inputs, env, work, None)
        }
    }
}

/// Clones a node into the destination graph, optionally rewriting its kind
/// (used for `Loop`/`If`, whose bodies are queued for translation).
#[allow(clippy::too_many_arguments)]
fn clone_node(
    source: &Graph,
    dest: &mut Graph,
    dest_block: BlockId,
    nid: NodeId,
    inputs: &[ValueId],
    env: &mut TranslationEnv,
    work: &mut Vec<(BlockId, BlockId)>,
    kind_override: Option<NodeKind>,
) -> Result<(), Error> {
    let node = source.node(nid);
    let kind = kind_override.unwrap_or_else(|| node.kind().clone());
    let new = dest.create_node(dest_block, kind, inputs);
    for (name, value) in node.attrs() {
        dest.set_attr(new, name, value.clone());
    }
    for &out in node.outputs() {
        let mapped = dest.add_node_output_named(
            new,
            Some(source.value_name(out)),
            source.value_type(out).clone(),
        );
        env.insert(out, mapped);
    }
    for &src_child in node.child_blocks() {
        let dest_child = dest.attach_child_block(new);
        for &child_input in source.block_inputs(src_child) {
            let mapped = dest.add_block_input(
                dest_child,
                Some(source.value_name(child_input)),
                source.value_type(child_input).clone(),
            );
            env.insert(child_input, mapped);
        }
        work.push((src_child, dest_child));
    }
    Ok(())
}

fn run_symbolic(
    source: &Graph,
    dest: &mut Graph,
    dest_block: BlockId,
    nid: NodeId,
    inputs: &[ValueId],
    env: &mut TranslationEnv,
    f: SymbolicFn,
) -> Result<(), Error> {
    let node = source.node(nid);
    let outputs = {
        let ctx = SymbolicCtx {
            source,
            node,
            env: &*env,
        };
        let mut builder = GraphBuilder::new(dest, dest_block);
        f(&mut builder, &ctx, inputs)?
    };
    if outputs.len() != node.outputs().len() {
        return Err(TranslateError::ArgumentMismatch {
            op: node.kind().to_string(),
            detail: format!(
                "translation produced {} values for {} outputs",
                outputs.len(),
                node.outputs().len()
            ),
        }
        .into());
    }
    for (&src_out, &dest_out) in node.outputs().iter().zip(outputs.iter()) {
        // Keep the traced name and type on freshly built values. A symbolic
        // may forward an existing value (identity translation); that value
        // keeps its own name.
        let fresh = dest
            .value_name(dest_out)
            .strip_prefix('v')
            .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
        if fresh {
            dest.set_value_name(dest_out, source.value_name(src_out));
            if source.value_type(src_out).is_tensor() {
                dest.set_value_type(dest_out, source.value_type(src_out).clone());
            }
        }
        env.insert(src_out, dest_out);
    }
    Ok(())
}

/// Translates a literal-constant primitive.
///
/// A tensor payload becomes a target literal; an integer-list payload is
/// stacked into a 1-d tensor; a constant with no payload is the "no value"
/// marker and is cloned for later cleanup. Any other payload kind cannot be
/// represented and aborts the export.
fn translate_constant(
    source: &Graph,
    dest: &mut Graph,
    dest_block: BlockId,
    nid: NodeId,
    env: &mut TranslationEnv,
) -> Result<(), Error> {
    let node = source.node(nid);
    let payload = match node.attr("value") {
        Some(AttrValue::Tensor(t)) => Some(t.clone()),
        Some(AttrValue::Ints(is)) => Some(TensorData::stack_i64s(is)),
        Some(other) => {
            return Err(TranslateError::UnsupportedConstantKind {
                kind: other.kind_code().to_owned(),
            }
            .into())
        }
        None => None,
    };
    match payload {
        Some(tensor) => {
            let mut builder = GraphBuilder::new(dest, dest_block);
            let out = builder.constant(tensor);
            let src_out = node.outputs()[0];
            dest.set_value_name(out, source.value_name(src_out));
            env.insert(src_out, out);
            Ok(())
        }
        None => {
            // "No value" constant: keep it; peephole erases it when dead.
            let inputs: Vec<ValueId> = Vec::new();
            let new = dest.create_node(dest_block, node.kind().clone(), &inputs);
            for &out in node.outputs() {
                let mapped = dest.add_node_output_named(
                    new,
                    Some(source.value_name(out)),
                    source.value_type(out).clone(),
                );
                env.insert(out, mapped);
            }
            Ok(())
        }
    }
}

/// Emits an opaque wrapper node tagging the untranslated operator and its
/// raw attributes verbatim.
fn emit_opaque(
    source: &Graph,
    dest: &mut Graph,
    dest_block: BlockId,
    nid: NodeId,
    inputs: &[ValueId],
    env: &mut TranslationEnv,
) -> Result<(), Error> {
    let node = source.node(nid);
    let op = node.kind().op.trim_end_matches('_').to_owned();
    let raw_attrs: Vec<(String, AttrValue)> = node
        .attrs()
        .map(|(k, v)| (k.to_owned(), v.clone()))
        .collect();
    let op_inputs: Vec<OpInput> = inputs.iter().map(|&v| v.into()).collect();
    let mut builder = GraphBuilder::new(dest, dest_block);
    let outputs = builder.opaque(&op, op_inputs, raw_attrs, node.outputs().len())?;
    for (&src_out, &dest_out) in node.outputs().iter().zip(outputs.iter()) {
        dest.set_value_name(dest_out, source.value_name(src_out));
        env.insert(src_out, dest_out);
    }
    Ok(())
}
