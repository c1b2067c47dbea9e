//! Binary container-format emitter.
//!
//! Encodes a translated `Graph` as a `ModelProto` using the hand-rolled
//! protobuf encoder in `proto.rs`.
//!
//! Proto field numbers used:
//!   ModelProto:          ir_version=1, producer_name=2, producer_version=3,
//!                        graph=7, opset_import=8
//!   OperatorSetIdProto:  domain=1, version=2
//!   GraphProto:          node=1, name=2, initializer=5, input=11, output=12
//!   NodeProto:           input=1, output=2, name=3, op_type=4, attribute=5,
//!                        domain=7
//!   AttributeProto:      name=1, f=2, i=3, s=4, t=5, g=6, floats=7, ints=8,
//!                        strings=9, tensors=10, type=20
//!   TensorProto:         dims=1, data_type=2, name=8, raw_data=9
//!   ValueInfoProto:      name=1, type=2
//!   TypeProto:           tensor_type=1
//!   TypeProto::Tensor:   elem_type=1, shape=2
//!   TensorShapeProto:    dim=1
//!   TensorShapeProto::Dimension: dim_value=1

use std::collections::BTreeMap;

use crate::error::SerializeError;
use crate::ir::{AttrValue, BlockId, DType, Graph, Namespace, NodeId, ParamMap, TensorData, Type};
use crate::serialize::proto::{
    encode_float_field, encode_int_field, encode_len_field, encode_message_field,
    encode_string_field, encode_varint_field,
};

/// Auxiliary-weight name → raw bytes, produced when weight export is
/// deferred to the sink.
pub type ExportMap = BTreeMap<String, Vec<u8>>;

/// Container element-type codes (`TensorProto::DataType`).
pub fn dtype_code(dtype: DType) -> u64 {
    match dtype {
        DType::F32 => 1,
        DType::F64 => 11,
        DType::I32 => 6,
        DType::I64 => 7,
        DType::Bool => 9,
    }
}

/// Encode `graph` as binary `ModelProto` bytes.
///
/// Parameters present in `params` are emitted as graph initializers. With
/// `defer_weights` set, each initializer's payload is routed into the
/// returned export map instead of being embedded, and the serialized tensor
/// carries only its name, dims, and element type.
pub fn encode_model(
    graph: &Graph,
    params: &ParamMap,
    opset_version: u64,
    defer_weights: bool,
) -> Result<(Vec<u8>, ExportMap), SerializeError> {
    let mut export_map = ExportMap::new();
    let graph_bytes = encode_block(graph, graph.top(), params, defer_weights, &mut export_map)?;

    let mut out = Vec::new();
    // Container IR version 4 corresponds to the operator-set 9 era.
    out.extend(encode_varint_field(1, 4));
    out.extend(encode_string_field(2, "tracegraph"));
    out.extend(encode_string_field(3, env!("CARGO_PKG_VERSION")));
    out.extend(encode_message_field(7, &graph_bytes));
    let mut opset = Vec::new();
    opset.extend(encode_string_field(1, ""));
    opset.extend(encode_varint_field(2, opset_version));
    out.extend(encode_message_field(8, &opset));
    Ok((out, export_map))
}

/// Encode one block as a `GraphProto` (the top level, or a control-flow
/// body serialized as a subgraph attribute).
fn encode_block(
    graph: &Graph,
    block: BlockId,
    params: &ParamMap,
    defer_weights: bool,
    export_map: &mut ExportMap,
) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::new();

    // node = 1 (repeated)
    for &nid in graph.block(block).nodes() {
        let node_bytes = encode_node(graph, nid, params, defer_weights, export_map)?;
        out.extend(encode_message_field(1, &node_bytes));
    }

    // name = 2
    out.extend(encode_string_field(2, graph.name()));

    // initializer = 5 (repeated): block inputs backed by the parameter table
    for &input in graph.block_inputs(block) {
        if let Some(tensor) = params.get(&input) {
            let t = encode_tensor(
                graph.value_name(input),
                tensor,
                defer_weights,
                export_map,
            );
            out.extend(encode_message_field(5, &t));
        }
    }

    // input = 11 (repeated)
    for &input in graph.block_inputs(block) {
        let vi = encode_value_info(graph, input)?;
        out.extend(encode_message_field(11, &vi));
    }

    // output = 12 (repeated)
    for &output in graph.block(block).outputs() {
        let vi = encode_value_info(graph, output)?;
        out.extend(encode_message_field(12, &vi));
    }

    Ok(out)
}

fn encode_node(
    graph: &Graph,
    nid: NodeId,
    params: &ParamMap,
    defer_weights: bool,
    export_map: &mut ExportMap,
) -> Result<Vec<u8>, SerializeError> {
    let node = graph.node(nid);
    let mut out = Vec::new();
    for &input in node.inputs() {
        out.extend(encode_string_field(1, graph.value_name(input)));
    }
    for &output in node.outputs() {
        out.extend(encode_string_field(2, graph.value_name(output)));
    }
    out.extend(encode_string_field(3, &nid.to_string()));
    out.extend(encode_string_field(4, &node.kind().op));
    // Untranslated nodes keep their origin namespace as the operator domain,
    // so a downstream consumer can still recognize them.
    if node.kind().namespace != Namespace::Onnx {
        out.extend(encode_string_field(7, node.kind().namespace.as_str()));
    }

    for (name, value) in node.attrs() {
        let attr = encode_attribute(graph, name, value, params, defer_weights, export_map)?;
        out.extend(encode_message_field(5, &attr));
    }

    // Control-flow bodies serialize as subgraph attributes; the attribute
    // names follow the target format's conventions for each operator.
    let child_names: &[&str] = match node.kind().op.as_str() {
        "If" => &["then_branch", "else_branch"],
        _ => &["body"],
    };
    for (i, &child) in node.child_blocks().iter().enumerate() {
        let name = child_names.get(i).copied().unwrap_or("body");
        let sub = encode_block(graph, child, params, defer_weights, export_map)?;
        let mut attr = Vec::new();
        attr.extend(encode_string_field(1, name));
        attr.extend(encode_message_field(6, &sub));
        attr.extend(encode_varint_field(20, 5)); // type = GRAPH
        out.extend(encode_message_field(5, &attr));
    }

    Ok(out)
}

fn encode_attribute(
    graph: &Graph,
    name: &str,
    value: &AttrValue,
    params: &ParamMap,
    defer_weights: bool,
    export_map: &mut ExportMap,
) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::new();
    out.extend(encode_string_field(1, name));
    match value {
        AttrValue::Float(v) => {
            out.extend(encode_float_field(2, *v as f32));
            out.extend(encode_varint_field(20, 1)); // FLOAT
        }
        AttrValue::Int(v) => {
            out.extend(encode_int_field(3, *v));
            out.extend(encode_varint_field(20, 2)); // INT
        }
        AttrValue::Str(s) => {
            out.extend(encode_string_field(4, s));
            out.extend(encode_varint_field(20, 3)); // STRING
        }
        AttrValue::Tensor(t) => {
            let bytes = encode_tensor("", t, false, export_map);
            out.extend(encode_message_field(5, &bytes));
            out.extend(encode_varint_field(20, 4)); // TENSOR
        }
        AttrValue::Graph(block) => {
            let sub = encode_block(graph, *block, params, defer_weights, export_map)?;
            out.extend(encode_message_field(6, &sub));
            out.extend(encode_varint_field(20, 5)); // GRAPH
        }
        AttrValue::Floats(vs) => {
            for &v in vs {
                out.extend(encode_float_field(7, v as f32));
            }
            out.extend(encode_varint_field(20, 6)); // FLOATS
        }
        AttrValue::Ints(vs) => {
            for &v in vs {
                out.extend(encode_int_field(8, v));
            }
            out.extend(encode_varint_field(20, 7)); // INTS
        }
        AttrValue::Strs(vs) => {
            for v in vs {
                out.extend(encode_string_field(9, v));
            }
            out.extend(encode_varint_field(20, 8)); // STRINGS
        }
        AttrValue::Tensors(ts) => {
            for t in ts {
                let bytes = encode_tensor("", t, false, export_map);
                out.extend(encode_message_field(10, &bytes));
            }
            out.extend(encode_varint_field(20, 9)); // TENSORS
        }
    }
    Ok(out)
}

/// Encode a `TensorProto`. With `defer` set, the payload goes into the
/// export map under `name` and the serialized tensor stays data-less.
fn encode_tensor(
    name: &str,
    tensor: &TensorData,
    defer: bool,
    export_map: &mut ExportMap,
) -> Vec<u8> {
    let mut out = Vec::new();
    for &dim in tensor.shape() {
        out.extend(encode_int_field(1, dim));
    }
    out.extend(encode_varint_field(2, dtype_code(tensor.dtype())));
    if !name.is_empty() {
        out.extend(encode_string_field(8, name));
    }
    if defer {
        export_map.insert(name.to_owned(), tensor.to_le_bytes());
    } else {
        out.extend(encode_len_field(9, &tensor.to_le_bytes()));
    }
    out
}

fn encode_value_info(graph: &Graph, value: crate::ir::ValueId) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::new();
    let name = graph.value_name(value);
    if name.is_empty() {
        return Err(SerializeError::BadValue {
            value: value.to_string(),
            detail: "value has an empty name".to_owned(),
        });
    }
    out.extend(encode_string_field(1, name));
    let ty = encode_type(graph.value_type(value));
    out.extend(encode_message_field(2, &ty));
    Ok(out)
}

fn encode_type(ty: &Type) -> Vec<u8> {
    let tensor_inner = match ty {
        Type::Tensor { dtype, shape } => {
            let mut inner = Vec::new();
            if let Some(dtype) = dtype {
                inner.extend(encode_varint_field(1, dtype_code(*dtype)));
            }
            if let Some(shape) = shape {
                let mut shape_bytes = Vec::new();
                for &dim in shape {
                    let dim_bytes = encode_int_field(1, dim);
                    shape_bytes.extend(encode_message_field(1, &dim_bytes));
                }
                inner.extend(encode_message_field(2, &shape_bytes));
            }
            inner
        }
        // Scalars were erased to 0-d tensors by the pipeline; anything else
        // serializes as an unconstrained tensor type.
        _ => Vec::new(),
    };
    encode_message_field(1, &tensor_inner)
}
