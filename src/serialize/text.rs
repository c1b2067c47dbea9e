//! Protobuf-text-style pretty printer for diagnostics.
//!
//! Produces a human-readable rendering of the serialized form without
//! building the binary: the same shape a protobuf text dump of the model
//! would have, parameterized by operator-set version and export mode.

use std::fmt::Write;

use crate::error::SerializeError;
use crate::export::OperatorExportType;
use crate::ir::{AttrValue, BlockId, Graph, Namespace, ParamMap, Type};
use crate::serialize::model::dtype_code;

impl From<std::fmt::Error> for SerializeError {
    fn from(e: std::fmt::Error) -> Self {
        SerializeError::BadValue {
            value: String::new(),
            detail: e.to_string(),
        }
    }
}

/// Render `graph` as protobuf-style text.
pub fn pretty_print(
    graph: &Graph,
    params: &ParamMap,
    opset_version: u64,
    export_type: OperatorExportType,
) -> Result<String, SerializeError> {
    let mut out = String::new();
    writeln!(out, "ir_version: 4")?;
    writeln!(out, "producer_name: \"tracegraph\"")?;
    writeln!(out, "# export mode: {:?}", export_type)?;
    write_block(&mut out, graph, graph.top(), params, "graph", 0)?;
    writeln!(out, "opset_import {{ domain: \"\" version: {} }}", opset_version)?;
    Ok(out)
}

fn write_block(
    out: &mut String,
    graph: &Graph,
    block: BlockId,
    params: &ParamMap,
    label: &str,
    depth: usize,
) -> Result<(), SerializeError> {
    let pad = "  ".repeat(depth);
    writeln!(out, "{}{} {{", pad, label)?;
    writeln!(out, "{}  name: {:?}", pad, graph.name())?;

    for &nid in graph.block(block).nodes() {
        let node = graph.node(nid);
        writeln!(out, "{}  node {{", pad)?;
        writeln!(out, "{}    op_type: {:?}", pad, node.kind().op)?;
        if node.kind().namespace != Namespace::Onnx {
            writeln!(out, "{}    domain: {:?}", pad, node.kind().namespace.as_str())?;
        }
        let inputs: Vec<&str> = node.inputs().iter().map(|&v| graph.value_name(v)).collect();
        let outputs: Vec<&str> = node.outputs().iter().map(|&v| graph.value_name(v)).collect();
        writeln!(out, "{}    input: {:?}", pad, inputs)?;
        writeln!(out, "{}    output: {:?}", pad, outputs)?;
        for (name, value) in node.attrs() {
            writeln!(
                out,
                "{}    attribute {{ name: {:?} {} }}",
                pad,
                name,
                fmt_attr(value)
            )?;
        }
        for (i, &child) in node.child_blocks().iter().enumerate() {
            let label = match (node.kind().op.as_str(), i) {
                ("If", 0) => "then_branch",
                ("If", 1) => "else_branch",
                _ => "body",
            };
            write_block(out, graph, child, params, label, depth + 2)?;
        }
        writeln!(out, "{}  }}", pad)?;
    }

    for &input in graph.block_inputs(block) {
        if let Some(tensor) = params.get(&input) {
            writeln!(
                out,
                "{}  initializer {{ name: {:?} data_type: {} dims: {:?} }}",
                pad,
                graph.value_name(input),
                dtype_code(tensor.dtype()),
                tensor.shape()
            )?;
        }
    }
    for &input in graph.block_inputs(block) {
        writeln!(
            out,
            "{}  input {{ name: {:?} type {{ {} }} }}",
            pad,
            graph.value_name(input),
            fmt_type(graph.value_type(input))
        )?;
    }
    for &output in graph.block(block).outputs() {
        writeln!(
            out,
            "{}  output {{ name: {:?} type {{ {} }} }}",
            pad,
            graph.value_name(output),
            fmt_type(graph.value_type(output))
        )?;
    }
    writeln!(out, "{}}}", pad)?;
    Ok(())
}

fn fmt_attr(value: &AttrValue) -> String {
    match value {
        AttrValue::Float(v) => format!("f: {}", v),
        AttrValue::Int(v) => format!("i: {}", v),
        AttrValue::Str(s) => format!("s: {:?}", s),
        AttrValue::Tensor(t) => format!("t: {}", t),
        AttrValue::Graph(b) => format!("g: {}", b),
        AttrValue::Floats(vs) => format!("floats: {:?}", vs),
        AttrValue::Ints(vs) => format!("ints: {:?}", vs),
        AttrValue::Strs(vs) => format!("strings: {:?}", vs),
        AttrValue::Tensors(ts) => {
            let parts: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
            format!("tensors: [{}]", parts.join(", "))
        }
    }
}

fn fmt_type(ty: &Type) -> String {
    match ty {
        Type::Tensor { dtype, shape } => {
            let mut out = String::from("tensor_type {");
            if let Some(dtype) = dtype {
                out.push_str(&format!(" elem_type: {}", dtype_code(*dtype)));
            }
            if let Some(shape) = shape {
                let dims: Vec<String> =
                    shape.iter().map(|d| format!("dim_value: {}", d)).collect();
                out.push_str(&format!(" shape {{ {} }}", dims.join(" ")));
            }
            out.push_str(" }");
            out
        }
        other => format!("unknown_type {{ # {} }}", other),
    }
}
