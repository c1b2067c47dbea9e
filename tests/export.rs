//! End-to-end export tests, driven through toy `Model`/`Traceable`
//! implementations standing in for the host framework and tracer.

use std::cell::Cell;
use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use tracegraph::error::Error;
use tracegraph::ir::{AttrValue, DType, Graph, NodeKind, TensorData, Type};
use tracegraph::{
    export, export_pretty, Capture, DirectorySink, ExportOptions, ExportSink, FileSink, Model,
    OperatorExportType, Traceable, TrainingMode,
};

fn f32_ty(shape: &[i64]) -> Type {
    Type::tensor_of(DType::F32, shape.to_vec())
}

/// Collects writes in memory; stands in for an archive writer.
#[derive(Default)]
struct MemorySink {
    defer: bool,
    model: Vec<u8>,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    fn deferring() -> MemorySink {
        MemorySink {
            defer: true,
            ..MemorySink::default()
        }
    }
}

impl ExportSink for MemorySink {
    fn defers_weights(&self) -> bool {
        self.defer
    }

    fn write_model(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.model = bytes.to_vec();
        Ok(())
    }

    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        self.blobs.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }
}

/// `y = x + w`, with `w` a trained parameter.
struct AddModel {
    training: bool,
    w: TensorData,
    /// When set, `x` is a traced literal instead of a graph input.
    constant_input: bool,
    /// Observed by the training-guard test.
    training_during_trace: Cell<Option<bool>>,
}

impl AddModel {
    fn new() -> AddModel {
        AddModel {
            training: false,
            w: TensorData::from_f32s(vec![10.0, 20.0], vec![2]).unwrap(),
            constant_input: false,
            training_during_trace: Cell::new(None),
        }
    }
}

impl Model for AddModel {
    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, mode: bool) {
        self.training = mode;
    }

    fn state_keys(&self) -> Vec<String> {
        vec!["w".to_owned()]
    }

    fn parameters(&self) -> Vec<(String, TensorData)> {
        vec![("w".to_owned(), self.w.clone())]
    }
}

impl Traceable for AddModel {
    fn trace(&mut self) -> Result<Capture, tracegraph::error::CaptureError> {
        self.training_during_trace.set(Some(self.training));
        let mut graph = Graph::new("add_model");
        let x = if self.constant_input {
            let node = graph.create_node(graph.top(), NodeKind::trace("Constant"), &[]);
            let lit = TensorData::from_f32s(vec![1.0, 2.0], vec![2]).unwrap();
            graph.set_attr(node, "value", AttrValue::Tensor(lit.clone()));
            graph.add_node_output(node, lit.value_type())
        } else {
            graph.add_block_input(graph.top(), Some("x"), f32_ty(&[2]))
        };
        let w = graph.add_block_input(graph.top(), Some("w"), f32_ty(&[2]));
        let add = graph.create_node(graph.top(), NodeKind::tensor("add"), &[x, w]);
        let y = graph.add_node_output(add, f32_ty(&[2]));
        graph.add_block_output(graph.top(), y);
        Ok(Capture {
            graph,
            outputs: Some(vec![TensorData::from_f32s(vec![11.0, 22.0], vec![2]).unwrap()]),
        })
    }
}

/// A model that grows a new state key while being traced.
struct SelfMutatingModel {
    inner: AddModel,
    mutated: bool,
}

impl Model for SelfMutatingModel {
    fn training(&self) -> bool {
        self.inner.training()
    }
    fn set_training(&mut self, mode: bool) {
        self.inner.set_training(mode);
    }
    fn state_keys(&self) -> Vec<String> {
        let mut keys = self.inner.state_keys();
        if self.mutated {
            keys.push("sneaky".to_owned());
        }
        keys
    }
    fn parameters(&self) -> Vec<(String, TensorData)> {
        self.inner.parameters()
    }
}

impl Traceable for SelfMutatingModel {
    fn trace(&mut self) -> Result<Capture, tracegraph::error::CaptureError> {
        self.mutated = true;
        self.inner.trace()
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_export_add_without_folding() {
    let mut model = AddModel::new();
    let mut sink = MemorySink::default();
    export(&mut model, &ExportOptions::default(), &mut sink).unwrap();

    assert!(!sink.model.is_empty());
    assert!(sink.blobs.is_empty());
    // ModelProto begins with ir_version (field 1, varint) = 4.
    assert_eq!(&sink.model[..2], &[0x08, 0x04]);

    let text = export_pretty(&mut model, &ExportOptions::default()).unwrap();
    assert!(text.contains("op_type: \"Add\""), "text was:\n{}", text);
    assert!(text.contains("initializer { name: \"w\""), "text was:\n{}", text);
    assert!(text.contains("input { name: \"x\""), "text was:\n{}", text);
}

#[test]
fn test_export_with_folding_eliminates_add() {
    let mut model = AddModel::new();
    model.constant_input = true;
    let options = ExportOptions {
        do_constant_folding: true,
        ..ExportOptions::default()
    };
    let text = export_pretty(&mut model, &options).unwrap();
    assert!(!text.contains("op_type: \"Add\""), "text was:\n{}", text);
    assert!(text.contains("initializer"), "text was:\n{}", text);
}

#[test]
fn test_export_without_params_takes_weights_as_inputs() {
    let mut model = AddModel::new();
    let options = ExportOptions {
        export_params: false,
        ..ExportOptions::default()
    };
    let text = export_pretty(&mut model, &options).unwrap();
    assert!(!text.contains("initializer"), "text was:\n{}", text);
    assert!(text.contains("input { name: \"w\""));
}

#[test]
fn test_export_raw_keeps_source_namespace() {
    let mut model = AddModel::new();
    let options = ExportOptions {
        operator_export_type: OperatorExportType::Raw,
        ..ExportOptions::default()
    };
    let text = export_pretty(&mut model, &options).unwrap();
    assert!(text.contains("op_type: \"add\""), "text was:\n{}", text);
    assert!(text.contains("domain: \"tensor\""), "text was:\n{}", text);
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

#[test]
fn test_too_many_input_names_fails_fast() {
    let mut model = AddModel::new();
    let options = ExportOptions {
        input_names: vec!["a".into(), "b".into(), "c".into()],
        ..ExportOptions::default()
    };
    let mut sink = MemorySink::default();
    match export(&mut model, &options, &mut sink) {
        Err(Error::Config(_)) => {}
        other => panic!("expected a config error, got {:?}", other),
    }
    // Failed before anything was written.
    assert!(sink.model.is_empty());
}

#[test]
fn test_exact_names_round_trip_in_order() {
    let mut graph = Graph::new("g");
    let a = graph.add_block_input(graph.top(), Some("a"), f32_ty(&[1]));
    let b = graph.add_block_input(graph.top(), Some("b"), f32_ty(&[1]));
    let add = graph.create_node(graph.top(), NodeKind::onnx("Add"), &[a, b]);
    let y = graph.add_node_output(add, f32_ty(&[1]));
    graph.add_block_output(graph.top(), y);

    tracegraph::export::set_input_and_output_names(
        &mut graph,
        &["data".to_owned(), "weights".to_owned()],
        &["result".to_owned()],
    )
    .unwrap();

    let input_names: Vec<&str> = graph.inputs().iter().map(|&v| graph.value_name(v)).collect();
    assert_eq!(input_names, vec!["data", "weights"]);
    let output_names: Vec<&str> = graph.outputs().iter().map(|&v| graph.value_name(v)).collect();
    assert_eq!(output_names, vec!["result"]);
    // Renaming never changes identity.
    assert_eq!(graph.inputs(), &[a, b]);
}

#[test]
fn test_name_prefix_renames_only_named_values() {
    let mut model = AddModel::new();
    let options = ExportOptions {
        // One name for two inputs: only the first is renamed.
        input_names: vec!["data".into()],
        output_names: vec!["result".into()],
        ..ExportOptions::default()
    };
    let text = export_pretty(&mut model, &options).unwrap();
    assert!(text.contains("input { name: \"data\""));
    assert!(text.contains("input { name: \"w\""));
    assert!(text.contains("output { name: \"result\""));
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[test]
fn test_directory_sink_writes_manifest_and_weights() {
    let dir = std::env::temp_dir().join(format!("tracegraph_test_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let mut model = AddModel::new();
    let mut sink = DirectorySink::new(&dir);
    export(&mut model, &ExportOptions::default(), &mut sink).unwrap();

    assert!(dir.join(tracegraph::MODEL_ENTRY_NAME).is_file());
    // The weight was externalized under its parameter name.
    let blob = std::fs::read(dir.join("w")).unwrap();
    assert_eq!(blob, model.w.to_le_bytes());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_file_sink_embeds_weights() {
    let path = std::env::temp_dir().join(format!("tracegraph_test_{}.onnx", std::process::id()));
    let mut model = AddModel::new();
    let mut sink = FileSink::new(&path);
    export(&mut model, &ExportOptions::default(), &mut sink).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(!bytes.is_empty());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_deferring_sink_receives_export_map() {
    let mut model = AddModel::new();
    let mut sink = MemorySink::deferring();
    export(&mut model, &ExportOptions::default(), &mut sink).unwrap();
    assert_eq!(sink.blobs.len(), 1);
    assert_eq!(sink.blobs["w"], model.w.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Capture guards
// ---------------------------------------------------------------------------

#[test]
fn test_training_mode_guard_restores_previous_mode() {
    let mut model = AddModel::new();
    model.training = true;
    let mut sink = MemorySink::default();
    export(&mut model, &ExportOptions::default(), &mut sink).unwrap();

    // Export defaults to inference mode during the trace...
    assert_eq!(model.training_during_trace.get(), Some(false));
    // ...and restores the previous mode afterwards.
    assert!(model.training);
}

#[test]
fn test_preserve_training_mode_leaves_model_untouched() {
    let mut model = AddModel::new();
    model.training = true;
    let options = ExportOptions {
        training: TrainingMode::Preserve,
        ..ExportOptions::default()
    };
    let mut sink = MemorySink::default();
    export(&mut model, &options, &mut sink).unwrap();
    assert_eq!(model.training_during_trace.get(), Some(true));
}

#[test]
fn test_state_mutation_during_trace_is_fatal() {
    let mut model = SelfMutatingModel {
        inner: AddModel::new(),
        mutated: false,
    };
    let mut sink = MemorySink::default();
    match export(&mut model, &ExportOptions::default(), &mut sink) {
        Err(Error::Capture(_)) => {}
        other => panic!("expected a capture error, got {:?}", other),
    }
}
