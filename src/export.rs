//! Export orchestration: capture → optimize → fold → name → serialize →
//! write.
//!
//! Configuration is an explicit `ExportOptions` value threaded through
//! every stage; repeated exports with different settings never interfere.
//! Output goes through a pluggable `ExportSink`; the crate ships the flat
//! file and directory sinks, and archive formats implement the trait
//! externally (the container writer itself is out of scope here).
//!
//! No transactional guarantee is made on the sink: when an export fails
//! partway, whatever the sink already received is undefined and should be
//! discarded by the caller.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::capture::{self, Capture, Traceable, TrainingMode};
use crate::error::{ConfigError, Error, SerializeError};
use crate::fold::{self, FoldOptions};
use crate::ir::{Graph, ParamMap, TensorData, Type, ValueId};
use crate::pass;
use crate::serialize;

/// Default target operator-set version.
pub const DEFAULT_OPSET_VERSION: u64 = 9;

/// Manifest entry name for the serialized graph in archive and directory
/// sinks.
pub const MODEL_ENTRY_NAME: &str = "model.onnx";

/// How source operators are mapped into the target vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatorExportType {
    /// Translate every operator through the symbolic registry.
    #[default]
    Standard,
    /// Wrap every generic tensor operator in an opaque node, untranslated.
    Direct,
    /// Translate where a symbolic exists, wrap the rest.
    DirectFallback,
    /// Skip translation entirely and serialize the normalized source IR.
    Raw,
}

/// Export configuration.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Embed trained parameters in the output (otherwise the exported graph
    /// takes them as runtime inputs).
    pub export_params: bool,
    /// Dump the final graph to stderr.
    pub verbose: bool,
    pub training: TrainingMode,
    /// Names to assign to graph inputs, in order. May name a prefix; naming
    /// more inputs than the graph has is a hard failure.
    pub input_names: Vec<String>,
    /// Names to assign to graph outputs, in order; same rules as inputs.
    pub output_names: Vec<String>,
    pub operator_export_type: OperatorExportType,
    pub opset_version: u64,
    pub do_constant_folding: bool,
    pub fold: FoldOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            export_params: true,
            verbose: false,
            training: TrainingMode::Eval,
            input_names: Vec::new(),
            output_names: Vec::new(),
            operator_export_type: OperatorExportType::Standard,
            opset_version: DEFAULT_OPSET_VERSION,
            do_constant_folding: false,
            fold: FoldOptions::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Where the serialized model and any externalized weights go.
///
/// A sink that defers weights receives one `write_blob` call per auxiliary
/// weight after `write_model`; a sink that does not defer must never
/// receive blobs (the exporter embeds everything in the model bytes).
pub trait ExportSink {
    /// Whether auxiliary weights are externalized rather than embedded.
    fn defers_weights(&self) -> bool;

    fn write_model(&mut self, bytes: &[u8]) -> Result<(), Error>;

    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error>;

    /// Called once after all writes; release the underlying resource here.
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Single flat file; everything embedded.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> FileSink {
        FileSink { path: path.into() }
    }
}

impl ExportSink for FileSink {
    fn defers_weights(&self) -> bool {
        false
    }

    fn write_model(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut file = fs::File::create(&self.path)?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn write_blob(&mut self, _name: &str, _bytes: &[u8]) -> Result<(), Error> {
        Err(SerializeError::UnexpectedExportMap { count: 1 }.into())
    }
}

/// A directory holding the model under `MODEL_ENTRY_NAME` plus one loose
/// file per externalized weight.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> DirectorySink {
        DirectorySink { dir: dir.into() }
    }
}

impl ExportSink for DirectorySink {
    fn defers_weights(&self) -> bool {
        true
    }

    fn write_model(&mut self, bytes: &[u8]) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(MODEL_ENTRY_NAME), bytes)?;
        Ok(())
    }

    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        fs::write(self.dir.join(name), bytes)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Exports a model: trace it once, run the full transformation pipeline,
/// serialize, and write through `sink`.
pub fn export<M: Traceable>(
    model: &mut M,
    options: &ExportOptions,
    sink: &mut dyn ExportSink,
) -> Result<(), Error> {
    let capture = capture::capture_graph(model, options.training)?;
    let parameters = model.parameters();
    let (graph, params) = graph_from_capture(capture, parameters, options)?;
    write_out(&graph, &params, options, sink)
}

/// Exports an already-captured graph (the script-introspection path: no
/// tracing, the caller supplies the capture and the parameter snapshot).
pub fn export_capture(
    capture: Capture,
    parameters: Vec<(String, TensorData)>,
    options: &ExportOptions,
    sink: &mut dyn ExportSink,
) -> Result<(), Error> {
    let (graph, params) = graph_from_capture(capture, parameters, options)?;
    write_out(&graph, &params, options, sink)
}

/// Renders the fully transformed graph as protobuf-style text.
pub fn export_pretty<M: Traceable>(
    model: &mut M,
    options: &ExportOptions,
) -> Result<String, Error> {
    let capture = capture::capture_graph(model, options.training)?;
    let parameters = model.parameters();
    let (graph, params) = graph_from_capture(capture, parameters, options)?;
    let params = if options.export_params {
        params
    } else {
        ParamMap::new()
    };
    Ok(serialize::pretty_print(
        &graph,
        &params,
        options.opset_version,
        options.operator_export_type,
    )?)
}

/// Shared front half of every export: names validated, parameter table
/// attached, pipeline run, output types restored, names applied, constants
/// folded.
fn graph_from_capture(
    capture: Capture,
    parameters: Vec<(String, TensorData)>,
    options: &ExportOptions,
) -> Result<(Graph, ParamMap), Error> {
    let Capture {
        mut graph,
        outputs,
    } = capture;

    // Surface a name-count mismatch before any transformation work.
    check_name_count(options.input_names.len(), graph.inputs().len(), "input")?;
    check_name_count(options.output_names.len(), graph.outputs().len(), "output")?;

    // The trailing graph inputs are the attached parameters, in snapshot
    // order; key the table by value identity.
    let inputs = graph.inputs().to_vec();
    if parameters.len() > inputs.len() {
        return Err(ConfigError::TooManyNames {
            kind: "parameter",
            given: parameters.len(),
            actual: inputs.len(),
        }
        .into());
    }
    let first_param = inputs.len() - parameters.len();
    let mut params: ParamMap = HashMap::new();
    for ((name, tensor), &value) in parameters.into_iter().zip(&inputs[first_param..]) {
        graph.set_value_name(value, name);
        params.insert(value, tensor);
    }

    pass::optimize(&mut graph, &mut params, options)?;

    // The pipeline may erase output type information the serializer needs;
    // restore it from the concrete values observed while tracing.
    if let Some(observed) = outputs {
        let graph_outputs = graph.outputs().to_vec();
        for (&value, tensor) in graph_outputs.iter().zip(observed.iter()) {
            graph.set_value_type(
                value,
                Type::tensor_of(tensor.dtype(), tensor.shape().to_vec()),
            );
        }
    }

    set_input_and_output_names(&mut graph, &options.input_names, &options.output_names)?;

    if options.do_constant_folding {
        fold::fold_constants(&mut graph, &mut params, options.fold)?;
        // Folded nodes linger without inputs or uses; sweep them before
        // serialization.
        pass::run_post_fold_cleanup(&mut graph)?;
    }

    if options.verbose {
        eprintln!("{}", graph);
    }
    Ok((graph, params))
}

fn check_name_count(given: usize, actual: usize, kind: &'static str) -> Result<(), ConfigError> {
    if given > actual {
        return Err(ConfigError::TooManyNames {
            kind,
            given,
            actual,
        });
    }
    Ok(())
}

/// Applies caller-supplied input/output names to the graph, in order. A
/// shorter list renames only the prefix.
pub fn set_input_and_output_names(
    graph: &mut Graph,
    input_names: &[String],
    output_names: &[String],
) -> Result<(), Error> {
    fn set_names(
        graph: &mut Graph,
        values: Vec<ValueId>,
        names: &[String],
        kind: &'static str,
    ) -> Result<(), Error> {
        check_name_count(names.len(), values.len(), kind)?;
        for (value, name) in values.into_iter().zip(names) {
            if graph.value_name(value) != name {
                graph.set_value_name(value, name.clone());
            }
        }
        Ok(())
    }
    let inputs = graph.inputs().to_vec();
    set_names(graph, inputs, input_names, "input")?;
    let outputs = graph.outputs().to_vec();
    set_names(graph, outputs, output_names, "output")
}

fn write_out(
    graph: &Graph,
    params: &ParamMap,
    options: &ExportOptions,
    sink: &mut dyn ExportSink,
) -> Result<(), Error> {
    let empty = ParamMap::new();
    let effective = if options.export_params { params } else { &empty };
    let defer = sink.defers_weights() && options.export_params;
    let (proto, export_map) =
        serialize::encode_model(graph, effective, options.opset_version, defer)?;
    if !sink.defers_weights() && !export_map.is_empty() {
        return Err(SerializeError::UnexpectedExportMap {
            count: export_map.len(),
        }
        .into());
    }
    sink.write_model(&proto)?;
    for (name, blob) in &export_map {
        sink.write_blob(name, blob)?;
    }
    sink.finish()
}
