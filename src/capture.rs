//! The capture boundary: how the exporter talks to the host model and the
//! tracing engine.
//!
//! The tracer and the model object live outside this crate; the exporter
//! sees them only through `Model` (parameter storage, training flag,
//! persistent-state keys) and `Traceable` (run once under the tracer,
//! produce a raw `Capture`).

use crate::error::CaptureError;
use crate::ir::{Graph, TensorData};

/// The result of tracing one concrete execution.
pub struct Capture {
    /// The recorded graph: actual arguments first, attached parameters last,
    /// as the outputs of the top block's parameter-source node.
    pub graph: Graph,
    /// Concrete output values observed during the traced run, if the tracer
    /// recorded them. Used to restore output types that the pass pipeline
    /// may erase.
    pub outputs: Option<Vec<TensorData>>,
}

/// The host model's object model, as far as the exporter needs it.
pub trait Model {
    fn training(&self) -> bool;
    fn set_training(&mut self, mode: bool);

    /// Keys of the persistent state (weights and buffers). Compared before
    /// and after tracing to detect a model that mutates itself.
    fn state_keys(&self) -> Vec<String>;

    /// Ordered parameter snapshot: name → concrete value, in the same order
    /// the tracer attaches them as trailing graph inputs.
    fn parameters(&self) -> Vec<(String, TensorData)>;
}

/// A model that can be run once under a tracing engine.
pub trait Traceable: Model {
    fn trace(&mut self) -> Result<Capture, CaptureError>;
}

/// Training-mode handling around capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingMode {
    /// Export in inference mode (the default; a traced training-mode run
    /// can update internal buffers).
    #[default]
    Eval,
    /// Export in training mode.
    Train,
    /// Leave the model's current mode untouched.
    Preserve,
}

/// Runs `f` with the model temporarily switched to `mode`, restoring the
/// previous mode on every exit path.
pub fn with_training_mode<M, T>(
    model: &mut M,
    mode: TrainingMode,
    f: impl FnOnce(&mut M) -> T,
) -> T
where
    M: Model + ?Sized,
{
    let target = match mode {
        TrainingMode::Eval => false,
        TrainingMode::Train => true,
        TrainingMode::Preserve => return f(model),
    };
    let previous = model.training();
    if previous != target {
        model.set_training(target);
    }
    let result = f(model);
    if previous != target {
        model.set_training(previous);
    }
    result
}

/// Traces the model under the requested training mode, failing fast if the
/// persistent-state keys changed across the traced run.
pub fn capture_graph<M: Traceable>(
    model: &mut M,
    mode: TrainingMode,
) -> Result<Capture, CaptureError> {
    let keys_before = model.state_keys();
    let capture = with_training_mode(model, mode, |m| m.trace())?;
    if keys_before != model.state_keys() {
        return Err(CaptureError::StateChanged);
    }
    Ok(capture)
}
