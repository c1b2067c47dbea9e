//! tracegraph: exports traced computation graphs to the ONNX interchange
//! format.
//!
//! Export pipeline:
//!
//! ```text
//! model → Tracer → [Capture] → PassManager (normalize)
//!   → Translator → [target IR] → ConstantFolding (opt-in)
//!   → Serializer → ExportSink (file | archive | directory)
//! ```
//!
//! Pipeline stages (in order):
//! 1.  inline fork/wait    — no concurrency markers survive
//! 2.  DCE + lint          — dead nodes gone, invariants checked
//! 3.  remove in-place ops — the target has no mutation semantics
//! 4.  constant propagation, list-constant splitting
//! 5.  canonicalize, peephole
//! 6.  legalize division, erase scalar types, lower tuples
//! 7.  translate           — symbolic dispatch into the target vocabulary
//! 8.  target peephole, DCE, loop fixup, final canonicalize
//!
//! Tracing itself, the host model's object model, and concrete archive
//! writers live outside this crate, behind the `Model`/`Traceable` traits
//! and the `ExportSink` trait.

pub mod builder;
pub mod capture;
pub mod error;
pub mod export;
pub mod fold;
pub mod ir;
pub mod pass;
pub mod serialize;
pub mod translate;

pub use capture::{Capture, Model, Traceable, TrainingMode};
pub use error::Error;
pub use export::{
    export, export_capture, export_pretty, DirectorySink, ExportOptions, ExportSink, FileSink,
    OperatorExportType, DEFAULT_OPSET_VERSION, MODEL_ENTRY_NAME,
};
pub use fold::{fold_constants, FoldOptions};
