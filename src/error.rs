use thiserror::Error;

/// Top-level error type for the export pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[capture error] {0}")]
    Capture(#[from] CaptureError),

    #[error("[config error] {0}")]
    Config(#[from] ConfigError),

    #[error("[pass error] {0}")]
    Pass(#[from] PassError),

    #[error("[translate error] {0}")]
    Translate(#[from] TranslateError),

    #[error("[build error] {0}")]
    Build(#[from] BuildError),

    #[error("[fold error] {0}")]
    Fold(#[from] FoldError),

    #[error("[serialize error] {0}")]
    Serialize(#[from] SerializeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Capture errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("model state changed while tracing; the persistent state keys before and after the traced run differ — the model mutates itself and cannot be safely exported")]
    StateChanged,

    #[error("tracing failed: {detail}")]
    TraceFailed { detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("number of {kind} names provided ({given}) exceeds the number of graph {kind}s ({actual})")]
    TooManyNames {
        kind: &'static str,
        given: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Pass errors (lint failures and pass-specific invariant violations)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PassError {
    #[error("value '{value}' is referenced by an operand of a node that no longer exists — the graph has a dangling use")]
    DanglingUse { value: String },

    #[error("value '{value}' is used by node '{node}' but never produced by any live node")]
    UseOfDeadValue { value: String, node: String },

    #[error("node '{node}' records '{value}' as output {index}, but the value does not point back at it — producer bookkeeping is inconsistent")]
    ProducerMismatch {
        node: String,
        value: String,
        index: usize,
    },

    #[error("block has no parameter-source node — every block must start with exactly one")]
    MissingParamSource,

    #[error("value '{value}' is used before the node that produces it")]
    UseBeforeDef { value: String },

    #[error("tuple-typed value '{value}' survived tuple lowering — the target format has no tuple type")]
    TupleNotLowered { value: String },

    #[error("cannot erase node '{node}': output '{value}' still has uses")]
    EraseWithUses { node: String, value: String },

    #[error("pass '{pass}' failed: {detail}")]
    Internal { pass: &'static str, detail: String },
}

// ---------------------------------------------------------------------------
// Translation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{detail} (occurred when translating '{op}')")]
    ArgumentMismatch { op: String, detail: String },

    #[error("unsupported literal payload on constant node: attribute kind '{kind}' cannot be represented in the target format")]
    UnsupportedConstantKind { kind: String },

    #[error("input value '{value}' of node '{node}' was never translated — the source graph is not in topological order")]
    UntranslatedInput { node: String, value: String },
}

// ---------------------------------------------------------------------------
// Builder errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid attribute specifier '{name}' — attribute names must be suffixed with a type code, e.g. 'axis_i' or 'dims_i'")]
    InvalidAttrName { name: String },

    #[error("attribute '{name}' declares type code '{code}' but the supplied value is of kind '{kind}'")]
    AttrKindMismatch {
        name: String,
        code: String,
        kind: String,
    },
}

// ---------------------------------------------------------------------------
// Constant-folding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FoldError {
    #[error("'{op}' node is missing required attribute '{attr}' for constant folding")]
    MissingAttr { op: String, attr: &'static str },

    #[error("'{op}' node attributes 'axes', 'starts', and 'ends' must have the same length")]
    SliceLengthMismatch { op: String },

    #[error("constant folding of '{op}' failed: {detail}")]
    EvalFailed { op: String, detail: String },
}

// ---------------------------------------------------------------------------
// Serialization errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("cannot serialize value '{value}': {detail}")]
    BadValue { value: String, detail: String },

    #[error("cannot serialize attribute '{name}': {detail}")]
    BadAttribute { name: String, detail: String },

    #[error("the flat-file sink cannot carry externalized weights, but the export map has {count} entries")]
    UnexpectedExportMap { count: usize },
}
