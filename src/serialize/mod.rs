//! Serialization of the translated graph to the binary container format,
//! plus the text rendering used for diagnostics. The protobuf wire encoder
//! lives in `proto`; the container schema itself is treated as an opaque
//! service behind `encode_model` / `pretty_print`.

pub mod model;
pub mod proto;
pub mod text;

pub use model::{encode_model, ExportMap};
pub use text::pretty_print;
