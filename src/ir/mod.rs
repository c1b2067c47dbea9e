pub mod block;
pub mod graph;
pub mod node;
pub mod types;
pub mod value;

use std::collections::HashMap;

pub use block::{Block, BlockId};
pub use graph::Graph;
pub use node::{AttrValue, Namespace, Node, NodeId, NodeKind};
pub use types::{ArithOp, DType, Elems, TensorData, Type};
pub use value::{Use, Value, ValueId};

/// The parameter table: value identity → concrete constant.
///
/// Invariant: every key is an output of its block's parameter-source node;
/// entries whose output loses its last use are pruned by the folding engine.
pub type ParamMap = HashMap<ValueId, TensorData>;

