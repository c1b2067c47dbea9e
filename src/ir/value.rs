use crate::ir::block::BlockId;
use crate::ir::node::NodeId;
use crate::ir::types::Type;

/// An opaque, index-based reference to a value within a `Graph`.
///
/// Invariant: `ValueId(n)` is only valid within the `Graph` that produced it.
/// Do not store `ValueId`s across graph boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// One recorded consumer of a value.
///
/// The graph maintains these lists on every mutation; a value with an empty
/// use list is dead and its producing node may be erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Use {
    /// Operand `index` of `node`.
    Operand { node: NodeId, index: usize },
    /// Declared output `index` of `block`.
    BlockOutput { block: BlockId, index: usize },
}

/// A single data-carrying edge: produced by exactly one node output slot,
/// consumed by zero or more operands or block-output declarations.
///
/// The display name is assignable by callers (`Graph::set_value_name`) and
/// carries no identity — only the `ValueId` does.
#[derive(Debug, Clone)]
pub struct Value {
    pub(crate) name: String,
    pub(crate) ty: Type,
    /// Producing node and output slot index.
    pub(crate) producer: (NodeId, usize),
    pub(crate) uses: Vec<Use>,
}

impl Value {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The producing node and its output slot index.
    pub fn producer(&self) -> (NodeId, usize) {
        self.producer
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }
}
