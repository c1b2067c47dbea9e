use crate::ir::node::NodeId;
use crate::ir::value::ValueId;

/// An opaque index identifying a block within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A nested, self-contained node sequence: the top level of a graph, or the
/// body of a control-flow node.
///
/// Invariants maintained by `Graph`:
/// 1. `param_source` is a `trace::Param` node unique to this block; its
///    outputs are exactly the block's declared inputs (actual arguments
///    followed by attached parameters, for the top-level block).
/// 2. `nodes` holds the remaining nodes in program order; the param-source
///    node is not a member of the list.
/// 3. Every `ValueId` in `outputs` is live and carries a matching
///    `Use::BlockOutput` entry.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) param_source: NodeId,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) outputs: Vec<ValueId>,
    /// The control-flow node owning this block, `None` for the top level.
    pub(crate) parent: Option<NodeId>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The unique parameter-source node exposing this block's inputs.
    pub fn param_source(&self) -> NodeId {
        self.param_source
    }

    /// Nodes in program order (excluding the parameter-source node).
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Declared block outputs, in order.
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}
