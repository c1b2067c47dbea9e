//! The mutable computation graph.
//!
//! `Graph` owns three arenas (nodes, values, blocks) and exposes every
//! mutation as a method, so the per-value use-lists can never go stale.
//!
//! Invariants:
//! - Every live `Value` is produced by exactly one output slot of a live
//!   `Node` (block inputs are outputs of the block's parameter-source node).
//! - Every entry in a value's use-list points at a live operand slot or
//!   block-output declaration holding that value.
//! - Erasing a node requires all of its outputs to be unused; erasure frees
//!   the node's child blocks bottom-up.
//!
//! The `LintPass` re-checks these invariants after every pipeline stage and
//! treats any violation as fatal.

use std::fmt;

use crate::error::PassError;
use crate::ir::block::{Block, BlockId};
use crate::ir::node::{AttrValue, Node, NodeId, NodeKind};
use crate::ir::types::Type;
use crate::ir::value::{Use, Value, ValueId};

#[derive(Debug)]
pub struct Graph {
    name: String,
    nodes: Vec<Option<Node>>,
    values: Vec<Option<Value>>,
    blocks: Vec<Option<Block>>,
    top: BlockId,
    next_name: u32,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Graph {
        let mut graph = Graph {
            name: name.into(),
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            top: BlockId(0),
            next_name: 0,
        };
        graph.top = graph.create_block_internal(None);
        graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn top(&self) -> BlockId {
        self.top
    }

    // -- arena accessors ---------------------------------------------------
    //
    // Stale ids are programming errors, not recoverable conditions, so the
    // accessors panic (like out-of-bounds slice indexing would).

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize].as_ref().expect("stale NodeId")
    }

    pub fn value(&self, id: ValueId) -> &Value {
        self.values[id.0 as usize].as_ref().expect("stale ValueId")
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.0 as usize].as_ref().expect("stale BlockId")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize].as_mut().expect("stale NodeId")
    }

    fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values[id.0 as usize].as_mut().expect("stale ValueId")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id.0 as usize].as_mut().expect("stale BlockId")
    }

    pub(crate) fn node_exists(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    pub(crate) fn value_exists(&self, id: ValueId) -> bool {
        self.values
            .get(id.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    pub(crate) fn block_exists(&self, id: BlockId) -> bool {
        self.blocks
            .get(id.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    // -- convenience reads -------------------------------------------------

    pub fn value_name(&self, id: ValueId) -> &str {
        &self.value(id).name
    }

    pub fn value_type(&self, id: ValueId) -> &Type {
        &self.value(id).ty
    }

    /// Graph inputs: the outputs of the top block's parameter-source node
    /// (actual arguments followed by attached parameters).
    pub fn inputs(&self) -> &[ValueId] {
        let ps = self.block(self.top).param_source;
        &self.node(ps).outputs
    }

    /// Graph outputs: the top block's declared outputs.
    pub fn outputs(&self) -> &[ValueId] {
        &self.block(self.top).outputs
    }

    pub fn block_inputs(&self, block: BlockId) -> &[ValueId] {
        let ps = self.block(block).param_source;
        &self.node(ps).outputs
    }

    /// Program-order node ids of a block, as a snapshot safe to iterate
    /// while mutating the graph.
    pub fn node_ids(&self, block: BlockId) -> Vec<NodeId> {
        self.block(block).nodes.clone()
    }

    /// The owning block and position of a node.
    pub fn position(&self, node: NodeId) -> (BlockId, usize) {
        let owner = self.node(node).block;
        let index = self
            .block(owner)
            .nodes
            .iter()
            .position(|&n| n == node)
            .expect("node missing from its block's node list");
        (owner, index)
    }

    /// Total number of live nodes, across all blocks, excluding
    /// parameter-source nodes.
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| !n.is_param_source())
            .count()
    }

    /// Every live node id in the arena (including parameter sources), in
    /// arbitrary order. Used by the lint pass.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .flatten()
            .map(|n| n.id)
            .collect()
    }

    /// Every live value id in the arena, in arbitrary order.
    pub fn live_values(&self) -> Vec<ValueId> {
        (0..self.values.len() as u32)
            .map(ValueId)
            .filter(|&v| self.value_exists(v))
            .collect()
    }

    /// Every live block id in the arena, in arbitrary order.
    pub fn live_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .flatten()
            .map(|b| b.id)
            .collect()
    }

    /// All blocks, children before parents. Iterative, so deeply nested
    /// control flow cannot overflow the stack.
    pub fn blocks_post_order(&self) -> Vec<BlockId> {
        let mut stack = vec![self.top];
        let mut order = Vec::new();
        while let Some(block) = stack.pop() {
            order.push(block);
            for &nid in &self.block(block).nodes {
                for &child in self.node(nid).blocks.iter().rev() {
                    stack.push(child);
                }
            }
        }
        order.reverse();
        order
    }

    // -- construction ------------------------------------------------------

    fn create_block_internal(&mut self, parent: Option<NodeId>) -> BlockId {
        let block_id = BlockId(self.blocks.len() as u32);
        // Reserve the block slot first so the param-source node can refer
        // to a valid id.
        self.blocks.push(None);
        let param_source = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id: param_source,
            kind: NodeKind::trace("Param"),
            block: block_id,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: Default::default(),
            blocks: Vec::new(),
        }));
        self.blocks[block_id.0 as usize] = Some(Block {
            id: block_id,
            param_source,
            nodes: Vec::new(),
            outputs: Vec::new(),
            parent,
        });
        block_id
    }

    /// Creates a child block attached to a control-flow node.
    pub fn attach_child_block(&mut self, node: NodeId) -> BlockId {
        let block = self.create_block_internal(Some(node));
        self.node_mut(node).blocks.push(block);
        block
    }

    /// Declares a block input: appends an output to the block's
    /// parameter-source node.
    pub fn add_block_input(
        &mut self,
        block: BlockId,
        name: Option<&str>,
        ty: Type,
    ) -> ValueId {
        let ps = self.block(block).param_source;
        self.add_node_output_named(ps, name, ty)
    }

    /// Declares a block input at `index`, shifting later inputs up.
    pub fn insert_block_input(
        &mut self,
        block: BlockId,
        index: usize,
        name: Option<&str>,
        ty: Type,
    ) -> ValueId {
        let ps = self.block(block).param_source;
        let id = self.add_node_output_named(ps, name, ty);
        let last = self.node(ps).outputs.len() - 1;
        let moved: Vec<ValueId> = self.node(ps).outputs[index..last].to_vec();
        for v in moved {
            self.value_mut(v).producer.1 += 1;
        }
        let outputs = &mut self.node_mut(ps).outputs;
        outputs.pop();
        outputs.insert(index, id);
        self.value_mut(id).producer.1 = index;
        id
    }

    /// Appends a node at the end of `block`.
    pub fn create_node(&mut self, block: BlockId, kind: NodeKind, inputs: &[ValueId]) -> NodeId {
        let at = self.block(block).nodes.len();
        self.insert_node(block, at, kind, inputs)
    }

    /// Inserts a node at `index` within `block`'s node list.
    pub fn insert_node(
        &mut self,
        block: BlockId,
        index: usize,
        kind: NodeKind,
        inputs: &[ValueId],
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id,
            kind,
            block,
            inputs: inputs.to_vec(),
            outputs: Vec::new(),
            attrs: Default::default(),
            blocks: Vec::new(),
        }));
        for (i, &v) in inputs.iter().enumerate() {
            self.value_mut(v).uses.push(Use::Operand { node: id, index: i });
        }
        self.block_mut(block).nodes.insert(index, id);
        id
    }

    /// Appends an output value to a node.
    pub fn add_node_output(&mut self, node: NodeId, ty: Type) -> ValueId {
        self.add_node_output_named(node, None, ty)
    }

    pub fn add_node_output_named(
        &mut self,
        node: NodeId,
        name: Option<&str>,
        ty: Type,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        let name = match name {
            Some(n) => n.to_owned(),
            None => self.fresh_value_name(),
        };
        let index = self.node(node).outputs.len();
        self.values.push(Some(Value {
            name,
            ty,
            producer: (node, index),
            uses: Vec::new(),
        }));
        self.node_mut(node).outputs.push(id);
        id
    }

    fn fresh_value_name(&mut self) -> String {
        let name = format!("v{}", self.next_name);
        self.next_name += 1;
        name
    }

    pub fn set_attr(&mut self, node: NodeId, name: impl Into<String>, value: AttrValue) {
        self.node_mut(node).attrs.insert(name.into(), value);
    }

    pub fn set_kind(&mut self, node: NodeId, kind: NodeKind) {
        self.node_mut(node).kind = kind;
    }

    /// Renames a value. Identity (the `ValueId`) is unchanged.
    pub fn set_value_name(&mut self, id: ValueId, name: impl Into<String>) {
        self.value_mut(id).name = name.into();
    }

    pub fn set_value_type(&mut self, id: ValueId, ty: Type) {
        self.value_mut(id).ty = ty;
    }

    // -- operand editing ---------------------------------------------------

    pub fn add_input(&mut self, node: NodeId, value: ValueId) {
        let index = self.node(node).inputs.len();
        self.node_mut(node).inputs.push(value);
        self.value_mut(value).uses.push(Use::Operand { node, index });
    }

    /// Replaces operand `index` of `node` with `value`.
    pub fn replace_input(&mut self, node: NodeId, index: usize, value: ValueId) {
        let old = self.node(node).inputs[index];
        self.remove_use(old, Use::Operand { node, index });
        self.node_mut(node).inputs[index] = value;
        self.value_mut(value).uses.push(Use::Operand { node, index });
    }

    /// Removes operand `index` of `node`, shifting later operands down.
    pub fn remove_input(&mut self, node: NodeId, index: usize) {
        let old = self.node_mut(node).inputs.remove(index);
        self.remove_use(old, Use::Operand { node, index });
        // Later operands moved down one slot; fix their recorded indices.
        let rest: Vec<ValueId> = self.node(node).inputs[index..].to_vec();
        for (offset, v) in rest.into_iter().enumerate() {
            let from = Use::Operand {
                node,
                index: index + offset + 1,
            };
            let to = Use::Operand {
                node,
                index: index + offset,
            };
            self.rewrite_use(v, from, to);
        }
    }

    /// Replaces operand `index` of `node` with a run of `values` (used when
    /// splicing list elements in place of a list-construct result).
    pub fn splice_input(&mut self, node: NodeId, index: usize, values: &[ValueId]) {
        let mut new_inputs = self.node(node).inputs.clone();
        new_inputs.splice(index..index + 1, values.iter().copied());
        self.remove_all_inputs(node);
        for v in new_inputs {
            self.add_input(node, v);
        }
    }

    pub fn remove_all_inputs(&mut self, node: NodeId) {
        while let Some(old) = self.node_mut(node).inputs.pop() {
            let index = self.node(node).inputs.len();
            self.remove_use(old, Use::Operand { node, index });
        }
    }

    /// Redirects every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.value_mut(old).uses);
        for u in &uses {
            match *u {
                Use::Operand { node, index } => {
                    self.node_mut(node).inputs[index] = new;
                }
                Use::BlockOutput { block, index } => {
                    self.block_mut(block).outputs[index] = new;
                }
            }
        }
        self.value_mut(new).uses.extend(uses);
    }

    fn remove_use(&mut self, value: ValueId, target: Use) {
        let uses = &mut self.value_mut(value).uses;
        let pos = uses
            .iter()
            .position(|u| *u == target)
            .expect("use-list entry missing");
        uses.swap_remove(pos);
    }

    fn rewrite_use(&mut self, value: ValueId, from: Use, to: Use) {
        let uses = &mut self.value_mut(value).uses;
        let pos = uses
            .iter()
            .position(|u| *u == from)
            .expect("use-list entry missing");
        uses[pos] = to;
    }

    // -- block outputs -----------------------------------------------------

    /// Declares `value` as the next output of `block`.
    pub fn add_block_output(&mut self, block: BlockId, value: ValueId) {
        let index = self.block(block).outputs.len();
        self.block_mut(block).outputs.push(value);
        self.value_mut(value).uses.push(Use::BlockOutput { block, index });
    }

    /// Replaces declared output `index` of `block` with `value`.
    pub fn replace_block_output(&mut self, block: BlockId, index: usize, value: ValueId) {
        let old = self.block(block).outputs[index];
        self.remove_use(old, Use::BlockOutput { block, index });
        self.block_mut(block).outputs[index] = value;
        self.value_mut(value).uses.push(Use::BlockOutput { block, index });
    }

    pub fn clear_block_outputs(&mut self, block: BlockId) {
        while let Some(old) = self.block_mut(block).outputs.pop() {
            let index = self.block(block).outputs.len();
            self.remove_use(old, Use::BlockOutput { block, index });
        }
    }

    // -- erasure -----------------------------------------------------------

    /// Erases a node. All of its outputs must be unused; child blocks are
    /// freed bottom-up.
    pub fn erase_node(&mut self, id: NodeId) -> Result<(), PassError> {
        for &out in self.node(id).outputs.iter() {
            if self.value(out).has_uses() {
                return Err(PassError::EraseWithUses {
                    node: self.node(id).kind.to_string(),
                    value: self.value(out).name.clone(),
                });
            }
        }

        // Free the whole subtree of child blocks, leaves first, with an
        // explicit stack.
        let mut pre = Vec::new();
        let mut stack: Vec<BlockId> = self.node(id).blocks.clone();
        while let Some(block) = stack.pop() {
            pre.push(block);
            for &nid in &self.block(block).nodes {
                stack.extend(self.node(nid).blocks.iter().copied());
            }
        }
        for &block in pre.iter().rev() {
            self.free_block_raw(block);
        }

        self.remove_all_inputs(id);
        let owner = self.node(id).block;
        self.block_mut(owner).nodes.retain(|&n| n != id);
        let outputs = std::mem::take(&mut self.node_mut(id).outputs);
        for out in outputs {
            self.values[out.0 as usize] = None;
        }
        self.nodes[id.0 as usize] = None;
        Ok(())
    }

    /// Frees one block whose child blocks are already gone: drops output
    /// declarations, then nodes in reverse program order, then the
    /// parameter source.
    fn free_block_raw(&mut self, block: BlockId) {
        self.clear_block_outputs(block);
        let nodes: Vec<NodeId> = self.block(block).nodes.iter().rev().copied().collect();
        for nid in nodes {
            self.remove_all_inputs(nid);
            let outputs = std::mem::take(&mut self.node_mut(nid).outputs);
            for out in outputs {
                self.values[out.0 as usize] = None;
            }
            self.nodes[nid.0 as usize] = None;
        }
        let ps = self.block(block).param_source;
        let outputs = std::mem::take(&mut self.node_mut(ps).outputs);
        for out in outputs {
            self.values[out.0 as usize] = None;
        }
        self.nodes[ps.0 as usize] = None;
        self.blocks[block.0 as usize] = None;
    }

    /// Erases output `index` of a block's parameter-source node. The output
    /// must be unused.
    pub fn erase_source_output(&mut self, block: BlockId, index: usize) -> Result<(), PassError> {
        let ps = self.block(block).param_source;
        let out = self.node(ps).outputs[index];
        if self.value(out).has_uses() {
            return Err(PassError::EraseWithUses {
                node: self.node(ps).kind.to_string(),
                value: self.value(out).name.clone(),
            });
        }
        self.node_mut(ps).outputs.remove(index);
        self.values[out.0 as usize] = None;
        // Later outputs moved down one slot; fix their producer indices.
        let rest: Vec<ValueId> = self.node(ps).outputs[index..].to_vec();
        for v in rest {
            self.value_mut(v).producer.1 -= 1;
        }
        Ok(())
    }

    /// Erases every unused output of a block's parameter-source node.
    pub fn erase_unused_source_outputs(&mut self, block: BlockId) {
        let ps = self.block(block).param_source;
        for index in (0..self.node(ps).outputs.len()).rev() {
            let out = self.node(ps).outputs[index];
            if !self.value(out).has_uses() {
                self.erase_source_output(block, index)
                    .expect("unused output must be erasable");
            }
        }
    }

    /// Moves a node to `index` within `dest` (used when splicing inlined
    /// blocks). Values keep their identity.
    pub fn move_node_to(&mut self, node: NodeId, dest: BlockId, index: usize) {
        let owner = self.node(node).block;
        self.block_mut(owner).nodes.retain(|&n| n != node);
        self.block_mut(dest).nodes.insert(index, node);
        self.node_mut(node).block = dest;
    }

    // -- renaming ----------------------------------------------------------

    /// Renames every auto-generated value name to a sequential
    /// program-order name, so two exports of the same model serialize
    /// identically. Caller-assigned names (inputs, outputs, parameters)
    /// are kept, and never collided with.
    pub fn canonicalize_names(&mut self) {
        fn is_generated(name: &str) -> bool {
            name.strip_prefix('v')
                .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        }

        let mut ordered: Vec<ValueId> = Vec::new();
        let mut taken: std::collections::HashSet<String> = std::collections::HashSet::new();
        for block in self.blocks_pre_order() {
            let mut visit = self.block_inputs(block).to_vec();
            for nid in self.node_ids(block) {
                visit.extend_from_slice(&self.node(nid).outputs);
            }
            for v in visit {
                if is_generated(self.value_name(v)) {
                    ordered.push(v);
                } else {
                    taken.insert(self.value_name(v).to_owned());
                }
            }
        }

        let mut next = 0u32;
        for v in ordered {
            let name = loop {
                let candidate = format!("v{}", next);
                next += 1;
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            self.set_value_name(v, name);
        }
        self.next_name = next;
    }

    /// All blocks, parents before children.
    pub fn blocks_pre_order(&self) -> Vec<BlockId> {
        let mut order = self.blocks_post_order();
        order.reverse();
        order
    }
}

// ---------------------------------------------------------------------------
// Text dump (diagnostics)
// ---------------------------------------------------------------------------

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph {}", self.name)?;
        self.fmt_block(f, self.top, 0)
    }
}

impl Graph {
    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: BlockId, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let inputs: Vec<String> = self
            .block_inputs(block)
            .iter()
            .map(|&v| format!("{}: {}", self.value_name(v), self.value_type(v)))
            .collect();
        writeln!(f, "({}):", inputs.join(", "))?;
        for &nid in self.block(block).nodes.iter() {
            let node = self.node(nid);
            let outs: Vec<&str> = node.outputs.iter().map(|&v| self.value_name(v)).collect();
            let ins: Vec<&str> = node.inputs.iter().map(|&v| self.value_name(v)).collect();
            write!(f, "{}  {} = {}({})", pad, outs.join(", "), node.kind, ins.join(", "))?;
            let attrs: Vec<String> = node
                .attrs()
                .map(|(k, v)| match v {
                    AttrValue::Graph(b) => format!("{}={}", k, b),
                    other => format!("{}={:?}", k, other),
                })
                .collect();
            if !attrs.is_empty() {
                write!(f, " {{{}}}", attrs.join(", "))?;
            }
            writeln!(f)?;
            for &child in node.blocks.iter() {
                write!(f, "{}  block {}", pad, child)?;
                self.fmt_block(f, child, depth + 1)?;
            }
        }
        let outs: Vec<&str> = self
            .block(block)
            .outputs
            .iter()
            .map(|&v| self.value_name(v))
            .collect();
        writeln!(f, "{}  -> ({})", pad, outs.join(", "))
    }
}
