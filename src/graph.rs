//! The persistent flow graph (§3 "Basic Block", "Flow Graph", "Method
//! Body"; §4.2).
//!
//! Every mutator here takes `&self` and returns a *new* [`FlowGraph`]
//! sharing structure with the old one through `im`'s persistent maps —
//! this is a deliberate departure from the teacher, whose
//! `BodyAndCache`/`IndexVec`-backed MIR is mutated in place by passes
//! (see `DESIGN.md` / SPEC_FULL.md §9 "Persistent graph vs. mutable
//! builder"). [`crate::builder::FlowGraphBuilder`] is the mutable façade
//! most callers actually use.

use im::{HashMap as PMap, Vector as PVec};

use crate::inst::{BlockFlow, Instruction};
use crate::tag::{BlockTag, Tag, TagInterner, ValueTag};
use crate::ty::Type;

/// A typed, named value supplied at block entry (§3 Block parameter /
/// Glossary: "the SSA-less equivalent of a phi node").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParameter {
    pub tag: ValueTag,
    pub ty: Type,
}

/// The ordered parameters, instruction list and terminator of one basic
/// block (§3 Basic Block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub parameters: PVec<BlockParameter>,
    pub instructions: PVec<ValueTag>,
    pub flow: BlockFlow,
}

impl BasicBlock {
    fn empty() -> Self {
        BasicBlock {
            parameters: PVec::new(),
            instructions: PVec::new(),
            flow: BlockFlow::unreachable_default(),
        }
    }
}

/// Where an instruction's defining occurrence sits: which block, and at
/// which position in that block's instruction list. The index is a cache
/// — callers that already hold a [`SelectedInstruction`] from
/// [`crate::builder`] trust it until the view is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLocation {
    pub block: BlockTag,
    pub index: usize,
}

/// A persistent snapshot of an entire procedure's control-flow graph
/// (§3 Flow Graph). Cloning a `FlowGraph` is O(1) (the underlying `im`
/// maps are reference-counted tries); every mutator below instead
/// returns a *new* `FlowGraph` value.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    blocks: PMap<BlockTag, BasicBlock>,
    instructions: PMap<ValueTag, Instruction>,
    value_types: PMap<ValueTag, Type>,
    value_parents: PMap<ValueTag, BlockTag>,
    entry: BlockTag,
}

impl FlowGraph {
    /// A graph with a single, empty entry block.
    pub fn new(tags: &TagInterner) -> Self {
        let entry = tags.fresh_block("entry");
        let mut blocks = PMap::new();
        blocks.insert(entry, BasicBlock::empty());
        FlowGraph {
            blocks,
            instructions: PMap::new(),
            value_types: PMap::new(),
            value_parents: PMap::new(),
            entry,
        }
    }

    pub fn entry_point(&self) -> BlockTag {
        self.entry
    }

    pub fn contains_block(&self, tag: BlockTag) -> bool {
        self.blocks.contains_key(&tag)
    }

    pub fn contains_value(&self, tag: ValueTag) -> bool {
        self.value_types.contains_key(&tag)
    }

    pub fn get_basic_block(&self, tag: BlockTag) -> Option<&BasicBlock> {
        self.blocks.get(&tag)
    }

    pub fn get_value_type(&self, tag: ValueTag) -> Option<Type> {
        self.value_types.get(&tag).copied()
    }

    pub fn get_value_parent(&self, tag: ValueTag) -> Option<BlockTag> {
        self.value_parents.get(&tag).copied()
    }

    pub fn get_instruction(&self, tag: ValueTag) -> Option<&Instruction> {
        self.instructions.get(&tag)
    }

    pub fn block_tags(&self) -> impl Iterator<Item = BlockTag> + '_ {
        self.blocks.keys().copied()
    }

    pub fn value_tags(&self) -> impl Iterator<Item = ValueTag> + '_ {
        self.value_types.keys().copied()
    }

    /// Adds a fresh, unreachable, parameter-less block (§8 property 1).
    pub fn add_block(&self, tags: &TagInterner, name: &'static str) -> (Self, BlockTag) {
        let tag = tags.fresh_block(name);
        let mut graph = self.clone();
        graph.blocks.insert(tag, BasicBlock::empty());
        (graph, tag)
    }

    /// Removes a block and every value it owned (parameters and
    /// instructions). Does not check for dangling references to it —
    /// that is the validator's job (§4.4).
    pub fn remove_block(&self, tag: BlockTag) -> Self {
        let mut graph = self.clone();
        if let Some(block) = graph.blocks.remove(&tag) {
            for param in block.parameters.iter() {
                graph.value_types.remove(&param.tag);
                graph.value_parents.remove(&param.tag);
            }
            for inst_tag in block.instructions.iter() {
                graph.instructions.remove(inst_tag);
                graph.value_types.remove(inst_tag);
                graph.value_parents.remove(inst_tag);
            }
        }
        graph
    }

    /// Inserts `instruction` at `index` within `block`'s instruction list,
    /// binding it to a fresh value tag with result type `result_ty`.
    /// Returns the new graph and the tag so callers can thread the value
    /// onward without re-deriving it from a `SelectedInstruction`.
    pub fn insert_instruction(
        &self,
        tags: &TagInterner,
        block: BlockTag,
        index: usize,
        instruction: Instruction,
        name: &'static str,
        result_ty: Type,
    ) -> (Self, ValueTag) {
        let tag = tags.fresh_value(name);
        let mut graph = self.clone();
        let bb = graph.blocks.get_mut(&block).expect("insert_instruction: unknown block");
        let at = index.min(bb.instructions.len());
        bb.instructions.insert(at, tag);
        graph.instructions.insert(tag, instruction);
        graph.value_types.insert(tag, result_ty);
        graph.value_parents.insert(tag, block);
        (graph, tag)
    }

    /// Appends `instruction` to the end of `block`.
    pub fn append_instruction(
        &self,
        tags: &TagInterner,
        block: BlockTag,
        instruction: Instruction,
        name: &'static str,
        result_ty: Type,
    ) -> (Self, ValueTag) {
        let len = self.blocks.get(&block).map(|b| b.instructions.len()).unwrap_or(0);
        self.insert_instruction(tags, block, len, instruction, name, result_ty)
    }

    /// Replaces the instruction bound to `tag` in place, keeping its
    /// position and owning block. The result type is recomputed by the
    /// caller-supplied `result_ty` (different prototypes may have
    /// different result types).
    pub fn replace_instruction(&self, tag: ValueTag, instruction: Instruction, result_ty: Type) -> Self {
        let mut graph = self.clone();
        graph.instructions.insert(tag, instruction);
        graph.value_types.insert(tag, result_ty);
        graph
    }

    /// Removes the instruction bound to `tag` from its owning block's
    /// instruction list and from the value maps.
    pub fn remove_instruction(&self, tag: ValueTag) -> Self {
        let mut graph = self.clone();
        if let Some(block_tag) = graph.value_parents.remove(&tag) {
            if let Some(bb) = graph.blocks.get_mut(&block_tag) {
                if let Some(pos) = bb.instructions.iter().position(|t| *t == tag) {
                    bb.instructions.remove(pos);
                }
            }
        }
        graph.instructions.remove(&tag);
        graph.value_types.remove(&tag);
        graph
    }

    /// Drops every instruction at or after `len` from `block`'s instruction
    /// list *without* touching the value maps — used by
    /// [`crate::builder::FlowGraphBuilder::include`] when it splits a block
    /// around a throwing instruction and re-homes the tail onto a
    /// continuation block instead of discarding it.
    pub(crate) fn truncate_instructions(&self, block: BlockTag, len: usize) -> Self {
        let mut graph = self.clone();
        if let Some(bb) = graph.blocks.get_mut(&block) {
            while bb.instructions.len() > len {
                bb.instructions.remove(bb.instructions.len() - 1);
            }
        }
        graph
    }

    /// Appends `tags` (already-existing instruction values, typically
    /// moved from another block) to `block`'s instruction list and
    /// repoints their owning block, without touching the `instructions`
    /// content map — the instruction bodies themselves are unchanged.
    pub(crate) fn rehome_instructions(&self, block: BlockTag, tags: &[ValueTag]) -> Self {
        let mut graph = self.clone();
        if let Some(bb) = graph.blocks.get_mut(&block) {
            for tag in tags {
                bb.instructions.push_back(*tag);
            }
        }
        for tag in tags {
            graph.value_parents.insert(*tag, block);
        }
        graph
    }

    /// Removes `tag`'s entry from the instruction content map only. Used
    /// when a former instruction becomes a block parameter instead (the
    /// `Try`-wrapping step in [`crate::builder::FlowGraphBuilder::include`]):
    /// the value tag survives, but it stops being "an instruction" and
    /// [`update_block_parameters`](Self::update_block_parameters) takes
    /// over its `value_types`/`value_parents` entries.
    pub(crate) fn forget_instruction_record(&self, tag: ValueTag) -> Self {
        let mut graph = self.clone();
        graph.instructions.remove(&tag);
        graph
    }

    /// Inserts `instruction` under a tag minted elsewhere, appending it to
    /// `block`'s instruction list. Used by
    /// [`crate::builder::FlowGraphBuilder::include`], which must mint every
    /// copied value's fresh tag up front (a block's flow may reference a
    /// sibling block not yet populated) and only bind it to a body here.
    pub(crate) fn bind_instruction(&self, block: BlockTag, tag: ValueTag, instruction: Instruction, result_ty: Type) -> Self {
        let mut graph = self.clone();
        if let Some(bb) = graph.blocks.get_mut(&block) {
            bb.instructions.push_back(tag);
        }
        graph.instructions.insert(tag, instruction);
        graph.value_types.insert(tag, result_ty);
        graph.value_parents.insert(tag, block);
        graph
    }

    pub fn update_block_flow(&self, tag: BlockTag, flow: BlockFlow) -> Self {
        let mut graph = self.clone();
        if let Some(bb) = graph.blocks.get_mut(&tag) {
            bb.flow = flow;
        }
        graph
    }

    /// Replaces a block's parameter list. The old parameter value tags
    /// are dropped from the value maps; the new ones are added, bound to
    /// the block as their parent. Callers are responsible for keeping
    /// every branch that targets this block in sync (§3 invariant 2) —
    /// the validator (§4.4) checks, it does not fix up, branch arity.
    pub fn update_block_parameters(&self, tag: BlockTag, parameters: Vec<BlockParameter>) -> Self {
        let mut graph = self.clone();
        if let Some(bb) = graph.blocks.get(&tag).cloned() {
            for old in bb.parameters.iter() {
                graph.value_types.remove(&old.tag);
                graph.value_parents.remove(&old.tag);
            }
            for param in &parameters {
                graph.value_types.insert(param.tag, param.ty);
                graph.value_parents.insert(param.tag, tag);
            }
            let mut updated = bb;
            updated.parameters = parameters.into_iter().collect();
            graph.blocks.insert(tag, updated);
        }
        graph
    }

    pub fn with_entry_point(&self, tag: BlockTag) -> Self {
        let mut graph = self.clone();
        graph.entry = tag;
        graph
    }

    /// Every value tag's `(block, index)` location, reading straight
    /// through the persistent maps (no extra traversal: parameters are at
    /// well-known positions preceding the instruction list).
    pub fn locate(&self, tag: ValueTag) -> Option<ValueLocation> {
        let block_tag = self.get_value_parent(tag)?;
        let block = self.get_basic_block(block_tag)?;
        if let Some(index) = block.parameters.iter().position(|p| p.tag == tag) {
            return Some(ValueLocation { block: block_tag, index });
        }
        let index = block.instructions.iter().position(|t| *t == tag)?;
        Some(ValueLocation { block: block_tag, index })
    }
}

/// A graph plus its procedure-level signature (§3 Method Body).
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub graph: FlowGraph,
    pub return_type: Type,
    pub this_parameter: Option<BlockParameter>,
    pub parameters: Vec<BlockParameter>,
}

impl MethodBody {
    /// The method's extended parameter list: `this` first (if present),
    /// then the declared parameters (§4.5 point 2).
    pub fn extended_parameters(&self) -> Vec<BlockParameter> {
        let mut params = Vec::with_capacity(self.parameters.len() + 1);
        if let Some(this) = &self.this_parameter {
            params.push(this.clone());
        }
        params.extend(self.parameters.iter().cloned());
        params
    }
}

/// Pre-order, entry-first traversal of a graph's reachable blocks
/// (grounded on the teacher's `mir::traversal::preorder`, used by
/// `CfgSimplifier::new` to count predecessors). Unreachable blocks are
/// simply never visited, which is exactly what `transform::simplify_cfg`
/// relies on to find and drop them.
pub fn preorder(graph: &FlowGraph) -> Vec<BlockTag> {
    let mut seen = std::collections::HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![graph.entry_point()];
    while let Some(tag) = stack.pop() {
        if !seen.insert(tag) {
            continue;
        }
        order.push(tag);
        if let Some(bb) = graph.get_basic_block(tag) {
            // Reverse so traversal visits successors in declared order.
            for succ in bb.flow.successors().into_iter().rev() {
                if !seen.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
    }
    order
}
