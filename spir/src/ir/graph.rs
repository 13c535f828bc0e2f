//! Basic blocks, control-flow graphs, traversal, and CFG synthesis.
//!
//! Blocks reference their neighbors by [`BasicBlockId`]; the owning
//! [`ControlFlowGraph`] is the arena that resolves ids to blocks. A block
//! with two successors models a conditional branch: position 0 is the true
//! edge, position 1 the false edge.
//!
//! A function small enough to fit in one block does not need a full CFG;
//! [`Graph`] is implemented for a bare [`BasicBlock`] as the degenerate
//! single-block graph.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::id::{BasicBlockId, EntityId, InsnId, LabelId, ScopeId};
use crate::ir::insn::Insn;
use crate::ir::unit::TranslationUnit;

/// The label of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// An unconditional edge.
    Simple,
    /// The taken edge of a conditional branch.
    True,
    /// The not-taken edge of a conditional branch.
    False,
}

/// A maximal straight-line run of instructions.
#[derive(Debug)]
pub struct BasicBlock {
    id: BasicBlockId,
    scope: ScopeId,
    func: EntityId,
    insns: Vec<Insn>,
    preds: Vec<BasicBlockId>,
    succs: Vec<BasicBlockId>,
}

impl BasicBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(id: BasicBlockId, scope: ScopeId, func: EntityId) -> Self {
        BasicBlock {
            id,
            scope,
            func,
            insns: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Creates an empty block with room for `insn_count` instructions.
    #[must_use]
    pub fn with_capacity(
        id: BasicBlockId,
        scope: ScopeId,
        func: EntityId,
        insn_count: usize,
    ) -> Self {
        BasicBlock {
            id,
            scope,
            func,
            insns: Vec::with_capacity(insn_count),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// The block's id.
    #[must_use]
    pub fn id(&self) -> BasicBlockId {
        self.id
    }

    /// The enclosing scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The owning function.
    #[must_use]
    pub fn func_id(&self) -> EntityId {
        self.func
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn insn_count(&self) -> usize {
        self.insns.len()
    }

    /// The instruction at `idx`.
    ///
    /// # Panics
    ///
    /// Panics when `idx` is out of bounds.
    #[must_use]
    pub fn insn(&self, idx: usize) -> Insn {
        self.insns[idx]
    }

    /// The first instruction.
    ///
    /// # Panics
    ///
    /// Panics on an empty block.
    #[must_use]
    pub fn entry_insn(&self) -> Insn {
        self.insns[0]
    }

    /// The last instruction.
    ///
    /// # Panics
    ///
    /// Panics on an empty block.
    #[must_use]
    pub fn exit_insn(&self) -> Insn {
        self.insns[self.insns.len() - 1]
    }

    /// The id of the first instruction.
    #[must_use]
    pub fn entry_insn_id(&self) -> InsnId {
        self.entry_insn().id()
    }

    /// The id of the last instruction.
    #[must_use]
    pub fn exit_insn_id(&self) -> InsnId {
        self.exit_insn().id()
    }

    /// Number of predecessor blocks.
    #[must_use]
    pub fn pred_count(&self) -> usize {
        self.preds.len()
    }

    /// The predecessor at `idx`.
    ///
    /// # Panics
    ///
    /// Panics when `idx` is out of bounds.
    #[must_use]
    pub fn pred(&self, idx: usize) -> BasicBlockId {
        self.preds[idx]
    }

    /// Number of successor blocks, at most two.
    #[must_use]
    pub fn succ_count(&self) -> usize {
        self.succs.len()
    }

    /// The successor at `idx`.
    ///
    /// # Panics
    ///
    /// Panics when `idx` is out of bounds.
    #[must_use]
    pub fn succ(&self, idx: usize) -> BasicBlockId {
        self.succs[idx]
    }

    /// The true-edge successor (position 0), if any.
    #[must_use]
    pub fn true_succ(&self) -> Option<BasicBlockId> {
        self.succs.first().copied()
    }

    /// The false-edge successor, present only on two-successor blocks.
    #[must_use]
    pub fn false_succ(&self) -> Option<BasicBlockId> {
        if self.succs.len() == 2 {
            Some(self.succs[1])
        } else {
            None
        }
    }

    /// Returns `true` when `idx` addresses the last instruction.
    #[must_use]
    pub fn is_last_index(&self, idx: usize) -> bool {
        idx + 1 == self.insns.len()
    }

    /// Returns `true` for a single-successor block.
    #[must_use]
    pub fn has_only_one_succ(&self) -> bool {
        self.succs.len() == 1
    }

    /// The position of `succ` among this block's successors.
    #[must_use]
    pub fn succ_pos(&self, succ: BasicBlockId) -> Option<usize> {
        self.succs.iter().position(|&s| s == succ)
    }

    /// The label of the outgoing edge at `idx`.
    ///
    /// Both edges of a two-successor block are polarized; a lone edge is
    /// plain fall-through or goto control flow.
    #[must_use]
    pub fn succ_edge(&self, idx: usize) -> EdgeKind {
        if self.succs.len() == 2 {
            if idx == 0 {
                EdgeKind::True
            } else {
                EdgeKind::False
            }
        } else {
            EdgeKind::Simple
        }
    }

    pub(crate) fn add_succ(&mut self, succ: BasicBlockId) {
        debug_assert!(self.succs.len() < 2, "a block has at most two successors");
        self.succs.push(succ);
    }

    pub(crate) fn add_pred(&mut self, pred: BasicBlockId) {
        self.preds.push(pred);
    }

    pub(crate) fn push_insn(&mut self, insn: Insn) {
        self.insns.push(insn);
    }
}

/// Read access to a control-flow graph.
///
/// Implemented by [`ControlFlowGraph`] and, degenerately, by a single
/// [`BasicBlock`].
pub trait Graph {
    /// The enclosing scope.
    fn scope(&self) -> ScopeId;

    /// The owning function.
    fn func_id(&self) -> EntityId;

    /// The id of the entry block.
    fn entry_block_id(&self) -> BasicBlockId;

    /// The id of the exit block.
    fn exit_block_id(&self) -> BasicBlockId;

    /// Resolves a block id within this graph.
    fn block(&self, id: BasicBlockId) -> Option<&BasicBlock>;
}

impl Graph for BasicBlock {
    fn scope(&self) -> ScopeId {
        self.scope
    }

    fn func_id(&self) -> EntityId {
        self.func
    }

    fn entry_block_id(&self) -> BasicBlockId {
        self.id
    }

    fn exit_block_id(&self) -> BasicBlockId {
        self.id
    }

    fn block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        if id == self.id {
            Some(self)
        } else {
            None
        }
    }
}

/// A control-flow graph owning its basic blocks.
#[derive(Debug)]
pub struct ControlFlowGraph {
    id: crate::ir::id::CfgId,
    scope: ScopeId,
    func: EntityId,
    blocks: FxHashMap<BasicBlockId, BasicBlock>,
    /// Textual block order; drives fall-through edges and the entry/exit
    /// defaults.
    order: Vec<BasicBlockId>,
    entry: BasicBlockId,
    exit: BasicBlockId,
}

impl ControlFlowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(id: crate::ir::id::CfgId, scope: ScopeId, func: EntityId) -> Self {
        ControlFlowGraph {
            id,
            scope,
            func,
            blocks: FxHashMap::default(),
            order: Vec::new(),
            entry: BasicBlockId::NULL,
            exit: BasicBlockId::NULL,
        }
    }

    /// The graph's id.
    #[must_use]
    pub fn id(&self) -> crate::ir::id::CfgId {
        self.id
    }

    /// Adds a block, keeping insertion order.
    pub fn add_block(&mut self, block: BasicBlock) {
        self.order.push(block.id());
        self.blocks.insert(block.id(), block);
    }

    /// Marks the entry block.
    pub fn set_entry(&mut self, id: BasicBlockId) {
        self.entry = id;
    }

    /// Marks the exit block.
    pub fn set_exit(&mut self, id: BasicBlockId) {
        self.exit = id;
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks in textual order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.order.iter().filter_map(|id| self.blocks.get(id))
    }

    /// Block ids in textual order.
    #[must_use]
    pub fn block_order(&self) -> &[BasicBlockId] {
        &self.order
    }

    pub(crate) fn block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Connects `from` to `to`, appending the edge at the next successor
    /// position.
    pub fn connect(&mut self, from: BasicBlockId, to: BasicBlockId) {
        if let Some(block) = self.blocks.get_mut(&from) {
            block.add_succ(to);
        }
        if let Some(block) = self.blocks.get_mut(&to) {
            block.add_pred(from);
        }
    }
}

impl Graph for ControlFlowGraph {
    fn scope(&self) -> ScopeId {
        self.scope
    }

    fn func_id(&self) -> EntityId {
        self.func
    }

    fn entry_block_id(&self) -> BasicBlockId {
        self.entry
    }

    fn exit_block_id(&self) -> BasicBlockId {
        self.exit
    }

    fn block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }
}

/// Computes the (reverse) post-order of `graph` from its entry block.
///
/// Depth-first traversal visiting successors in positional order, appending
/// each block after its successors are done. With `forward == false` the
/// raw post-order is returned; with `forward == true` the sequence is
/// reversed into reverse post-order. Blocks not reachable from the entry do
/// not appear. The traversal is iterative and deterministic.
#[must_use]
pub fn reverse_post_order(graph: &dyn Graph, forward: bool) -> Vec<BasicBlockId> {
    let mut order = Vec::new();
    let entry = graph.entry_block_id();
    if graph.block(entry).is_none() {
        return order;
    }

    let mut visited: FxHashSet<BasicBlockId> = FxHashSet::default();
    let mut stack: Vec<(BasicBlockId, usize)> = vec![(entry, 0)];
    visited.insert(entry);

    while let Some(frame) = stack.last_mut() {
        let id = frame.0;
        let block = graph.block(id).expect("visited blocks resolve");
        if frame.1 < block.succ_count() {
            let succ = block.succ(frame.1);
            frame.1 += 1;
            if graph.block(succ).is_some() && visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            order.push(id);
            stack.pop();
        }
    }

    if forward {
        order.reverse();
    }
    order
}

/// Builds a control-flow graph from a flat, labeled instruction sequence.
///
/// Three passes:
///
/// 1. Mark every label targeted by a conditional branch or a goto as used.
/// 2. Split the stream into blocks: a new block starts at every used label
///    reached mid-block, and after every branch, goto, return, call, or
///    call assignment that is not the last instruction.
/// 3. Connect the blocks: a conditional branch gets its true edge first and
///    its false edge second, a goto one edge, a return none; anything else
///    falls through to the textually next block.
///
/// The entry block is the first block; the exit block is the last block
/// ending in a return, or the last block overall when no block does.
/// Instructions are (re)registered with the translation unit so their
/// owning-block records point at the blocks built here.
pub fn synthesize_cfg(
    tu: &mut TranslationUnit,
    scope: ScopeId,
    func: EntityId,
    body: Vec<Insn>,
) -> ControlFlowGraph {
    let mut cfg = ControlFlowGraph::new(tu.new_cfg_id(), scope, func);

    // Pass 1: find the labels that are actually jump targets.
    let mut used: FxHashSet<LabelId> = FxHashSet::default();
    for insn in &body {
        if insn.is_cond() {
            let (t, f) = insn.labels();
            used.insert(t);
            used.insert(f);
        } else if insn.is_goto() {
            used.insert(insn.labels().0);
        }
    }

    // Pass 2: split into blocks.
    let mut blocks: Vec<BasicBlock> = vec![BasicBlock::new(tu.new_basic_block_id(), scope, func)];
    let mut label_block: FxHashMap<LabelId, BasicBlockId> = FxHashMap::default();
    let total = body.len();
    for (i, insn) in body.into_iter().enumerate() {
        if insn.is_label() {
            let label = insn.labels().0;
            let current = blocks.last().expect("at least one block");
            if used.contains(&label) && current.insn_count() > 0 {
                blocks.push(BasicBlock::new(tu.new_basic_block_id(), scope, func));
            }
            label_block.insert(label, blocks.last().expect("pushed").id());
        }

        let splits = insn.is_cond()
            || insn.is_goto()
            || insn.is_return()
            || insn.is_call()
            || (insn.is_assign() && insn.has_call_expr());

        tu.add_insn(blocks.last_mut().expect("at least one block"), insn, None);

        if splits && i + 1 < total {
            blocks.push(BasicBlock::new(tu.new_basic_block_id(), scope, func));
        }
    }

    // Pass 3: connect.
    let ids: Vec<BasicBlockId> = blocks.iter().map(BasicBlock::id).collect();
    for block in blocks {
        cfg.add_block(block);
    }
    for (i, &id) in ids.iter().enumerate() {
        let block = cfg.block(id).expect("just added");
        if block.insn_count() == 0 {
            continue;
        }
        let last = block.exit_insn();
        if last.is_cond() {
            let (t, f) = last.labels();
            if let Some(&target) = label_block.get(&t) {
                cfg.connect(id, target);
            }
            if let Some(&target) = label_block.get(&f) {
                cfg.connect(id, target);
            }
        } else if last.is_goto() {
            if let Some(&target) = label_block.get(&last.labels().0) {
                cfg.connect(id, target);
            }
        } else if last.is_return() {
            // Terminal.
        } else if i + 1 < ids.len() {
            cfg.connect(id, ids[i + 1]);
        }
    }

    // Entry and exit.
    if let Some(&first) = ids.first() {
        cfg.set_entry(first);
        let exit = ids
            .iter()
            .rev()
            .find(|&&id| {
                cfg.block(id)
                    .is_some_and(|b| b.insn_count() > 0 && b.exit_insn().is_return())
            })
            .or(ids.last())
            .copied()
            .unwrap_or(BasicBlockId::NULL);
        cfg.set_exit(exit);
    }

    cfg
}
