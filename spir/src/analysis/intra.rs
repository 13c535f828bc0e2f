//! The intra-procedural worklist analyzer.
//!
//! The driver seeds the boundary facts, then pops basic blocks off the
//! worklist and walks their instructions, applying the client's transfer
//! function and propagating changed facts to neighboring instructions and
//! blocks until nothing changes.
//!
//! The worklist is LIFO over the graph's initial traversal order: the
//! post-order sequence popped from the top yields reverse-post-order
//! visitation for forward analyses, and symmetrically for backward ones.
//! Termination rests on the client's lattice having finite height, or on
//! the client widening inside loops.

use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::analysis::change::ChangeKind;
use crate::analysis::lattice::{self, Fact, FactPair};
use crate::analysis::{Analysis, InstanceId, VisitingOrder};
use crate::ir::{
    reverse_post_order, BasicBlock, BasicBlockId, Context, ContextId, Graph, InsnId,
};

/// The per-run fact storage: a pair of lattice values per instruction.
pub type FactMap = FxHashMap<InsnId, FactPair>;

/// A fixed-capacity LIFO worklist of basic blocks.
///
/// Created over the graph's traversal order; capacity equals the number of
/// reachable blocks. A push is refused when the block is already pending
/// (at or below the top of the stack) or when the list is full, so no block
/// is ever pending twice.
#[derive(Debug)]
pub struct Worklist {
    items: Vec<BasicBlockId>,
    top: isize,
}

impl Worklist {
    /// Builds the worklist for `graph` in the given visiting order.
    #[must_use]
    pub fn new(graph: &dyn Graph, order: VisitingOrder) -> Self {
        // Forward visitation pops reverse post-order off a post-order
        // vector; backward pops post-order off a reverse-post-order vector.
        let items = reverse_post_order(graph, order == VisitingOrder::PostOrder);
        let top = items.len() as isize - 1;
        Worklist { items, top }
    }

    /// Pops the most recently pushed block.
    pub fn pop(&mut self) -> Option<BasicBlockId> {
        if self.top < 0 {
            return None;
        }
        let id = self.items[self.top as usize];
        self.top -= 1;
        Some(id)
    }

    /// Pushes a block for revisiting.
    ///
    /// Returns `false` when the block is already pending or the list is
    /// full.
    pub fn push(&mut self, id: BasicBlockId) -> bool {
        let next = self.top + 1;
        if next >= self.items.len() as isize {
            return false;
        }
        if self.top >= 0 && self.items[..=self.top as usize].contains(&id) {
            return false;
        }
        self.items[next as usize] = id;
        self.top = next;
        true
    }

    /// Returns `true` when no blocks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top < 0
    }

    /// Number of pending blocks.
    #[must_use]
    pub fn pending(&self) -> usize {
        (self.top + 1).max(0) as usize
    }
}

/// Policy knobs for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzerOptions {
    /// Treat call instructions as identity transfers, bypassing the
    /// client.
    pub skip_calls: bool,
    /// Combine incoming facts only at block boundaries instead of
    /// overwriting along single edges.
    pub meet_at_basic_block: bool,
}

/// Drives a client analysis to fixpoint over one graph.
///
/// # Examples
///
/// ```
/// use spir::analysis::clients::ForwardBotBot;
/// use spir::analysis::IntraAnalyzer;
/// use spir::ir::{next_context_id, sample, Context};
///
/// let tu = sample::unit_straight_line();
/// let mut ctx = Context::new(&tu);
/// let graph = tu.function_by_name("main").unwrap().body_graph().unwrap();
///
/// let ctx_id = next_context_id();
/// let mut analyzer = IntraAnalyzer::new(ctx_id, ForwardBotBot::new(), graph, &mut ctx);
/// analyzer.analyze_graph();
/// ```
pub struct IntraAnalyzer<'a, 'tu, A: Analysis> {
    ctx_id: ContextId,
    analysis: A,
    graph: &'a dyn Graph,
    context: &'a mut Context<'tu>,
    worklist: Worklist,
    options: AnalyzerOptions,
}

impl<'a, 'tu, A: Analysis> IntraAnalyzer<'a, 'tu, A> {
    /// Creates an analyzer with default options.
    pub fn new(
        ctx_id: ContextId,
        analysis: A,
        graph: &'a dyn Graph,
        context: &'a mut Context<'tu>,
    ) -> Self {
        Self::with_options(ctx_id, analysis, graph, context, AnalyzerOptions::default())
    }

    /// Creates an analyzer with explicit options.
    pub fn with_options(
        ctx_id: ContextId,
        mut analysis: A,
        graph: &'a dyn Graph,
        context: &'a mut Context<'tu>,
        options: AnalyzerOptions,
    ) -> Self {
        analysis.set_instance_id(InstanceId::new(graph.func_id().raw(), ctx_id.0));
        let worklist = Worklist::new(graph, analysis.visiting_order());
        IntraAnalyzer {
            ctx_id,
            analysis,
            graph,
            context,
            worklist,
            options,
        }
    }

    /// The context id this run stores its facts under.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.ctx_id
    }

    /// The client analysis.
    #[must_use]
    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// The graph under analysis.
    #[must_use]
    pub fn graph(&self) -> &dyn Graph {
        self.graph
    }

    /// The fact map computed so far, if the run has been seeded.
    #[must_use]
    pub fn fact_map(&self) -> Option<&FactMap> {
        self.context.get_info(self.ctx_id)?.downcast_ref()
    }

    /// Runs the analysis to fixpoint.
    ///
    /// Re-running on a context that already holds facts for this context id
    /// continues from those facts; on a stable fact map the worklist drains
    /// without further change.
    pub fn analyze_graph(&mut self) {
        self.seed_boundary();
        info!(
            "analyzing graph: ctx_id={} analysis={} func={}",
            self.ctx_id.0,
            self.analysis.name(),
            self.graph.func_id()
        );

        // Own the fact map for the duration of the run; the context gets it
        // back when the worklist drains.
        let mut fact_map = self
            .context
            .take_info(self.ctx_id)
            .and_then(|boxed| boxed.downcast::<FactMap>().ok())
            .map_or_else(FactMap::default, |boxed| *boxed);

        let backward = self.analysis.visiting_order() == VisitingOrder::PostOrder;
        let graph = self.graph;
        while let Some(bb_id) = self.worklist.pop() {
            let Some(bb) = graph.block(bb_id) else {
                continue;
            };
            debug!("visiting block {bb_id}");
            if backward {
                for idx in (0..bb.insn_count()).rev() {
                    self.step(bb, idx, &mut fact_map);
                }
            } else {
                for idx in 0..bb.insn_count() {
                    self.step(bb, idx, &mut fact_map);
                }
            }
        }

        self.context.set_info(self.ctx_id, Box::new(fact_map));
    }

    /// Stores the boundary facts on the graph's entry and exit
    /// instructions, once per context id.
    fn seed_boundary(&mut self) {
        if self.context.get_info(self.ctx_id).is_some() {
            return;
        }
        let boundary = self.analysis.boundary_fact(self.graph, self.context);
        let mut fact_map = FactMap::default();
        if let Some(entry) = self.graph.block(self.graph.entry_block_id()) {
            if entry.insn_count() > 0 {
                fact_map.entry(entry.entry_insn_id()).or_default().l1 = boundary.l1.clone();
            }
        }
        if let Some(exit) = self.graph.block(self.graph.exit_block_id()) {
            if exit.insn_count() > 0 {
                fact_map.entry(exit.exit_insn_id()).or_default().l2 = boundary.l2;
            }
        }
        self.context.set_info(self.ctx_id, Box::new(fact_map));
    }

    /// The per-instruction step: transfer, store, propagate.
    fn step(&mut self, bb: &BasicBlock, idx: usize, fact_map: &mut FactMap) {
        let insn = bb.insn(idx);
        let inout = fact_map.get(&insn.id()).cloned().unwrap_or_default();

        let (inout, change) =
            if self.options.skip_calls && (insn.is_call() || insn.has_call_expr()) {
                self.identity_transfer(&inout)
            } else {
                self.analysis.transfer(insn, &inout, self.context)
            };
        debug!("insn {}: out={} change={change}", insn.id(), inout);

        fact_map.insert(insn.id(), inout.clone());

        // A kind reporting both sides changed propagates in both
        // directions.
        if change.has_changed_in() {
            self.propagate_backward(bb, idx, &inout, fact_map);
        }
        if change.has_changed_out() {
            self.propagate_forward(bb, idx, &inout, fact_map);
        }
    }

    /// The identity transfer applied to calls under `skip_calls`.
    fn identity_transfer(&self, inout: &FactPair) -> (FactPair, ChangeKind) {
        let differs = !lattice::equals(inout.l1.as_ref(), inout.l2.as_ref());
        match self.analysis.visiting_order() {
            VisitingOrder::ReversePostOrder => {
                let change = if differs {
                    ChangeKind::NopOutChanged
                } else {
                    ChangeKind::NopNoChange
                };
                (FactPair::new(inout.l1.clone(), inout.l1.clone()), change)
            }
            VisitingOrder::PostOrder => {
                let change = if differs {
                    ChangeKind::NopInChanged
                } else {
                    ChangeKind::NopNoChange
                };
                (FactPair::new(inout.l2.clone(), inout.l2.clone()), change)
            }
        }
    }

    /// Pushes a changed OUT fact toward the following instruction or the
    /// successor blocks.
    fn propagate_forward(&mut self, bb: &BasicBlock, idx: usize, inout: &FactPair, fact_map: &mut FactMap) {
        // Within the block, facts flow along the single intra-block edge
        // and overwrite.
        if !bb.is_last_index(idx) {
            let next_id = bb.insn(idx + 1).id();
            fact_map.entry(next_id).or_default().l1 = inout.l2.clone();
            return;
        }

        // The OUT fact of a two-successor block may be a branch pair; when
        // it is not, both edges carry the same fact.
        let mut true_fact = inout.l2.clone();
        let mut false_fact = inout.l2.clone();
        if bb.false_succ().is_some() {
            if let Some(branch) = inout.l2.as_ref().and_then(Fact::as_pair) {
                true_fact = branch.l1.clone();
                false_fact = branch.l2.clone();
            }
        }

        if let Some(false_id) = bb.false_succ() {
            self.flow_into_successor(false_id, false_fact, false, fact_map);
        }
        if let Some(true_id) = bb.true_succ() {
            self.flow_into_successor(true_id, true_fact, true, fact_map);
        }
    }

    /// Writes an edge fact into a successor's entry instruction and pushes
    /// the successor when the fact moved.
    fn flow_into_successor(
        &mut self,
        succ_id: BasicBlockId,
        edge_fact: Option<Fact>,
        true_edge: bool,
        fact_map: &mut FactMap,
    ) {
        let Some(succ) = self.graph.block(succ_id) else {
            return;
        };
        if succ.insn_count() == 0 {
            return;
        }
        let entry_id = succ.entry_insn_id();
        // Merges (a true successor with several predecessors) always meet,
        // no matter the knob; overwriting there would lose a path.
        let must_meet = self.options.meet_at_basic_block
            || (true_edge && succ.pred_count() > 1);
        let entry = fact_map.entry(entry_id).or_default();
        let (val, changed) = if must_meet {
            lattice::meet(entry.l1.as_ref(), edge_fact.as_ref())
        } else {
            (edge_fact, true)
        };
        entry.l1 = val;
        if changed {
            self.worklist.push(succ_id);
        }
    }

    /// Pushes a changed IN fact toward the preceding instruction or the
    /// predecessor blocks.
    fn propagate_backward(&mut self, bb: &BasicBlock, idx: usize, inout: &FactPair, fact_map: &mut FactMap) {
        if idx != 0 {
            let prev_id = bb.insn(idx - 1).id();
            fact_map.entry(prev_id).or_default().l2 = inout.l2.clone();
            return;
        }

        for i in 0..bb.pred_count() {
            let pred_id = bb.pred(i);
            let Some(pred) = self.graph.block(pred_id) else {
                continue;
            };
            if pred.insn_count() == 0 {
                continue;
            }
            let pred_exit = pred.exit_insn_id();
            let pos = pred.succ_pos(bb.id()).unwrap_or(0);
            let cur = fact_map.get(&pred_exit).cloned().unwrap_or_default();

            let old = pred_out_fact(pred, &cur, pos);
            let (val, changed) = if self.options.meet_at_basic_block {
                lattice::meet(old.as_ref(), inout.l1.as_ref())
            } else {
                (inout.l1.clone(), true)
            };
            fact_map.insert(pred_exit, set_pred_out_fact(pred, cur, pos, val));
            if changed {
                self.worklist.push(pred_id);
            }
        }
    }
}

/// Reads the OUT fact a predecessor sends down the edge at `pos`.
///
/// For a two-successor predecessor the stored OUT fact is a branch pair and
/// the selected component is returned.
///
/// # Panics
///
/// Panics when a two-successor predecessor stores a non-pair OUT fact;
/// that is a client bug.
fn pred_out_fact(pred: &BasicBlock, inout: &FactPair, pos: usize) -> Option<Fact> {
    if pred.succ_count() > 1 {
        match inout.l2.as_ref() {
            Some(fact) => {
                let branch = fact.expect_pair();
                if pos == 0 {
                    branch.l1.clone()
                } else {
                    branch.l2.clone()
                }
            }
            None => None,
        }
    } else {
        inout.l2.clone()
    }
}

/// Writes `val` as the OUT fact a predecessor sends down the edge at
/// `pos`, preserving the other component of a branch pair.
fn set_pred_out_fact(
    pred: &BasicBlock,
    inout: FactPair,
    pos: usize,
    val: Option<Fact>,
) -> FactPair {
    if pred.succ_count() <= 1 {
        return FactPair::new(inout.l1, val);
    }
    let mut branch = match inout.l2 {
        Some(Fact::Pair(pair)) => *pair,
        None => FactPair::default(),
        Some(other) => panic!("branch out fact is not a lattice pair: {other}"),
    };
    if pos == 0 {
        branch.l1 = val;
    } else {
        branch.l2 = val;
    }
    FactPair::new(inout.l1, Some(Fact::pair(branch)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{sample, Graph};

    fn main_graph(tu: &crate::ir::TranslationUnit) -> &dyn Graph {
        tu.function_by_name("main")
            .expect("main exists")
            .body_graph()
            .expect("main has a body")
    }

    #[test]
    fn test_worklist_pops_in_visit_order() {
        let tu = sample::unit_branching();
        let graph = main_graph(&tu);
        let mut wl = Worklist::new(graph, VisitingOrder::ReversePostOrder);

        let rpo = reverse_post_order(graph, true);
        let mut popped = Vec::new();
        while let Some(id) = wl.pop() {
            popped.push(id);
        }
        assert_eq!(popped, rpo, "forward pops follow reverse post-order");
    }

    #[test]
    fn test_worklist_rejects_pending_duplicates() {
        let tu = sample::unit_branching();
        let graph = main_graph(&tu);
        let mut wl = Worklist::new(graph, VisitingOrder::ReversePostOrder);

        let first = wl.pop().expect("non-empty");
        // Everything left is pending, so pushing a pending block fails.
        let pending = wl.pending();
        let some_pending = reverse_post_order(graph, true)[1];
        assert!(!wl.push(some_pending));
        assert_eq!(wl.pending(), pending);

        // The popped block can be re-queued once.
        assert!(wl.push(first));
        assert!(!wl.push(first), "now pending again");
    }

    #[test]
    fn test_worklist_drains() {
        let tu = sample::unit_straight_line();
        let graph = main_graph(&tu);
        let mut wl = Worklist::new(graph, VisitingOrder::PostOrder);
        assert!(!wl.is_empty());
        assert_eq!(wl.pending(), 1);
        assert!(wl.pop().is_some());
        assert!(wl.is_empty());
        assert!(wl.pop().is_none());
    }
}
