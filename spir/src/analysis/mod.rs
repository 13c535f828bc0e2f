//! The analysis framework: lattices, change kinds, the client contract,
//! and the intra-procedural fixpoint driver.
//!
//! A client supplies an [`Analysis`]: a lattice of abstract values and a
//! per-instruction transfer function. The [`IntraAnalyzer`] drives it to
//! fixpoint over a function's control-flow graph, storing a pair of facts
//! per instruction in the analysis context.

pub mod change;
pub mod clients;
pub mod intra;
pub mod lattice;

use std::fmt;

use crate::ir::{Context, ControlFlowGraph, Graph, Insn};

pub use change::ChangeKind;
pub use intra::{AnalyzerOptions, FactMap, IntraAnalyzer, Worklist};
pub use lattice::{ExtLattice, Fact, FactPair, KvFact, TopBot};

/// The order in which the driver visits basic blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitingOrder {
    /// Reverse post-order, for forward flow.
    #[default]
    ReversePostOrder,
    /// Post-order, for backward flow.
    PostOrder,
}

/// Identifies one analysis instance on one function.
///
/// The high 32 bits carry the function's entity id, the low 32 bits a
/// per-function instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Combines a function id and an instance number.
    #[must_use]
    pub fn new(func: u32, instance: u32) -> Self {
        InstanceId((u64::from(func) << 32) | u64::from(instance))
    }

    /// The function's entity id bits.
    #[must_use]
    pub fn func(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The per-function instance number.
    #[must_use]
    pub fn instance(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alternative reductions of a statement a client may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtViewKind {
    /// `x = RHS` viewed as `x = Top`.
    DeadAssignment,
    /// `*x = RHS` viewed as `{a = RHS, b = RHS, ...}` under a points-to
    /// fact, and symmetrically for loads.
    Dereferenced,
    /// `x = y` viewed as `{x = 10, x = 11, ...}`.
    Constant,
    /// `if (x)` viewed as `if (true)` or `if (false)`.
    Condition,
}

/// A client analysis.
///
/// The driver calls [`boundary_fact`](Analysis::boundary_fact) once to seed
/// the entry and exit instructions, then applies
/// [`transfer`](Analysis::transfer) per instruction until the worklist
/// drains. Transfer functions must respect the read/write shape of each
/// instruction kind and may read any entity through the translation unit on
/// the context; they never write the fact map themselves.
pub trait Analysis {
    /// This instance's identifier.
    fn instance_id(&self) -> InstanceId;

    /// Stores the instance identifier; called by the driver.
    fn set_instance_id(&mut self, id: InstanceId);

    /// A human-readable label used in logs.
    fn name(&self) -> &str;

    /// The visiting order; forward analyses keep the default.
    fn visiting_order(&self) -> VisitingOrder {
        VisitingOrder::ReversePostOrder
    }

    /// The initial IN/OUT facts for the graph's boundary instructions.
    fn boundary_fact(&self, graph: &dyn Graph, context: &Context<'_>) -> FactPair;

    /// The transfer function.
    ///
    /// Receives the instruction and its current fact pair; returns the new
    /// pair and a classification of what changed relative to the input.
    fn transfer(
        &self,
        insn: Insn,
        inout: &FactPair,
        context: &Context<'_>,
    ) -> (FactPair, ChangeKind);

    /// Optional: alternative reductions of `insn` under the current facts.
    ///
    /// The core driver never calls this; engines doing statement-level
    /// refinement do. The default produces nothing.
    fn stmt_view(
        &self,
        _insn: Insn,
        _inout: &FactPair,
        _view: StmtViewKind,
        _context: &Context<'_>,
    ) -> Option<Vec<Insn>> {
        None
    }

    /// Optional: a mini-CFG refining `insn` for fine-grained rewrites.
    ///
    /// The core driver never calls this. The default produces nothing.
    fn stmt_graph(
        &self,
        _insn: Insn,
        _inout: &FactPair,
        _context: &Context<'_>,
    ) -> Option<ControlFlowGraph> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_packing() {
        let id = InstanceId::new(0x0A00_0001, 7);
        assert_eq!(id.func(), 0x0A00_0001);
        assert_eq!(id.instance(), 7);
        assert_eq!(InstanceId::default().0, 0);
    }
}
