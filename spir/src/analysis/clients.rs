//! Trivial built-in analysis clients.
//!
//! [`ForwardBotBot`] and [`BackwardBotBot`] push the bottom value through
//! every instruction; they exist to exercise the driver and serve as the
//! smallest possible worked examples of the [`Analysis`] contract.
//! [`ConstPropagation`] is a small constant-propagation client over the
//! keyed map lattice, with per-variable values supplied through the
//! extension handle.

use std::any::Any;
use std::sync::Arc;

use crate::analysis::change::ChangeKind;
use crate::analysis::lattice::{self, ExtLattice, Fact, FactPair, KvFact};
use crate::analysis::{Analysis, InstanceId, VisitingOrder};
use crate::ir::{Context, EntityId, ExprKind, Graph, Insn, InsnKind};

/// A forward analysis that copies the IN fact to the OUT fact.
///
/// With the `(Bot, Top)` boundary this floods the graph with bottom.
#[derive(Debug, Default)]
pub struct ForwardBotBot {
    id: InstanceId,
}

impl ForwardBotBot {
    /// Creates the client.
    #[must_use]
    pub fn new() -> Self {
        ForwardBotBot::default()
    }
}

impl Analysis for ForwardBotBot {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn set_instance_id(&mut self, id: InstanceId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        "forward-botbot"
    }

    fn boundary_fact(&self, _graph: &dyn Graph, _context: &Context<'_>) -> FactPair {
        FactPair::new(Some(Fact::bot()), Some(Fact::top()))
    }

    fn transfer(
        &self,
        _insn: Insn,
        inout: &FactPair,
        _context: &Context<'_>,
    ) -> (FactPair, ChangeKind) {
        let change = if lattice::equals(inout.l1.as_ref(), inout.l2.as_ref()) {
            ChangeKind::NoChange
        } else {
            // The instruction itself is a no-op for this lattice.
            ChangeKind::NopOutChanged
        };
        (FactPair::new(inout.l1.clone(), inout.l1.clone()), change)
    }
}

/// A backward analysis that copies the OUT fact to the IN fact.
#[derive(Debug, Default)]
pub struct BackwardBotBot {
    id: InstanceId,
}

impl BackwardBotBot {
    /// Creates the client.
    #[must_use]
    pub fn new() -> Self {
        BackwardBotBot::default()
    }
}

impl Analysis for BackwardBotBot {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn set_instance_id(&mut self, id: InstanceId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        "backward-botbot"
    }

    fn visiting_order(&self) -> VisitingOrder {
        VisitingOrder::PostOrder
    }

    fn boundary_fact(&self, _graph: &dyn Graph, _context: &Context<'_>) -> FactPair {
        FactPair::new(Some(Fact::top()), Some(Fact::bot()))
    }

    fn transfer(
        &self,
        _insn: Insn,
        inout: &FactPair,
        _context: &Context<'_>,
    ) -> (FactPair, ChangeKind) {
        let change = if lattice::equals(inout.l1.as_ref(), inout.l2.as_ref()) {
            ChangeKind::NoChange
        } else {
            ChangeKind::OnlyInChanged
        };
        (FactPair::new(inout.l2.clone(), inout.l2.clone()), change)
    }
}

/// The per-variable value of the constant-propagation lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstVal {
    /// Nothing is known yet.
    Unknown,
    /// The variable holds exactly this value.
    Known(u64),
    /// The variable holds different values on different paths.
    Conflict,
}

impl ExtLattice for ConstVal {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_top(&self) -> bool {
        matches!(self, ConstVal::Unknown)
    }

    fn is_bot(&self) -> bool {
        matches!(self, ConstVal::Conflict)
    }

    fn equals(&self, other: &dyn ExtLattice) -> bool {
        other
            .as_any()
            .downcast_ref::<ConstVal>()
            .is_some_and(|o| self == o)
    }

    fn weaker_than(&self, other: &dyn ExtLattice) -> bool {
        let Some(other) = other.as_any().downcast_ref::<ConstVal>() else {
            return false;
        };
        self == other || self.is_bot() || other.is_top()
    }

    fn meet(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool) {
        let other = other
            .as_any()
            .downcast_ref::<ConstVal>()
            .copied()
            .unwrap_or(ConstVal::Conflict);
        let result = match (*self, other) {
            (x, ConstVal::Unknown) => x,
            (ConstVal::Unknown, y) => y,
            (x, y) if x == y => x,
            _ => ConstVal::Conflict,
        };
        (Arc::new(result), result != *self)
    }

    fn join(&self, other: &dyn ExtLattice) -> (Arc<dyn ExtLattice>, bool) {
        let other = other
            .as_any()
            .downcast_ref::<ConstVal>()
            .copied()
            .unwrap_or(ConstVal::Unknown);
        let result = match (*self, other) {
            (x, ConstVal::Conflict) => x,
            (ConstVal::Conflict, y) => y,
            (x, y) if x == y => x,
            _ => ConstVal::Unknown,
        };
        (Arc::new(result), result != *self)
    }

    fn stringify(&self) -> String {
        match self {
            ConstVal::Unknown => "?".to_string(),
            ConstVal::Known(v) => v.to_string(),
            ConstVal::Conflict => "!".to_string(),
        }
    }
}

/// Forward constant propagation over the keyed map lattice.
///
/// Tracks which variables hold a single known constant. Simple and
/// operator assignments are evaluated; calls, phis and stores through
/// addressing expressions push the target to [`ConstVal::Conflict`].
#[derive(Debug, Default)]
pub struct ConstPropagation {
    id: InstanceId,
}

impl ConstPropagation {
    /// Creates the client.
    #[must_use]
    pub fn new() -> Self {
        ConstPropagation::default()
    }

    /// The abstract value of an operand under `map`.
    fn eval_operand(entity: EntityId, map: &KvFact, context: &Context<'_>) -> ConstVal {
        if entity.is_null() {
            return ConstVal::Unknown;
        }
        if entity.is_literal() {
            return match context.unit().literal_value(entity) {
                Some(value) => ConstVal::Known(value),
                None => ConstVal::Conflict,
            };
        }
        if entity.is_variable() {
            return match map.get(u64::from(entity.raw())) {
                Some(Fact::Ext(ext)) => ext
                    .as_any()
                    .downcast_ref::<ConstVal>()
                    .copied()
                    .unwrap_or(ConstVal::Conflict),
                Some(_) => ConstVal::Conflict,
                None => ConstVal::Unknown,
            };
        }
        ConstVal::Conflict
    }

    /// Folds an operator expression when every operand is known.
    fn eval_expr(insn: Insn, map: &KvFact, context: &Context<'_>) -> ConstVal {
        let expr = insn.rhs_expr();
        let op1 = Self::eval_operand(expr.operand1(), map, context);
        if expr.is_simple() {
            return op1;
        }
        if !expr.is_two_operand() {
            return ConstVal::Conflict;
        }
        let op2 = Self::eval_operand(expr.operand2(), map, context);
        let (ConstVal::Known(a), ConstVal::Known(b)) = (op1, op2) else {
            return ConstVal::Conflict;
        };
        match expr.kind() {
            ExprKind::Add => ConstVal::Known(a.wrapping_add(b)),
            ExprKind::Sub => ConstVal::Known(a.wrapping_sub(b)),
            ExprKind::Mul => ConstVal::Known(a.wrapping_mul(b)),
            ExprKind::Lt => ConstVal::Known(u64::from(a < b)),
            ExprKind::Eq => ConstVal::Known(u64::from(a == b)),
            _ => ConstVal::Conflict,
        }
    }
}

impl Analysis for ConstPropagation {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn set_instance_id(&mut self, id: InstanceId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        "const-prop"
    }

    fn boundary_fact(&self, _graph: &dyn Graph, _context: &Context<'_>) -> FactPair {
        FactPair::new(Some(Fact::Map(KvFact::new())), None)
    }

    fn transfer(
        &self,
        insn: Insn,
        inout: &FactPair,
        context: &Context<'_>,
    ) -> (FactPair, ChangeKind) {
        let in_map = match inout.l1.as_ref() {
            Some(Fact::Map(map)) => map.clone(),
            _ => KvFact::new(),
        };
        let mut out = in_map.clone();

        match insn.kind() {
            InsnKind::AssignSimple | InsnKind::AssignRhsOp => {
                let lhs = insn.payload_entity();
                let value = Self::eval_expr(insn, &in_map, context);
                out.set(u64::from(lhs.raw()), Fact::ext(value), true);
            }
            InsnKind::AssignCall | InsnKind::AssignPhi => {
                let lhs = insn.payload_entity();
                out.set(u64::from(lhs.raw()), Fact::ext(ConstVal::Conflict), true);
            }
            // Stores through addressing expressions, bare calls and control
            // flow leave the tracked variables alone.
            _ => {}
        }

        let out = Fact::Map(out);
        let change = if lattice::equals(inout.l2.as_ref(), Some(&out)) {
            ChangeKind::NoChange
        } else {
            ChangeKind::OnlyOutChanged
        };
        (
            FactPair::new(inout.l1.clone(), Some(out)),
            change,
        )
    }
}
