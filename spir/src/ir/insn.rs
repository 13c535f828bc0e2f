//! Bit-packed 128-bit instructions.
//!
//! An instruction is two 64-bit halves. The first half carries the
//! instruction id in its high word and a 32-bit payload (an entity id of a
//! value expression, or a label) in its low word. The second half carries a
//! full 64-bit expression, or a pair of 32-bit labels for a conditional
//! branch (true target in the low word, false target in the high word).
//!
//! The instruction id embeds [`EntityKind::Insn`], the 5-bit instruction
//! kind as the sub-kind, and a 20-bit sequence id. Constructors stamp the
//! kind bits immediately so an un-appended instruction still knows what it
//! is; the sequence id is filled in by
//! [`TranslationUnit::add_insn`](super::TranslationUnit::add_insn).

use std::fmt;

use strum::{Display, FromRepr};

use crate::ir::expr::Expr;
use crate::ir::id::{
    EntityId, EntityKind, InsnId, LabelId, ENTITY_ID_MASK, KIND_SHIFT, SUB_KIND_SHIFT,
};

/// The kind of an instruction, a 5-bit tag stored in the id's sub-kind
/// field.
#[derive(Debug, Display, FromRepr, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InsnKind {
    /// No operation.
    Nop = 0,
    /// An optimization barrier.
    Barrier = 1,
    /// A label definition. Payload: the label id.
    Label = 2,
    /// An unconditional jump. Payload: the target label id.
    Goto = 3,
    /// A return. Payload: the returned value, or null for `void`.
    Return = 4,
    /// `lhs = rhs` with both sides simple values.
    AssignSimple = 5,
    /// `lhs = <op>` with a compound right-hand side.
    AssignRhsOp = 6,
    /// `<op> = rhs` with a compound left-hand side (deref, subscript,
    /// member).
    AssignLhsOp = 7,
    /// `lhs = call(...)`.
    AssignCall = 8,
    /// `lhs = phi(...)` with the phi operands in a side table.
    AssignPhi = 9,
    /// A call whose result is discarded.
    Call = 10,
    /// A two-way conditional branch on a simple value.
    Cond = 11,
}

impl InsnKind {
    /// Returns `true` for the assignment kinds.
    #[must_use]
    pub fn is_assign(self) -> bool {
        matches!(
            self,
            InsnKind::AssignSimple
                | InsnKind::AssignRhsOp
                | InsnKind::AssignLhsOp
                | InsnKind::AssignCall
                | InsnKind::AssignPhi
        )
    }
}

/// A 128-bit instruction.
///
/// Instructions are pure value objects; everything they reference lives in
/// the owning [`TranslationUnit`](super::TranslationUnit).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Insn {
    first: u64,
    second: u64,
}

impl Insn {
    /// A no-op.
    #[must_use]
    pub fn nop() -> Self {
        Insn::with_kind(InsnKind::Nop, 0, 0)
    }

    /// An optimization barrier.
    #[must_use]
    pub fn barrier() -> Self {
        Insn::with_kind(InsnKind::Barrier, 0, 0)
    }

    /// A label definition.
    #[must_use]
    pub fn label(label: LabelId) -> Self {
        Insn::with_kind(InsnKind::Label, label.raw(), 0)
    }

    /// An unconditional jump to `target`.
    #[must_use]
    pub fn goto(target: LabelId) -> Self {
        Insn::with_kind(InsnKind::Goto, target.raw(), 0)
    }

    /// A return of `value`; pass [`EntityId::NULL`] for a `void` return.
    #[must_use]
    pub fn ret(value: EntityId) -> Self {
        Insn::with_kind(InsnKind::Return, value.valid_bits(), 0)
    }

    /// `lhs = rhs` where both sides are plain values.
    #[must_use]
    pub fn assign_simple(lhs: EntityId, rhs: EntityId) -> Self {
        Insn::with_kind(InsnKind::AssignSimple, lhs.valid_bits(), Expr::val(rhs).raw())
    }

    /// `lhs = rhs` with a compound right-hand side.
    #[must_use]
    pub fn assign_rhs_op(lhs: EntityId, rhs: Expr) -> Self {
        debug_assert!(
            !rhs.is_simple() && !rhs.is_call(),
            "compound assignment needs an operator on the right"
        );
        Insn::with_kind(InsnKind::AssignRhsOp, lhs.valid_bits(), rhs.raw())
    }

    /// `lhs = rhs` with a compound left-hand side (the store target is an
    /// addressing expression) and a plain value on the right.
    #[must_use]
    pub fn assign_lhs_op(lhs: Expr, rhs: EntityId) -> Self {
        debug_assert!(
            !lhs.is_simple() && !lhs.is_call(),
            "compound store target needs an operator on the left"
        );
        Insn::with_kind(InsnKind::AssignLhsOp, rhs.valid_bits(), lhs.raw())
    }

    /// `lhs = call(...)`.
    #[must_use]
    pub fn assign_call(lhs: EntityId, call: Expr) -> Self {
        debug_assert!(call.is_call(), "right-hand side must be a call");
        Insn::with_kind(InsnKind::AssignCall, lhs.valid_bits(), call.raw())
    }

    /// `lhs = phi(...)`; the phi operands live in a side table.
    #[must_use]
    pub fn assign_phi(lhs: EntityId) -> Self {
        Insn::with_kind(InsnKind::AssignPhi, lhs.valid_bits(), 0)
    }

    /// A call whose result is discarded.
    #[must_use]
    pub fn call(call: Expr) -> Self {
        debug_assert!(call.is_call(), "instruction needs a call expression");
        Insn::with_kind(InsnKind::Call, 0, call.raw())
    }

    /// A conditional branch on the simple value `cond`.
    #[must_use]
    pub fn cond(cond: EntityId, true_target: LabelId, false_target: LabelId) -> Self {
        Insn::with_kind(
            InsnKind::Cond,
            cond.valid_bits(),
            u64::from(true_target.raw()) | (u64::from(false_target.raw()) << 32),
        )
    }

    fn with_kind(kind: InsnKind, payload: u32, second: u64) -> Self {
        let id = ((EntityKind::Insn as u32) << KIND_SHIFT) | (u32::from(kind as u8) << SUB_KIND_SHIFT);
        Insn {
            first: (u64::from(id) << 32) | u64::from(payload),
            second,
        }
    }

    /// The instruction id.
    ///
    /// Null-sequence until the instruction has been appended to a block via
    /// the translation unit.
    #[must_use]
    pub fn id(self) -> InsnId {
        InsnId(EntityId(((self.first >> 32) as u32) & ENTITY_ID_MASK))
    }

    /// The instruction kind, read from the id's sub-kind field.
    ///
    /// # Panics
    ///
    /// Panics on a hand-forged encoding whose sub-kind bits fall outside
    /// the instruction-kind set.
    #[must_use]
    pub fn kind(self) -> InsnKind {
        InsnKind::from_repr(self.id().entity().sub_kind()).expect("invalid instruction kind bits")
    }

    /// Stamps the allocated id into the first half, preserving the payload.
    pub(crate) fn stamp_id(&mut self, id: InsnId) {
        self.first = (u64::from(id.raw()) << 32) | (self.first & 0xFFFF_FFFF);
    }

    /// The allocation-pool prefix of this instruction's id.
    #[must_use]
    pub fn pool_prefix(self) -> u16 {
        EntityKind::Insn.pool_prefix(self.kind() as u8)
    }

    /// The raw 32-bit payload word.
    #[must_use]
    pub fn payload(self) -> u32 {
        (self.first & 0xFFFF_FFFF) as u32
    }

    /// The payload interpreted as an entity id (assignment targets, return
    /// values, branch conditions).
    #[must_use]
    pub fn payload_entity(self) -> EntityId {
        EntityId(self.payload())
    }

    /// The second half interpreted as an expression.
    #[must_use]
    pub fn rhs_expr(self) -> Expr {
        Expr::from_raw(self.second)
    }

    /// The raw second half.
    #[must_use]
    pub fn second_half(self) -> u64 {
        self.second
    }

    /// Returns `true` for a conditional branch.
    #[must_use]
    pub fn is_cond(self) -> bool {
        self.kind() == InsnKind::Cond
    }

    /// Returns `true` for an unconditional jump.
    #[must_use]
    pub fn is_goto(self) -> bool {
        self.kind() == InsnKind::Goto
    }

    /// Returns `true` for a label definition.
    #[must_use]
    pub fn is_label(self) -> bool {
        self.kind() == InsnKind::Label
    }

    /// Returns `true` for a return.
    #[must_use]
    pub fn is_return(self) -> bool {
        self.kind() == InsnKind::Return
    }

    /// Returns `true` for a bare call instruction.
    #[must_use]
    pub fn is_call(self) -> bool {
        self.kind() == InsnKind::Call
    }

    /// Returns `true` for any assignment.
    #[must_use]
    pub fn is_assign(self) -> bool {
        self.kind().is_assign()
    }

    /// Returns `true` when the instruction contains a call expression,
    /// either bare or on the right of an assignment.
    #[must_use]
    pub fn has_call_expr(self) -> bool {
        matches!(self.kind(), InsnKind::Call | InsnKind::AssignCall)
    }

    /// The labels of a branch instruction.
    ///
    /// For [`InsnKind::Cond`] both are meaningful (true target first); for
    /// [`InsnKind::Label`] and [`InsnKind::Goto`] only the first is.
    #[must_use]
    pub fn labels(self) -> (LabelId, LabelId) {
        match self.kind() {
            InsnKind::Cond => (
                LabelId(EntityId((self.second & 0xFFFF_FFFF) as u32)),
                LabelId(EntityId((self.second >> 32) as u32)),
            ),
            InsnKind::Label | InsnKind::Goto => {
                (LabelId(EntityId(self.payload())), LabelId::NULL)
            }
            _ => (LabelId::NULL, LabelId::NULL),
        }
    }
}

impl fmt::Debug for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Insn({}, id: {}, payload: 0x{:08x}, second: 0x{:016x})",
            self.kind(),
            self.id(),
            self.payload(),
            self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::ExprKind;
    use crate::ir::id::KIND_SHIFT as ID_KIND_SHIFT;

    fn var(seq: u32) -> EntityId {
        EntityId((EntityKind::Var as u32) << ID_KIND_SHIFT | seq)
    }

    fn label(seq: u32) -> LabelId {
        LabelId(EntityId((EntityKind::Label as u32) << ID_KIND_SHIFT | seq))
    }

    #[test]
    fn test_kind_survives_construction() {
        assert_eq!(Insn::nop().kind(), InsnKind::Nop);
        assert_eq!(Insn::barrier().kind(), InsnKind::Barrier);
        assert_eq!(Insn::ret(var(1)).kind(), InsnKind::Return);
        assert_eq!(Insn::assign_phi(var(1)).kind(), InsnKind::AssignPhi);
    }

    #[test]
    fn test_unstamped_id_has_zero_sequence() {
        let insn = Insn::assign_simple(var(1), var(2));
        assert_eq!(insn.id().entity().seq_id(), 0);
        assert_eq!(insn.id().entity().kind(), Some(EntityKind::Insn));
    }

    #[test]
    fn test_stamp_preserves_payload() {
        let mut insn = Insn::ret(var(7));
        let id = InsnId(EntityId(
            (EntityKind::Insn as u32) << ID_KIND_SHIFT
                | (InsnKind::Return as u32) << SUB_KIND_SHIFT
                | 99,
        ));
        insn.stamp_id(id);
        assert_eq!(insn.id(), id);
        assert_eq!(insn.kind(), InsnKind::Return);
        assert_eq!(insn.payload_entity(), var(7));
    }

    #[test]
    fn test_assign_simple_layout() {
        let insn = Insn::assign_simple(var(1), var(2));
        assert!(insn.is_assign());
        assert!(!insn.has_call_expr());
        assert_eq!(insn.payload_entity(), var(1));
        assert_eq!(insn.rhs_expr().kind(), ExprKind::Val);
        assert_eq!(insn.rhs_expr().operand1(), var(2));
    }

    #[test]
    fn test_assign_rhs_op_layout() {
        let rhs = Expr::binary(ExprKind::Add, var(2), var(3));
        let insn = Insn::assign_rhs_op(var(1), rhs);
        assert_eq!(insn.kind(), InsnKind::AssignRhsOp);
        assert_eq!(insn.payload_entity(), var(1));
        assert_eq!(insn.rhs_expr(), rhs);
    }

    #[test]
    fn test_assign_lhs_op_layout() {
        let target = Expr::unary(ExprKind::Deref, var(1));
        let insn = Insn::assign_lhs_op(target, var(2));
        assert_eq!(insn.kind(), InsnKind::AssignLhsOp);
        // The simple side rides in the payload, the compound side in the
        // second half.
        assert_eq!(insn.payload_entity(), var(2));
        assert_eq!(insn.rhs_expr(), target);
    }

    #[test]
    fn test_cond_labels() {
        let insn = Insn::cond(var(9), label(1), label(2));
        assert!(insn.is_cond());
        let (t, f) = insn.labels();
        assert_eq!(t, label(1));
        assert_eq!(f, label(2));
        assert_eq!(insn.payload_entity(), var(9));
    }

    #[test]
    fn test_goto_and_label() {
        let g = Insn::goto(label(3));
        assert!(g.is_goto());
        assert_eq!(g.labels().0, label(3));

        let l = Insn::label(label(3));
        assert!(l.is_label());
        assert_eq!(l.labels().0, label(3));
    }

    #[test]
    fn test_call_detection() {
        let callee = EntityId((EntityKind::Func as u32) << ID_KIND_SHIFT | 1);
        let bare = Insn::call(Expr::call0(callee));
        assert!(bare.is_call());
        assert!(bare.has_call_expr());

        let assigned = Insn::assign_call(var(1), Expr::call0(callee));
        assert!(!assigned.is_call());
        assert!(assigned.has_call_expr());
        assert!(assigned.is_assign());
    }

    #[test]
    fn test_pool_prefix_embeds_kind() {
        let insn = Insn::goto(label(1));
        assert_eq!(
            insn.pool_prefix(),
            (u16::from(EntityKind::Insn as u8) << 5) | u16::from(InsnKind::Goto as u8)
        );
    }
}
