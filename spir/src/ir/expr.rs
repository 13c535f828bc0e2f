//! Bit-packed 64-bit expressions.
//!
//! An expression is a tagged union encoded into a single word:
//!
//! | Bits  | Field |
//! |-------|-------|
//! | 63    | free marker bit, available to clients |
//! | 62-34 | operand 2, or a 29-bit call-site id |
//! | 33-29 | [`ExprKind`] (5 bits) |
//! | 28-0  | operand 1, or the callee entity id |
//!
//! Operands hold entity ids of expression-capable kinds, which by
//! construction fit in 29 bits (see
//! [`EntityKind::is_expression_capable`](super::EntityKind::is_expression_capable)).

use std::fmt;

use strum::{Display, FromRepr};

use crate::ir::id::{CallSiteId, EntityId, CALL_SITE_MASK};

const OPERAND_MASK: u64 = 0x1FFF_FFFF;
const KIND_SHIFT: u64 = 29;
const KIND_MASK: u64 = 0x1F << KIND_SHIFT;
const OPERAND2_SHIFT: u64 = 34;
const MARKER_BIT: u64 = 1 << 63;

/// The operator tag of an expression, a 5-bit value.
#[derive(Debug, Display, FromRepr, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExprKind {
    /// No operator: operand 1 is a variable, literal, or function.
    Val = 0,
    /// Arithmetic negation.
    Neg = 1,
    /// Logical not.
    Not = 2,
    /// Bitwise complement.
    BitNot = 3,
    /// Pointer dereference.
    Deref = 4,
    /// Address of.
    AddrOf = 5,
    /// `sizeof`.
    SizeOf = 6,
    /// `alignof`.
    AlignOf = 7,
    /// Type cast.
    Cast = 8,
    /// Addition.
    Add = 9,
    /// Subtraction.
    Sub = 10,
    /// Multiplication.
    Mul = 11,
    /// Division.
    Div = 12,
    /// Modulo.
    Mod = 13,
    /// Bitwise and.
    And = 14,
    /// Bitwise or.
    Or = 15,
    /// Bitwise xor.
    Xor = 16,
    /// Shift left.
    Shl = 17,
    /// Shift right.
    Shr = 18,
    /// Less than.
    Lt = 19,
    /// Less than or equal.
    Le = 20,
    /// Greater than.
    Gt = 21,
    /// Greater than or equal.
    Ge = 22,
    /// Equal.
    Eq = 23,
    /// Not equal.
    Ne = 24,
    /// Array subscript.
    ArraySubscript = 25,
    /// Member access (`.`).
    MemberAccess = 26,
    /// Member access through a pointer (`->`).
    MemberPtrAccess = 27,
    /// A call with no arguments.
    Call0 = 28,
    /// A call with one or more arguments, stored per call site.
    Call = 29,
}

impl ExprKind {
    /// Returns `true` for kinds taking exactly one operand (`Val` and the
    /// unary operators).
    #[must_use]
    pub fn is_single_operand(self) -> bool {
        (self as u8) <= ExprKind::Cast as u8
    }

    /// Returns `true` for the call kinds.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self, ExprKind::Call0 | ExprKind::Call)
    }

    /// Returns `true` for kinds taking two operands.
    #[must_use]
    pub fn is_two_operand(self) -> bool {
        !self.is_single_operand() && !self.is_call()
    }
}

/// A 64-bit tagged expression.
///
/// # Examples
///
/// ```
/// use spir::ir::{EntityId, Expr, ExprKind};
///
/// let x = EntityId::new(0x0200_0001);
/// let y = EntityId::new(0x0200_0002);
/// let sum = Expr::binary(ExprKind::Add, x, y);
/// assert_eq!(sum.kind(), ExprKind::Add);
/// assert_eq!(sum.operand1(), x);
/// assert_eq!(sum.operand2(), y);
/// assert!(sum.is_two_operand());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Expr(pub u64);

impl Expr {
    /// Creates an expression from its raw encoding.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Expr(raw)
    }

    /// Returns the raw 64-bit encoding.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// A value expression wrapping a single entity.
    #[must_use]
    pub fn val(entity: EntityId) -> Self {
        debug_assert!(fits_operand(entity), "operand does not fit 29 bits");
        Expr(u64::from(entity.valid_bits()) & OPERAND_MASK)
    }

    /// A unary expression over one operand.
    #[must_use]
    pub fn unary(kind: ExprKind, operand: EntityId) -> Self {
        debug_assert!(
            kind.is_single_operand() && kind != ExprKind::Val,
            "{kind} is not a unary operator"
        );
        debug_assert!(fits_operand(operand), "operand does not fit 29 bits");
        Expr(place_kind(kind) | (u64::from(operand.valid_bits()) & OPERAND_MASK))
    }

    /// A binary expression over two operands.
    #[must_use]
    pub fn binary(kind: ExprKind, operand1: EntityId, operand2: EntityId) -> Self {
        debug_assert!(kind.is_two_operand(), "{kind} is not a binary operator");
        debug_assert!(
            fits_operand(operand1) && fits_operand(operand2),
            "operand does not fit 29 bits"
        );
        Expr(
            ((u64::from(operand2.valid_bits()) & OPERAND_MASK) << OPERAND2_SHIFT)
                | place_kind(kind)
                | (u64::from(operand1.valid_bits()) & OPERAND_MASK),
        )
    }

    /// A no-argument call of `callee`.
    #[must_use]
    pub fn call0(callee: EntityId) -> Self {
        debug_assert!(fits_operand(callee), "callee does not fit 29 bits");
        Expr(place_kind(ExprKind::Call0) | (u64::from(callee.valid_bits()) & OPERAND_MASK))
    }

    /// A call of `callee` whose arguments live in the translation unit's
    /// call-argument table under `call_site`.
    #[must_use]
    pub fn call(callee: EntityId, call_site: CallSiteId) -> Self {
        debug_assert!(fits_operand(callee), "callee does not fit 29 bits");
        Expr(
            (u64::from(call_site.0 & CALL_SITE_MASK) << OPERAND2_SHIFT)
                | place_kind(ExprKind::Call)
                | (u64::from(callee.valid_bits()) & OPERAND_MASK),
        )
    }

    /// The operator tag.
    ///
    /// # Panics
    ///
    /// Panics if the kind field holds a value outside the closed kind set,
    /// which can only happen for hand-forged raw encodings.
    #[must_use]
    pub fn kind(self) -> ExprKind {
        ExprKind::from_repr(((self.0 & KIND_MASK) >> KIND_SHIFT) as u8)
            .expect("invalid expression kind bits")
    }

    /// Returns `true` for a plain value expression.
    #[must_use]
    pub fn is_simple(self) -> bool {
        self.kind() == ExprKind::Val
    }

    /// Returns `true` for a call expression.
    #[must_use]
    pub fn is_call(self) -> bool {
        self.kind().is_call()
    }

    /// Returns `true` for single-operand expressions.
    #[must_use]
    pub fn is_single_operand(self) -> bool {
        self.kind().is_single_operand()
    }

    /// Returns `true` for two-operand expressions.
    #[must_use]
    pub fn is_two_operand(self) -> bool {
        self.kind().is_two_operand()
    }

    /// The first operand.
    #[must_use]
    pub fn operand1(self) -> EntityId {
        EntityId((self.0 & OPERAND_MASK) as u32)
    }

    /// The second operand.
    #[must_use]
    pub fn operand2(self) -> EntityId {
        EntityId(((self.0 >> OPERAND2_SHIFT) & OPERAND_MASK) as u32)
    }

    /// The callee of a call expression.
    #[must_use]
    pub fn callee(self) -> EntityId {
        debug_assert!(self.is_call(), "callee of a non-call expression");
        self.operand1()
    }

    /// The call-site id of a [`ExprKind::Call`] expression.
    #[must_use]
    pub fn call_site_id(self) -> CallSiteId {
        debug_assert!(self.kind() == ExprKind::Call, "expression has no call site");
        CallSiteId(((self.0 >> OPERAND2_SHIFT) & u64::from(CALL_SITE_MASK)) as u32)
    }

    /// Reads the free marker bit.
    #[must_use]
    pub fn marker(self) -> bool {
        self.0 & MARKER_BIT != 0
    }

    /// Returns a copy with the free marker bit set or cleared.
    #[must_use]
    pub fn with_marker(self, set: bool) -> Self {
        if set {
            Expr(self.0 | MARKER_BIT)
        } else {
            Expr(self.0 & !MARKER_BIT)
        }
    }
}

fn place_kind(kind: ExprKind) -> u64 {
    u64::from(kind as u8) << KIND_SHIFT
}

fn fits_operand(entity: EntityId) -> bool {
    u64::from(entity.valid_bits()) & !OPERAND_MASK == 0
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expr({}, op1: {}, op2: {})",
            self.kind(),
            self.operand1(),
            self.operand2()
        )
    }
}
