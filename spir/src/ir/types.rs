//! Value kinds, type qualifiers, and value-type descriptors.
//!
//! A value type carries four attributes: a 5-bit [`ValueKind`], a
//! [`Qualifiers`] bitset, a size and an alignment in bytes. Sizes and
//! alignments for primitives are derived from the kind (a 64-bit target is
//! assumed, so pointers are 8 bytes). Composite kinds add a pointee, member
//! map, signature, or element type.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use strum::{Display, FromRepr};

/// The kind of a value, a 5-bit tag.
///
/// The pointer kinds classify their pointee, so a bare kind already tells
/// an analysis what a pointer dereference may yield.
#[derive(Debug, Display, FromRepr, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueKind {
    /// The `void` type.
    #[default]
    Void = 0,
    /// A boolean.
    Bool = 1,
    /// A character.
    Char = 2,
    /// Signed 8-bit integer.
    Int8 = 3,
    /// Signed 16-bit integer.
    Int16 = 4,
    /// Signed 32-bit integer.
    Int32 = 5,
    /// Signed 64-bit integer.
    Int64 = 6,
    /// Unsigned 8-bit integer.
    UInt8 = 7,
    /// Unsigned 16-bit integer.
    UInt16 = 8,
    /// Unsigned 32-bit integer.
    UInt32 = 9,
    /// Unsigned 64-bit integer.
    UInt64 = 10,
    /// A signed bit-field of arbitrary width.
    NBits = 11,
    /// An unsigned bit-field of arbitrary width.
    NUBits = 12,
    /// Half-precision float.
    Float16 = 13,
    /// Single-precision float.
    Float32 = 14,
    /// Double-precision float.
    Float64 = 15,
    /// Pointer to `void`.
    PtrToVoid = 16,
    /// Pointer to pointer.
    PtrToPtr = 17,
    /// Pointer to an array.
    PtrToArray = 18,
    /// Pointer to a character.
    PtrToChar = 19,
    /// Pointer to an integer.
    PtrToInt = 20,
    /// Pointer to a float.
    PtrToFloat = 21,
    /// Pointer to a record.
    PtrToRecord = 22,
    /// Pointer to a function.
    PtrToFunc = 23,
    /// An array.
    Array = 24,
    /// A union.
    Union = 25,
    /// A struct.
    Struct = 26,
    /// Anything else.
    Other = 27,
}

impl ValueKind {
    /// Returns `true` for the integral kinds (bool through bit-fields).
    #[must_use]
    pub fn is_integer(self) -> bool {
        (self as u8) >= ValueKind::Bool as u8 && (self as u8) <= ValueKind::NUBits as u8
    }

    /// Returns `true` for the floating-point kinds.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(
            self,
            ValueKind::Float16 | ValueKind::Float32 | ValueKind::Float64
        )
    }

    /// Returns `true` for `void`.
    #[must_use]
    pub fn is_void(self) -> bool {
        self == ValueKind::Void
    }

    /// Returns `true` for the pointer kinds.
    #[must_use]
    pub fn is_pointer(self) -> bool {
        (self as u8) >= ValueKind::PtrToVoid as u8 && (self as u8) <= ValueKind::PtrToFunc as u8
    }

    /// Returns `true` for arrays.
    #[must_use]
    pub fn is_array(self) -> bool {
        self == ValueKind::Array
    }

    /// Returns `true` for records (struct or union).
    #[must_use]
    pub fn is_record(self) -> bool {
        matches!(self, ValueKind::Union | ValueKind::Struct)
    }

    /// The derived size in bytes, `0` when the size is not kind-derived.
    #[must_use]
    pub fn size_in_bytes(self) -> u32 {
        match self {
            ValueKind::Bool | ValueKind::Char | ValueKind::Int8 | ValueKind::UInt8 => 1,
            ValueKind::Int16 | ValueKind::UInt16 | ValueKind::Float16 => 2,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => 4,
            ValueKind::Int64 | ValueKind::UInt64 | ValueKind::Float64 => 8,
            _ if self.is_pointer() => 8,
            _ => 0,
        }
    }

    /// The derived alignment in bytes, `0` when not kind-derived.
    #[must_use]
    pub fn align_in_bytes(self) -> u8 {
        // Natural alignment on a 64-bit target.
        self.size_in_bytes().min(8) as u8
    }
}

bitflags! {
    /// Qualifier bits attached to a value type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u16 {
        /// `const`.
        const CONST = 1 << 0;
        /// The destination of an assignment is `const`.
        const CONST_DEST = 1 << 1;
        /// Function-local `static`.
        const FUNC_STATIC = 1 << 2;
        /// File-scope `static`.
        const GLOBAL_STATIC = 1 << 3;
        /// `volatile`.
        const VOLATILE = 1 << 4;
        /// Weak linkage.
        const WEAK = 1 << 5;
        /// Thread-local storage.
        const THREAD_LOCAL = 1 << 6;
        /// Declared without an initializer.
        const UNINITIALIZED = 1 << 7;
        /// `extern`.
        const EXTERNAL = 1 << 8;
    }
}

/// The size, alignment, kind and qualifiers shared by every value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicType {
    kind: ValueKind,
    quals: Qualifiers,
    size: u32,
    align: u8,
}

impl BasicType {
    /// Creates a descriptor with an explicit size and alignment.
    #[must_use]
    pub fn with_layout(kind: ValueKind, quals: Qualifiers, size: u32, align: u8) -> Self {
        BasicType {
            kind,
            quals,
            size,
            align,
        }
    }

    /// Creates a descriptor with the size and alignment derived from the
    /// kind.
    #[must_use]
    pub fn new(kind: ValueKind, quals: Qualifiers) -> Self {
        BasicType {
            kind,
            quals,
            size: kind.size_in_bytes(),
            align: kind.align_in_bytes(),
        }
    }
}

/// A complete value-type descriptor.
///
/// Primitives are a bare [`BasicType`]; the composite variants carry the
/// extra structure an analysis may need to walk.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    /// A primitive type.
    Basic(BasicType),
    /// A pointer and its pointee.
    Pointer {
        /// Kind/qualifier/layout attributes; the kind is one of the
        /// pointer kinds.
        base: BasicType,
        /// The pointed-to type.
        pointee: Box<ValueType>,
    },
    /// A struct or union with named members.
    Record {
        /// Kind/qualifier/layout attributes.
        base: BasicType,
        /// The member name to type map.
        members: FxHashMap<String, ValueType>,
    },
    /// A function signature.
    Func {
        /// Kind/qualifier/layout attributes.
        base: BasicType,
        /// The return type.
        return_type: Box<ValueType>,
        /// Parameter types in declaration order.
        params: Vec<ValueType>,
        /// Whether the function accepts variable arguments.
        var_args: bool,
    },
    /// An array of a fixed element count.
    Array {
        /// Kind/qualifier/layout attributes.
        base: BasicType,
        /// The element type.
        element: Box<ValueType>,
        /// Number of elements.
        len: u32,
    },
}

impl ValueType {
    /// A primitive type with derived layout.
    #[must_use]
    pub fn basic(kind: ValueKind, quals: Qualifiers) -> Self {
        ValueType::Basic(BasicType::new(kind, quals))
    }

    /// The unqualified `void` type.
    #[must_use]
    pub fn void() -> Self {
        ValueType::basic(ValueKind::Void, Qualifiers::empty())
    }

    /// The unqualified 32-bit signed integer type.
    #[must_use]
    pub fn int32() -> Self {
        ValueType::basic(ValueKind::Int32, Qualifiers::empty())
    }

    /// A pointer to `pointee`, classified by `kind`.
    #[must_use]
    pub fn pointer(kind: ValueKind, quals: Qualifiers, pointee: ValueType) -> Self {
        debug_assert!(kind.is_pointer(), "pointer types need a pointer kind");
        ValueType::Pointer {
            base: BasicType::new(kind, quals),
            pointee: Box::new(pointee),
        }
    }

    /// An array of `len` elements.
    #[must_use]
    pub fn array(quals: Qualifiers, element: ValueType, len: u32) -> Self {
        let elem_size = element.size();
        let align = element.align();
        ValueType::Array {
            base: BasicType::with_layout(ValueKind::Array, quals, elem_size * len, align),
            element: Box::new(element),
            len,
        }
    }

    /// A function signature type.
    #[must_use]
    pub fn func(return_type: ValueType, params: Vec<ValueType>, var_args: bool) -> Self {
        ValueType::Func {
            base: BasicType::with_layout(ValueKind::PtrToFunc, Qualifiers::empty(), 8, 8),
            return_type: Box::new(return_type),
            params,
            var_args,
        }
    }

    fn base(&self) -> &BasicType {
        match self {
            ValueType::Basic(base)
            | ValueType::Pointer { base, .. }
            | ValueType::Record { base, .. }
            | ValueType::Func { base, .. }
            | ValueType::Array { base, .. } => base,
        }
    }

    /// The 5-bit value kind.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        self.base().kind
    }

    /// The qualifier bits.
    #[must_use]
    pub fn qualifiers(&self) -> Qualifiers {
        self.base().quals
    }

    /// The size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.base().size
    }

    /// The alignment in bytes.
    #[must_use]
    pub fn align(&self) -> u8 {
        self.base().align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_layout() {
        assert_eq!(ValueKind::Int8.size_in_bytes(), 1);
        assert_eq!(ValueKind::Int16.size_in_bytes(), 2);
        assert_eq!(ValueKind::Int32.size_in_bytes(), 4);
        assert_eq!(ValueKind::Int64.size_in_bytes(), 8);
        assert_eq!(ValueKind::UInt32.align_in_bytes(), 4);
    }

    #[test]
    fn test_pointer_layout() {
        for kind in [
            ValueKind::PtrToVoid,
            ValueKind::PtrToChar,
            ValueKind::PtrToFunc,
        ] {
            assert_eq!(kind.size_in_bytes(), 8);
            assert_eq!(kind.align_in_bytes(), 8);
        }
    }

    #[test]
    fn test_float_and_void_layout() {
        assert_eq!(ValueKind::Float32.size_in_bytes(), 4);
        assert_eq!(ValueKind::Float64.size_in_bytes(), 8);
        assert_eq!(ValueKind::Void.size_in_bytes(), 0);
        assert_eq!(ValueKind::Void.align_in_bytes(), 0);
    }

    #[test]
    fn test_kind_classification() {
        assert!(ValueKind::Bool.is_integer());
        assert!(ValueKind::NUBits.is_integer());
        assert!(!ValueKind::Float32.is_integer());
        assert!(ValueKind::Float16.is_floating());
        assert!(ValueKind::PtrToRecord.is_pointer());
        assert!(!ValueKind::Array.is_pointer());
        assert!(ValueKind::Struct.is_record());
    }

    #[test]
    fn test_basic_type_derivation() {
        let t = ValueType::int32();
        assert_eq!(t.value_kind(), ValueKind::Int32);
        assert_eq!(t.size(), 4);
        assert_eq!(t.align(), 4);
        assert!(t.qualifiers().is_empty());
    }

    #[test]
    fn test_qualifier_bits() {
        let quals = Qualifiers::CONST | Qualifiers::VOLATILE;
        let t = ValueType::basic(ValueKind::Char, quals);
        assert!(t.qualifiers().contains(Qualifiers::CONST));
        assert!(t.qualifiers().contains(Qualifiers::VOLATILE));
        assert!(!t.qualifiers().contains(Qualifiers::EXTERNAL));
    }

    #[test]
    fn test_array_layout() {
        let arr = ValueType::array(Qualifiers::empty(), ValueType::int32(), 10);
        assert_eq!(arr.value_kind(), ValueKind::Array);
        assert_eq!(arr.size(), 40);
        assert_eq!(arr.align(), 4);
    }

    #[test]
    fn test_pointer_type() {
        let p = ValueType::pointer(
            ValueKind::PtrToInt,
            Qualifiers::empty(),
            ValueType::int32(),
        );
        assert_eq!(p.value_kind(), ValueKind::PtrToInt);
        assert_eq!(p.size(), 8);
        if let ValueType::Pointer { pointee, .. } = &p {
            assert_eq!(pointee.value_kind(), ValueKind::Int32);
        } else {
            panic!("expected a pointer type");
        }
    }
}
