//! Source-level types as resolved by the type checker.

use std::fmt;

use bitflags::bitflags;

use crate::Name;

/// Index into the tree's type arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct TyId(u32);

impl TyId {
    /// Invalid type ID (sentinel value).
    pub const INVALID: TyId = TyId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        TyId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for TyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "TyId({})", self.0)
        } else {
            write!(f, "TyId::INVALID")
        }
    }
}

/// Scope an identifier was resolved in.
///
/// The type checker numbers scopes; the IR builder only ever compares them
/// and special-cases the two well-known ones.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    /// File scope.
    pub const GLOBAL: ScopeId = ScopeId(0);
    /// Function parameter scope.
    pub const PARAMS: ScopeId = ScopeId(1);

    /// A block scope. Block numbering starts after the well-known scopes.
    #[inline]
    pub const fn block(n: u32) -> Self {
        ScopeId(2 + n)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// The built-in arithmetic types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum WellKnown {
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    SignedShort,
    UnsignedShort,
    SignedInt,
    UnsignedInt,
    SignedLong,
    UnsignedLong,
    SignedLongLong,
    UnsignedLongLong,
    Half,
    Float,
    Double,
    LongDouble,
    Int128,
    UInt128,
}

impl WellKnown {
    /// Whether the type is a floating-point type.
    #[inline]
    pub fn is_fp(self) -> bool {
        matches!(
            self,
            WellKnown::Half | WellKnown::Float | WellKnown::Double | WellKnown::LongDouble
        )
    }

    /// Whether the type is an integer type.
    #[inline]
    pub fn is_integral(self) -> bool {
        !self.is_fp()
    }

    /// Signedness for conversion purposes. Plain `char` is signed on every
    /// supported target.
    #[inline]
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            WellKnown::Char
                | WellKnown::SignedChar
                | WellKnown::SignedShort
                | WellKnown::SignedInt
                | WellKnown::SignedLong
                | WellKnown::SignedLongLong
                | WellKnown::Int128
        )
    }
}

bitflags! {
    /// Type qualifiers. The IR builder only cares about `const` (for
    /// string-literal categorisation); the rest ride along for fidelity.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeQualifiers: u32 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
    }
}

/// Struct or union.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AggregateKind {
    Struct,
    Union,
}

/// A field of an aggregate. Anonymous embedded aggregates have
/// `name == Name::EMPTY`.
#[derive(Clone, PartialEq, Debug)]
pub struct Field {
    pub name: Name,
    pub ty: TyId,
    /// Bitfield width in bits, when this field is a bitfield.
    pub bitfield_width: Option<u32>,
}

/// A function parameter. Unnamed parameters have `name == Name::EMPTY`.
#[derive(Clone, PartialEq, Debug)]
pub struct FuncParam {
    pub name: Name,
    pub ty: TyId,
}

/// A resolved type.
#[derive(Clone, PartialEq, Debug)]
pub enum TyKind {
    Void,
    /// The `...` sentinel. Only legal inside function parameter lists.
    Variadic,
    WellKnown(WellKnown),
    Pointer {
        underlying: TyId,
        quals: TypeQualifiers,
    },
    Array {
        elem: TyId,
        len: u64,
    },
    Func {
        ret: TyId,
        params: Vec<FuncParam>,
        variadic: bool,
    },
    Aggregate {
        kind: AggregateKind,
        name: Name,
        fields: Vec<Field>,
    },
    /// A declared-but-undefined aggregate. Only legal in declaration types
    /// (`extern struct X e;`).
    IncompleteAggregate {
        kind: AggregateKind,
        name: Name,
    },
}
