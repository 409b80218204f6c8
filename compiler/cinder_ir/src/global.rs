//! Globals and their constant values.

use std::fmt;

use bitflags::bitflags;

use crate::func::Func;
use crate::ty::IrTy;

/// Index into a unit's global arena.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct GlbId(u32);

impl GlbId {
    pub const INVALID: GlbId = GlbId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        GlbId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for GlbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "GlbId({})", self.0)
        } else {
            write!(f, "GlbId::INVALID")
        }
    }
}

/// Function or data global.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum GlbKind {
    Func,
    Data,
}

/// Definition status. Transitions only ever move forward:
/// `Undefined → Tentative → Defined`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum DefKind {
    Undefined,
    Tentative,
    Defined,
}

/// Linkage of a global symbol.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Linkage {
    /// Not a linker-visible symbol (block-scope statics, literals).
    None,
    Internal,
    External,
}

bitflags! {
    /// Global flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct GlbFlags: u32 {
        const WEAK = 1 << 0;
    }
}

/// How a data global is categorised for emission.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DataCategory {
    /// Ordinary (possibly mutable) data.
    Data,
    /// NUL-terminated narrow string usable in a merged string section.
    StringLiteral,
    /// Read-only data that cannot be string-merged (embedded NULs, wide
    /// strings, non-const-qualified uses).
    ConstData,
}

/// String payload of a global value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StrValue {
    /// Narrow string bytes (no trailing NUL stored).
    Bytes(Vec<u8>),
    /// Wide string 4-byte code units.
    Wide(Vec<u32>),
}

impl StrValue {
    /// Number of elements (not bytes for wide strings).
    pub fn len(&self) -> usize {
        match self {
            StrValue::Bytes(b) => b.len(),
            StrValue::Wide(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A constant value tree for a data global.
#[derive(Clone, PartialEq, Debug)]
pub enum VarValueKind {
    /// All-zero of the value's type.
    Zero,
    Int(u64),
    Flt(f64),
    Str(StrValue),
    /// Address of another global plus a constant byte offset.
    Addr { glb: GlbId, offset: u64 },
    /// Sparse list of (offset, value) pairs within an aggregate; bytes not
    /// covered are zero.
    List {
        offsets: Vec<u64>,
        values: Vec<VarValue>,
    },
}

/// A typed constant value.
#[derive(Clone, PartialEq, Debug)]
pub struct VarValue {
    pub ty: IrTy,
    pub kind: VarValueKind,
}

/// The variable payload of a data global.
#[derive(Clone, PartialEq, Debug)]
pub struct GlbVar {
    pub category: DataCategory,
    pub ty: IrTy,
    pub value: VarValue,
}

/// A global: stable name, IR type, definition status, linkage and either a
/// function body or a variable value.
#[derive(Clone, PartialEq, Debug)]
pub struct Global {
    pub id: GlbId,
    /// Symbol name. Anonymous literals have none.
    pub name: Option<String>,
    pub ty: IrTy,
    pub kind: GlbKind,
    pub def: DefKind,
    pub linkage: Linkage,
    pub flags: GlbFlags,
    pub var: Option<GlbVar>,
    pub func: Option<Func>,
}
