//! IR ops.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::func::{BlockId, LclId, StmtId};
use crate::global::GlbId;
use crate::ty::{FuncTy, IrTy};

/// Index into a function's op arena.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct OpId(u32);

impl OpId {
    pub const INVALID: OpId = OpId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        OpId(index)
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

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "OpId({})", self.0)
        } else {
            write!(f, "OpId::INVALID")
        }
    }
}

bitflags! {
    /// Per-op flag bits.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct OpFlags: u32 {
        /// Parameter materialisation op; lives in the entry block's first
        /// statement and is filled in by the backend.
        const PARAM = 1 << 0;
        /// The op's value has been stored to a stack slot.
        const SPILLED = 1 << 1;
        /// A call argument past the declared non-variadic arity.
        const VARIADIC_PARAM = 1 << 2;
    }
}

/// Constant payload of a `Cnst` op.
///
/// Integers store an unsigned 64-bit image; floats store an f64 (extended
/// precision beyond F64 is not carried by the IR).
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum OpCnst {
    Int(u64),
    Flt(f64),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOpKind {
    Neg,
    FNeg,
    Not,
    LogicalNot,
    Popcnt,
    Clz,
    Ctz,
    Rev,
    FAbs,
    FSqrt,
}

/// Binary op kinds. Comparisons, division, modulo and right shift come in
/// signed/unsigned/float variants; the builder picks from the source types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOpKind {
    Eq,
    Neq,
    Sgt,
    Ugt,
    SgtEq,
    UgtEq,
    Slt,
    Ult,
    SltEq,
    UltEq,
    FEq,
    FNeq,
    Fgt,
    FgtEq,
    Flt,
    FltEq,
    LShift,
    SRShift,
    URShift,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SMod,
    UMod,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOpKind {
    /// Whether this is a comparison: the result is `I1`/boolean-ish and
    /// legitimately differs from the operand type.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOpKind::Eq
                | BinaryOpKind::Neq
                | BinaryOpKind::Sgt
                | BinaryOpKind::Ugt
                | BinaryOpKind::SgtEq
                | BinaryOpKind::UgtEq
                | BinaryOpKind::Slt
                | BinaryOpKind::Ult
                | BinaryOpKind::SltEq
                | BinaryOpKind::UltEq
                | BinaryOpKind::FEq
                | BinaryOpKind::FNeq
                | BinaryOpKind::Fgt
                | BinaryOpKind::FgtEq
                | BinaryOpKind::Flt
                | BinaryOpKind::FltEq
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CastOpKind {
    /// Integer narrowing.
    Trunc,
    /// Integer widening, sign-extending.
    Sext,
    /// Integer widening, zero-extending.
    Zext,
    /// Float ↔ float of different width.
    Conv,
    /// Signed integer ↔ float.
    Sconv,
    /// Unsigned integer ↔ float.
    Uconv,
}

/// A `{bit offset, bit width}` pair addressing a sub-range of an
/// integer-typed memory location.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Bitfield {
    pub offset: u32,
    pub width: u32,
}

/// Where a load reads from / a store writes to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MemLoc {
    Lcl(LclId),
    Glb(GlbId),
    Addr(OpId),
}

/// What an `Addr` op takes the address of.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AddrTarget {
    Lcl(LclId),
    Glb(GlbId),
}

/// One incoming value of a phi.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PhiEntry {
    pub block: BlockId,
    pub value: OpId,
}

/// Op kinds.
#[derive(Clone, PartialEq, Debug)]
pub enum OpKind {
    /// Intentional undefined value (uninitialised automatic variable).
    Undf,
    Cnst(OpCnst),
    UnaryOp {
        op: UnaryOpKind,
        value: OpId,
    },
    BinaryOp {
        op: BinaryOpKind,
        lhs: OpId,
        rhs: OpId,
    },
    CastOp {
        op: CastOpKind,
        value: OpId,
    },
    Load {
        src: MemLoc,
    },
    Store {
        dest: MemLoc,
        value: OpId,
    },
    LoadBitfield {
        addr: OpId,
        bitfield: Bitfield,
    },
    StoreBitfield {
        addr: OpId,
        value: OpId,
        bitfield: Bitfield,
    },
    Addr {
        target: AddrTarget,
    },
    /// `base + index * scale + offset`.
    AddrOffset {
        base: OpId,
        index: Option<OpId>,
        scale: u64,
        offset: u64,
    },
    Br,
    BrCond {
        cond: OpId,
    },
    BrSwitch {
        value: OpId,
    },
    Ret {
        value: Option<OpId>,
    },
    Call {
        func_ty: FuncTy,
        target: OpId,
        args: Vec<OpId>,
    },
    /// Value move. With a `None` source and the `PARAM` flag this is a
    /// parameter placeholder the backend fills with the ABI move.
    Mov {
        value: Option<OpId>,
    },
    /// Fill `len` bytes at `addr` with `value`.
    MemSet {
        addr: OpId,
        value: u8,
        len: u64,
    },
    VaStart {
        list_addr: OpId,
    },
    VaArg {
        list_addr: OpId,
        arg_ty: IrTy,
    },
    Phi {
        entries: SmallVec<[PhiEntry; 2]>,
    },
}

impl OpKind {
    /// Whether this op terminates a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            OpKind::Br | OpKind::BrCond { .. } | OpKind::BrSwitch { .. } | OpKind::Ret { .. }
        )
    }

    /// Collect the op operands this op references.
    pub fn operands(&self) -> SmallVec<[OpId; 2]> {
        let mut out = SmallVec::new();
        self.for_each_operand(|id| out.push(id));
        out
    }

    /// Visit every op operand.
    pub fn for_each_operand(&self, mut f: impl FnMut(OpId)) {
        self.walk_operands(&mut |id| f(*id));
    }

    /// Visit every op operand mutably (used to rewrite uses).
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut OpId)) {
        self.walk_operands_mut(&mut f);
    }

    fn walk_operands(&self, f: &mut dyn FnMut(&OpId)) {
        match self {
            OpKind::Undf | OpKind::Cnst(_) | OpKind::Br | OpKind::Addr { .. } => {}
            OpKind::UnaryOp { value, .. } | OpKind::CastOp { value, .. } => f(value),
            OpKind::BinaryOp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            OpKind::Load { src } => {
                if let MemLoc::Addr(addr) = src {
                    f(addr);
                }
            }
            OpKind::Store { dest, value } => {
                if let MemLoc::Addr(addr) = dest {
                    f(addr);
                }
                f(value);
            }
            OpKind::LoadBitfield { addr, .. } => f(addr),
            OpKind::StoreBitfield { addr, value, .. } => {
                f(addr);
                f(value);
            }
            OpKind::AddrOffset { base, index, .. } => {
                f(base);
                if let Some(index) = index {
                    f(index);
                }
            }
            OpKind::BrCond { cond } => f(cond),
            OpKind::BrSwitch { value } => f(value),
            OpKind::Ret { value } | OpKind::Mov { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            OpKind::Call { target, args, .. } => {
                for arg in args {
                    f(arg);
                }
                f(target);
            }
            OpKind::MemSet { addr, .. } | OpKind::VaStart { list_addr: addr } => f(addr),
            OpKind::VaArg { list_addr, .. } => f(list_addr),
            OpKind::Phi { entries } => {
                for entry in entries {
                    f(&entry.value);
                }
            }
        }
    }

    fn walk_operands_mut(&mut self, f: &mut dyn FnMut(&mut OpId)) {
        match self {
            OpKind::Undf | OpKind::Cnst(_) | OpKind::Br | OpKind::Addr { .. } => {}
            OpKind::UnaryOp { value, .. } | OpKind::CastOp { value, .. } => f(value),
            OpKind::BinaryOp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            OpKind::Load { src } => {
                if let MemLoc::Addr(addr) = src {
                    f(addr);
                }
            }
            OpKind::Store { dest, value } => {
                if let MemLoc::Addr(addr) = dest {
                    f(addr);
                }
                f(value);
            }
            OpKind::LoadBitfield { addr, .. } => f(addr),
            OpKind::StoreBitfield { addr, value, .. } => {
                f(addr);
                f(value);
            }
            OpKind::AddrOffset { base, index, .. } => {
                f(base);
                if let Some(index) = index {
                    f(index);
                }
            }
            OpKind::BrCond { cond } => f(cond),
            OpKind::BrSwitch { value } => f(value),
            OpKind::Ret { value } | OpKind::Mov { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            OpKind::Call { target, args, .. } => {
                for arg in args {
                    f(arg);
                }
                f(target);
            }
            OpKind::MemSet { addr, .. } | OpKind::VaStart { list_addr: addr } => f(addr),
            OpKind::VaArg { list_addr, .. } => f(list_addr),
            OpKind::Phi { entries } => {
                for entry in entries {
                    f(&mut entry.value);
                }
            }
        }
    }
}

/// An op: kind, result type, owning statement and flags.
#[derive(Clone, PartialEq, Debug)]
pub struct Op {
    pub id: OpId,
    pub kind: OpKind,
    pub ty: IrTy,
    pub stmt: StmtId,
    pub flags: OpFlags,
    /// Stack slot the op's value was spilled to, if any.
    pub lcl: Option<LclId>,
}

impl Op {
    /// Whether the op produces a value consumers can reference.
    pub fn produces_value(&self) -> bool {
        self.ty != IrTy::None
    }
}
