//! Typed expressions.

use std::fmt;

use crate::decl::InitList;
use crate::stmt::StmtId;
use crate::ty::{ScopeId, TyId};
use crate::Name;

/// Index into the tree's expression arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Invalid expression ID (sentinel value).
    pub const INVALID: ExprId = ExprId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        ExprId(index)
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

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ExprId({})", self.0)
        } else {
            write!(f, "ExprId::INVALID")
        }
    }
}

/// A typed expression: the kind plus the type the checker assigned it.
#[derive(Clone, PartialEq, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TyId,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TyId) -> Self {
        Expr { kind, ty }
    }
}

/// How a variable reference was resolved.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum VarKind {
    /// An ordinary object or function.
    Var,
    /// An enumerator; the value is the enumerator's constant.
    Enumerator(u64),
}

/// A resolved variable reference.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Var {
    pub name: Name,
    pub scope: ScopeId,
    pub kind: VarKind,
}

impl Var {
    /// An ordinary variable reference.
    pub fn new(name: Name, scope: ScopeId) -> Self {
        Var {
            name,
            scope,
            kind: VarKind::Var,
        }
    }
}

/// String constant payload. The stored bytes do not include the
/// terminating NUL; wide strings store 4-byte code units.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StrCnst {
    Ascii(Vec<u8>),
    Wide(Vec<u32>),
}

/// A constant. Integers are stored as unsigned 64-bit values; the type
/// checker narrows wider values before they reach IR construction.
#[derive(Clone, PartialEq, Debug)]
pub enum Cnst {
    Int(u64),
    Flt(f64),
    Str(StrCnst),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicalNot,
    Not,
    Indirection,
    AddressOf,
    PrefixInc,
    PrefixDec,
    PostfixInc,
    PostfixDec,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOp {
    Eq,
    Neq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    LShift,
    RShift,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// Whether the operator is a comparison (result is boolean-ish, so the
    /// pointer-arithmetic rewrites never apply).
    #[inline]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
        )
    }
}

/// Assignment operator kind. Compound kinds carry the arithmetic op that
/// is applied between the assignee and the value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AssgKind {
    Basic,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    LShift,
    RShift,
}

impl AssgKind {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssgKind::Basic => None,
            AssgKind::Add => Some(BinaryOp::Add),
            AssgKind::Sub => Some(BinaryOp::Sub),
            AssgKind::Mul => Some(BinaryOp::Mul),
            AssgKind::Div => Some(BinaryOp::Div),
            AssgKind::Mod => Some(BinaryOp::Mod),
            AssgKind::And => Some(BinaryOp::And),
            AssgKind::Or => Some(BinaryOp::Or),
            AssgKind::Xor => Some(BinaryOp::Xor),
            AssgKind::LShift => Some(BinaryOp::LShift),
            AssgKind::RShift => Some(BinaryOp::RShift),
        }
    }
}

/// An assignment expression as resolved by the type checker.
///
/// For compound assignments the checker records the type the assignee is
/// promoted to for the operation (`assignee_ty`), the type the operation
/// produces (`result_ty`), and whether each of those conversions actually
/// requires a cast.
#[derive(Clone, PartialEq, Debug)]
pub struct Assg {
    pub kind: AssgKind,
    pub assignee: ExprId,
    pub value: ExprId,
    pub assignee_ty: TyId,
    pub result_ty: TyId,
    pub cast_assignee: bool,
    pub cast_result: bool,
}

/// Expression kinds.
#[derive(Clone, PartialEq, Debug)]
pub enum ExprKind {
    Cnst(Cnst),
    Var(Var),
    /// A compiler builtin used as a call target (`__builtin_*`).
    Builtin(Name),
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    /// An explicit or checker-inserted cast; the target type is the
    /// expression's own type.
    Cast {
        expr: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Assg(Assg),
    ArrayAccess {
        lhs: ExprId,
        rhs: ExprId,
    },
    MemberAccess {
        lhs: ExprId,
        member: Name,
    },
    PointerAccess {
        lhs: ExprId,
        member: Name,
    },
    /// `cond ? then : else`. A missing `then` is the GNU `a ?: b` form.
    Ternary {
        cond: ExprId,
        then_expr: Option<ExprId>,
        else_expr: ExprId,
    },
    Call {
        target: ExprId,
        args: Vec<ExprId>,
    },
    /// `(a, b, ...)` comma expression.
    CompoundExpr(Vec<ExprId>),
    /// `(T){ ... }`; the literal's type is the expression type.
    CompoundLiteral {
        init_list: InitList,
    },
    SizeOf {
        ty: TyId,
    },
    AlignOf {
        ty: TyId,
    },
    /// `va_arg(list, T)`; `T` is the expression's own type.
    VaArg {
        list: ExprId,
    },
    /// GNU statement expression `({ ...; last; })`. The value is the
    /// trailing expression statement, if there is one.
    StmtExpr {
        stmts: Vec<StmtId>,
    },
}
