//! Flat arena storage for the typed tree.

use crate::expr::{Expr, ExprId};
use crate::name::{Name, StringInterner};
use crate::stmt::{StmtId, StmtKind};
use crate::ty::{TyId, TyKind, WellKnown};

/// Panic helper for arena capacity overflow.
#[cold]
#[inline(never)]
fn panic_capacity_exceeded(value: usize, context: &str) -> ! {
    panic!("tree capacity exceeded: {context} has {value} elements, max is {}", u32::MAX)
}

#[inline]
fn to_u32(value: usize, context: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic_capacity_exceeded(value, context))
}

/// Contiguous storage for all types, expressions and statements of a
/// translation unit, plus the identifier interner.
///
/// Child references use id newtypes (`TyId`, `ExprId`, `StmtId`); nodes
/// are append-only.
#[derive(Default)]
pub struct Tree {
    interner: StringInterner,
    tys: Vec<TyKind>,
    exprs: Vec<Expr>,
    stmts: Vec<StmtKind>,
}

impl Tree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an identifier.
    pub fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// Look up an interned identifier.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    // -- Types --

    /// Allocate a type, returning its id.
    pub fn alloc_ty(&mut self, ty: TyKind) -> TyId {
        let id = TyId::new(to_u32(self.tys.len(), "types"));
        self.tys.push(ty);
        id
    }

    /// Get a type by id.
    ///
    /// # Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    #[track_caller]
    pub fn ty(&self, id: TyId) -> &TyKind {
        &self.tys[id.index()]
    }

    /// The pointee of a pointer type or the element of an array type.
    ///
    /// # Panics
    /// Panics if the type is neither pointer nor array; the type checker
    /// only dereferences those.
    #[track_caller]
    pub fn underlying(&self, id: TyId) -> TyId {
        match self.ty(id) {
            TyKind::Pointer { underlying, .. } => *underlying,
            TyKind::Array { elem, .. } => *elem,
            other => panic!("underlying() on non-pointer/array type {other:?}"),
        }
    }

    /// The well-known kind of a type, when it has one.
    pub fn well_known(&self, id: TyId) -> Option<WellKnown> {
        match self.ty(id) {
            TyKind::WellKnown(wk) => Some(*wk),
            _ => None,
        }
    }

    /// Whether a type is floating-point.
    pub fn is_fp(&self, id: TyId) -> bool {
        self.well_known(id).is_some_and(WellKnown::is_fp)
    }

    /// Whether a type is an integer type.
    pub fn is_integral(&self, id: TyId) -> bool {
        self.well_known(id).is_some_and(WellKnown::is_integral)
    }

    /// Whether a type is scalar (arithmetic or pointer).
    pub fn is_scalar(&self, id: TyId) -> bool {
        matches!(
            self.ty(id),
            TyKind::WellKnown(_) | TyKind::Pointer { .. }
        )
    }

    /// Whether a type is a (complete or incomplete) aggregate.
    pub fn is_aggregate(&self, id: TyId) -> bool {
        matches!(
            self.ty(id),
            TyKind::Aggregate { .. } | TyKind::IncompleteAggregate { .. }
        )
    }

    // -- Expressions --

    /// Allocate an expression, returning its id.
    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(to_u32(self.exprs.len(), "expressions"));
        self.exprs.push(expr);
        id
    }

    /// Get an expression by id.
    ///
    /// # Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    #[track_caller]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Get an expression's type by id.
    #[inline]
    #[track_caller]
    pub fn expr_ty(&self, id: ExprId) -> TyId {
        self.exprs[id.index()].ty
    }

    /// Number of expressions.
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    // -- Statements --

    /// Allocate a statement, returning its id.
    pub fn alloc_stmt(&mut self, stmt: StmtKind) -> StmtId {
        let id = StmtId::new(to_u32(self.stmts.len(), "statements"));
        self.stmts.push(stmt);
        id
    }

    /// Get a statement by id.
    ///
    /// # Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    #[track_caller]
    pub fn stmt(&self, id: StmtId) -> &StmtKind {
        &self.stmts[id.index()]
    }
}
