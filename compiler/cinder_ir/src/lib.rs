//! The SSA control-flow-graph IR produced by Cinder's IR builder.
//!
//! A [`Unit`] owns an ordered list of globals; each defined function global
//! owns a [`Func`] of basic blocks, statements and ops. Ops reference each
//! other by [`OpId`]; CFG edges are stored as [`BlockId`]s, so the pred/succ
//! cycles of a CFG need no interior mutability or weak references.
//!
//! This crate is pure data model plus the handful of structural builder
//! primitives lowering needs (block/stmt/op allocation, phi insertion, CFG
//! edge wiring, call-result spilling, block pruning). All semantic work —
//! what ops to emit for which source construct — lives in `cinder_lower`.

mod func;
mod global;
mod op;
mod print;
mod ty;
mod unit;

pub use func::{
    Block, BlockId, Func, FuncFlags, Lcl, LclFlags, LclId, Stmt, StmtFlags, StmtId, SwitchCase,
    Term,
};
pub use global::{DataCategory, DefKind, GlbFlags, GlbId, GlbKind, GlbVar, Global, Linkage, StrValue, VarValue, VarValueKind};
pub use op::{
    AddrTarget, BinaryOpKind, Bitfield, CastOpKind, MemLoc, Op, OpCnst, OpFlags, OpId, OpKind,
    PhiEntry, UnaryOpKind,
};
pub use ty::{FuncTy, FuncTyFlags, IrTy, Primitive, TyInfo};
pub use unit::Unit;
