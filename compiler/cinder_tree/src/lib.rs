//! The type-checked tree consumed by the Cinder IR builder.
//!
//! This crate is the contract between the type checker and IR construction:
//! a flat arena of typed declarations, statements, expressions and
//! initialisers, addressed by `u32` id newtypes. Every expression carries
//! its resolved type; the IR builder never re-derives typing judgements.
//!
//! The tree is deliberately dumb storage. Anything that requires target
//! knowledge (sizes, alignments, pointer widths) lives downstream in
//! `cinder_ir` and `cinder_lower`.

mod decl;
mod expr;
mod name;
mod stmt;
mod tree;
mod ty;

pub use decl::{
    Declaration, DeclarationOrExpr, Designator, ExternalDecl, FuncDef, FuncSpecifiers, Init,
    InitEntry, InitList, StorageClass, TranslationUnit, VarDeclaration,
};
pub use expr::{
    Assg, AssgKind, BinaryOp, Cnst, Expr, ExprId, ExprKind, StrCnst, UnaryOp, Var, VarKind,
};
pub use name::{Name, StringInterner};
pub use stmt::{IterStmt, JumpStmt, LabeledStmt, SelectStmt, StmtId, StmtKind};
pub use tree::Tree;
pub use ty::{AggregateKind, Field, FuncParam, ScopeId, TyId, TyKind, TypeQualifiers, WellKnown};
