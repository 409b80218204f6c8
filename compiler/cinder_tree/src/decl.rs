//! Declarations, initialisers and translation units.

use bitflags::bitflags;

use crate::expr::{ExprId, Var};
use crate::stmt::StmtId;
use crate::ty::TyId;
use crate::Name;

/// Storage class as written (`None` when unspecified).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StorageClass {
    None,
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
}

bitflags! {
    /// Function specifiers on a declaration.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FuncSpecifiers: u32 {
        const INLINE = 1 << 0;
        const NORETURN = 1 << 1;
    }
}

/// One designator in a designated initialiser.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Designator {
    /// `.field`
    Field(Name),
    /// `[index]` (the index is a checked constant)
    Index(u64),
}

/// An initialiser: a single expression or a brace-enclosed list.
#[derive(Clone, PartialEq, Debug)]
pub enum Init {
    Expr(ExprId),
    List(InitList),
}

/// One entry of an initialiser list, with optional leading designators.
#[derive(Clone, PartialEq, Debug)]
pub struct InitEntry {
    pub designators: Vec<Designator>,
    pub init: Box<Init>,
}

impl InitEntry {
    /// An entry without designators (advances the running member index).
    pub fn positional(init: Init) -> Self {
        InitEntry {
            designators: Vec::new(),
            init: Box::new(init),
        }
    }

    /// An entry with designators.
    pub fn designated(designators: Vec<Designator>, init: Init) -> Self {
        InitEntry {
            designators,
            init: Box::new(init),
        }
    }
}

/// A brace-enclosed initialiser list, typed with the aggregate (or scalar)
/// it initialises.
#[derive(Clone, PartialEq, Debug)]
pub struct InitList {
    pub ty: TyId,
    pub inits: Vec<InitEntry>,
}

/// One declarator of a declaration.
#[derive(Clone, PartialEq, Debug)]
pub struct VarDeclaration {
    pub var: Var,
    pub ty: TyId,
    pub init: Option<Init>,
    /// `__attribute__((weak))` and friends.
    pub weak: bool,
}

/// A declaration: storage class, function specifiers and declarators.
#[derive(Clone, PartialEq, Debug)]
pub struct Declaration {
    pub storage: StorageClass,
    pub func_specifiers: FuncSpecifiers,
    pub declarators: Vec<VarDeclaration>,
}

/// The first clause of a `for` statement.
#[derive(Clone, PartialEq, Debug)]
pub enum DeclarationOrExpr {
    Decl(Declaration),
    Expr(ExprId),
}

/// A function definition.
#[derive(Clone, PartialEq, Debug)]
pub struct FuncDef {
    pub storage: StorageClass,
    pub func_specifiers: FuncSpecifiers,
    /// The function's name and type (never carries an initialiser).
    pub decl: VarDeclaration,
    pub body: StmtId,
}

/// An external declaration of a translation unit.
#[derive(Clone, PartialEq, Debug)]
pub enum ExternalDecl {
    Declaration(Declaration),
    FuncDef(FuncDef),
}

/// The whole translation unit, in declaration order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TranslationUnit {
    pub decls: Vec<ExternalDecl>,
}
