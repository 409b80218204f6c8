//! Shared helpers for lowering tests: a typed-tree fixture with the
//! common C types pre-allocated, and the CFG invariant checks every
//! lowered function must satisfy.

use cinder_ir::{Func, OpFlags, OpKind, StmtFlags, Term, Unit};
use cinder_target::Target;
use cinder_tree::{
    AssgKind, Cnst, Declaration, Expr, ExprId, ExprKind, ExternalDecl, Field, FuncDef, FuncParam,
    FuncSpecifiers, Init, JumpStmt, Name, ScopeId, StmtId, StmtKind, StorageClass,
    TranslationUnit, TyId, TyKind, Tree, TypeQualifiers, Var, VarDeclaration, WellKnown,
};

use crate::BuildFlags;

pub(crate) struct Fixture {
    pub tree: Tree,
    pub int: TyId,
    pub long: TyId,
    pub char_ty: TyId,
    pub void: TyId,
    pub bool_ty: TyId,
    pub double: TyId,
}

/// The block scope every test function body uses.
pub(crate) const BODY: ScopeId = ScopeId::block(0);

pub(crate) fn fx() -> Fixture {
    let mut tree = Tree::new();
    let int = tree.alloc_ty(TyKind::WellKnown(WellKnown::SignedInt));
    let long = tree.alloc_ty(TyKind::WellKnown(WellKnown::SignedLong));
    let char_ty = tree.alloc_ty(TyKind::WellKnown(WellKnown::Char));
    let void = tree.alloc_ty(TyKind::Void);
    let bool_ty = tree.alloc_ty(TyKind::WellKnown(WellKnown::Bool));
    let double = tree.alloc_ty(TyKind::WellKnown(WellKnown::Double));
    Fixture {
        tree,
        int,
        long,
        char_ty,
        void,
        bool_ty,
        double,
    }
}

impl Fixture {
    pub fn name(&mut self, s: &str) -> Name {
        self.tree.intern(s)
    }

    pub fn ptr(&mut self, to: TyId) -> TyId {
        self.tree.alloc_ty(TyKind::Pointer {
            underlying: to,
            quals: TypeQualifiers::empty(),
        })
    }

    pub fn const_ptr(&mut self, to: TyId) -> TyId {
        self.tree.alloc_ty(TyKind::Pointer {
            underlying: to,
            quals: TypeQualifiers::CONST,
        })
    }

    pub fn array(&mut self, elem: TyId, len: u64) -> TyId {
        self.tree.alloc_ty(TyKind::Array { elem, len })
    }

    pub fn struct_ty(&mut self, name: &str, fields: &[(&str, TyId)]) -> TyId {
        let name = self.name(name);
        let fields = fields
            .iter()
            .map(|(field_name, ty)| Field {
                name: self.tree.intern(field_name),
                ty: *ty,
                bitfield_width: None,
            })
            .collect();
        self.tree.alloc_ty(TyKind::Aggregate {
            kind: cinder_tree::AggregateKind::Struct,
            name,
            fields,
        })
    }

    pub fn func_ty(&mut self, ret: TyId, params: &[(&str, TyId)], variadic: bool) -> TyId {
        let mut param_list: Vec<FuncParam> = params
            .iter()
            .map(|(name, ty)| FuncParam {
                name: self.tree.intern(name),
                ty: *ty,
            })
            .collect();
        if variadic {
            let sentinel = self.tree.alloc_ty(TyKind::Variadic);
            param_list.push(FuncParam {
                name: Name::EMPTY,
                ty: sentinel,
            });
        }
        self.tree.alloc_ty(TyKind::Func {
            ret,
            params: param_list,
            variadic,
        })
    }

    // -- Expressions --

    pub fn expr(&mut self, kind: ExprKind, ty: TyId) -> ExprId {
        self.tree.alloc_expr(Expr::new(kind, ty))
    }

    pub fn cnst(&mut self, value: u64, ty: TyId) -> ExprId {
        self.expr(ExprKind::Cnst(Cnst::Int(value)), ty)
    }

    pub fn int_cnst(&mut self, value: u64) -> ExprId {
        let int = self.int;
        self.cnst(value, int)
    }

    pub fn var(&mut self, name: &str, scope: ScopeId, ty: TyId) -> ExprId {
        let name = self.name(name);
        self.expr(ExprKind::Var(Var::new(name, scope)), ty)
    }

    pub fn assign(&mut self, assignee: ExprId, value: ExprId, ty: TyId) -> ExprId {
        self.expr(
            ExprKind::Assg(cinder_tree::Assg {
                kind: AssgKind::Basic,
                assignee,
                value,
                assignee_ty: ty,
                result_ty: ty,
                cast_assignee: false,
                cast_result: false,
            }),
            ty,
        )
    }

    // -- Statements --

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.tree.alloc_stmt(kind)
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn ret(&mut self, expr: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Jump(JumpStmt::Return { expr }))
    }

    pub fn compound(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Compound(stmts))
    }

    /// A single-declarator declaration statement.
    pub fn decl(
        &mut self,
        storage: StorageClass,
        name: &str,
        scope: ScopeId,
        ty: TyId,
        init: Option<Init>,
    ) -> StmtId {
        let declaration = self.declaration(storage, name, scope, ty, init);
        self.stmt(StmtKind::Declaration(declaration))
    }

    pub fn declaration(
        &mut self,
        storage: StorageClass,
        name: &str,
        scope: ScopeId,
        ty: TyId,
        init: Option<Init>,
    ) -> Declaration {
        let name = self.name(name);
        Declaration {
            storage,
            func_specifiers: FuncSpecifiers::empty(),
            declarators: vec![VarDeclaration {
                var: Var::new(name, scope),
                ty,
                init,
                weak: false,
            }],
        }
    }

    // -- Functions and units --

    pub fn fn_def(
        &mut self,
        name: &str,
        ret: TyId,
        params: &[(&str, TyId)],
        body: StmtId,
    ) -> ExternalDecl {
        let ty = self.func_ty(ret, params, false);
        let name = self.name(name);
        ExternalDecl::FuncDef(FuncDef {
            storage: StorageClass::None,
            func_specifiers: FuncSpecifiers::empty(),
            decl: VarDeclaration {
                var: Var::new(name, ScopeId::GLOBAL),
                ty,
                init: None,
                weak: false,
            },
            body,
        })
    }

    pub fn build_tu(&self, decls: Vec<ExternalDecl>) -> Unit {
        self.build_tu_flags(decls, BuildFlags::empty())
    }

    pub fn build_tu_flags(&self, decls: Vec<ExternalDecl>, flags: BuildFlags) -> Unit {
        let unit = crate::build_unit(
            &self.tree,
            &TranslationUnit { decls },
            &Target::X86_64_LINUX,
            flags,
        );
        for global in unit.globals() {
            if let Some(func) = &global.func {
                assert_cfg_invariants(func);
            }
        }
        unit
    }
}

/// Find a built function by name.
pub(crate) fn func_named<'u>(unit: &'u Unit, name: &str) -> &'u Func {
    unit.global_by_name(name)
        .and_then(|g| g.func.as_ref())
        .unwrap_or_else(|| panic!("no built function named '{name}'"))
}

/// All attached op kinds of a function, in program order.
pub(crate) fn op_kinds(func: &Func) -> Vec<OpKind> {
    func.op_ids_in_order()
        .into_iter()
        .map(|id| func.op(id).kind.clone())
        .collect()
}

/// The invariants every finished function must satisfy: terminator and
/// successor-shape agreement, phi arity and placement, and parameter
/// placement.
pub(crate) fn assert_cfg_invariants(func: &Func) {
    for block in func.blocks() {
        // Exactly one terminator op, and it comes last.
        let ops: Vec<_> = block
            .stmts
            .iter()
            .flat_map(|&s| func.stmt(s).ops.iter().copied())
            .collect();
        let terminators: Vec<_> = ops
            .iter()
            .filter(|&&op| func.op(op).kind.is_terminator())
            .collect();
        assert_eq!(
            terminators.len(),
            1,
            "block {:?} has {} terminator ops",
            block.id,
            terminators.len()
        );
        let last = *ops.last().expect("terminated block has ops");
        assert!(
            func.op(last).kind.is_terminator(),
            "block {:?} does not end with its terminator",
            block.id
        );

        // Successor shape agrees with the terminator op.
        match (&func.op(last).kind, &block.term) {
            (OpKind::Ret { .. }, Term::Ret) => {}
            (OpKind::Br, Term::Merge { .. }) => {}
            (OpKind::BrCond { .. }, Term::Split { .. }) => {}
            (OpKind::BrSwitch { .. }, Term::Switch { .. }) => {}
            (op, term) => panic!(
                "block {:?} terminator op {op:?} disagrees with shape {term:?}",
                block.id
            ),
        }

        // Phis sit at the block head and cover exactly the predecessors.
        for &op_id in &ops {
            if let OpKind::Phi { entries } = &func.op(op_id).kind {
                let mut entry_blocks: Vec<_> = entries.iter().map(|e| e.block).collect();
                let mut preds = block.preds.clone();
                entry_blocks.sort();
                preds.sort();
                assert_eq!(
                    entry_blocks, preds,
                    "phi {op_id:?} entries disagree with predecessors of {:?}",
                    block.id
                );
            }
        }
    }

    // Parameter ops live in the entry block's first statement, and
    // nothing else does.
    let entry = func.block(func.entry());
    for (i, &stmt_id) in entry.stmts.iter().enumerate() {
        let stmt = func.stmt(stmt_id);
        if stmt.flags.contains(StmtFlags::PARAM) {
            assert_eq!(i, 0, "param statement is not first in the entry block");
            for &op in &stmt.ops {
                assert!(
                    func.op(op).flags.contains(OpFlags::PARAM),
                    "non-param op {op:?} in the param statement"
                );
            }
        } else {
            for &op in &stmt.ops {
                assert!(
                    !func.op(op).flags.contains(OpFlags::PARAM),
                    "param op {op:?} outside the param statement"
                );
            }
        }
    }
}
