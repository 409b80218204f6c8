//! Per-function lowering orchestration.

use cinder_ir::{
    AddrTarget, BlockId, Func, FuncTy, GlbId, IrTy, LclFlags, LclId, OpCnst, OpFlags, OpId,
    OpKind, StmtFlags, StmtId, TyInfo, Unit,
};
use cinder_tree::{FuncDef, Name, ScopeId, StmtId as TreeStmtId, TyId, TyKind, Tree, Var};
use tracing::debug;

use crate::refs::{GlobalRefs, SlotRef, VarKey, VarRefs};
use crate::ty::{lower_ty, ty_info};
use crate::BuildFlags;

/// A pending `break`/`continue`, or the marker opening a loop.
pub(crate) enum Jump {
    NewLoop,
    Break(BlockId),
    Continue(BlockId),
}

/// A collected `case`/`default`, or the marker opening a switch.
pub(crate) enum CaseEntry {
    NewSwitch,
    Case { value: u64, target: BlockId },
    Default { target: BlockId },
}

/// A deferred statement, or the marker opening a scope.
pub(crate) enum DeferEntry {
    NewScope,
    Defer(TreeStmtId),
}

/// A phi inserted for a variable read whose definition was not local to
/// the reading block; resolved by the SSA completion pass.
pub(crate) struct PendingPhi {
    pub op: OpId,
    pub key: VarKey,
}

/// State for lowering one function.
pub(crate) struct FuncBuilder<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) unit: &'a mut Unit,
    pub(crate) global_refs: &'a mut GlobalRefs,
    pub(crate) flags: BuildFlags,
    pub(crate) func: Func,
    pub(crate) refs: VarRefs,
    pub(crate) pending_phis: Vec<PendingPhi>,
    pub(crate) pending_gotos: Vec<(OpId, Name)>,
    pub(crate) labels: Vec<(Name, BlockId)>,
    pub(crate) jumps: Vec<Jump>,
    pub(crate) cases: Vec<CaseEntry>,
    pub(crate) defers: Vec<DeferEntry>,
    /// The interned `__func__` global, once referenced.
    pub(crate) func_name_glb: Option<GlbId>,
}

impl<'a> FuncBuilder<'a> {
    pub fn new(
        tree: &'a Tree,
        unit: &'a mut Unit,
        global_refs: &'a mut GlobalRefs,
        flags: BuildFlags,
        def: &FuncDef,
    ) -> Self {
        let name = tree.lookup(def.decl.var.name).to_owned();
        let target = unit.target;
        let mut func_ty = match lower_ty(tree, &target, def.decl.ty) {
            IrTy::Func(func_ty) => func_ty,
            other => panic!("function '{name}' has non-function type {other:?}"),
        };
        decay_signature(&mut func_ty);

        FuncBuilder {
            tree,
            unit,
            global_refs,
            flags,
            func: Func::new(name, func_ty),
            refs: VarRefs::new(),
            pending_phis: Vec::new(),
            pending_gotos: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            cases: Vec::new(),
            defers: Vec::new(),
            func_name_glb: None,
        }
    }

    /// Lower a source type to an IR type.
    pub(crate) fn lower_ir_ty(&self, ty: TyId) -> IrTy {
        let target = self.unit.target;
        lower_ty(self.tree, &target, ty)
    }

    /// Layout of a source type on the unit's target.
    pub(crate) fn ty_layout(&self, ty: TyId) -> TyInfo {
        let target = self.unit.target;
        ty_info(self.tree, &target, ty)
    }

    /// Build the function from its definition.
    pub fn build(mut self, def: &FuncDef) -> Func {
        let entry = self.func.alloc_block();

        // Params live in the first statement, reserved the same way the
        // phi statement is (they "execute" before any real op).
        let param_stmt = self.func.insert_stmt_at(entry, 0, StmtFlags::PARAM);
        let after_params = self.func.alloc_stmt(entry);

        self.lower_params(def, param_stmt, after_params);

        let body_end = self.lower_stmt(entry, def.body);

        self.fix_up_gotos();

        // Lowering leaves empty or dangling blocks behind (after returns,
        // gotos, breaks); drop everything unreachable.
        self.func.prune_blocks();

        self.ensure_ret(body_end);
        self.func.prune_blocks();

        self.resolve_pending_phis();
        self.simplify_phis();
        self.validate();

        self.func
    }

    /// Materialise parameters into the reserved entry statement.
    ///
    /// Aggregate parameters get a `PARAM`-flagged stack slot and an
    /// address op; the backend fills the slot from the ABI location.
    /// Scalars get a `PARAM`-flagged `MOV` with no source, which the
    /// backend replaces with the ABI move.
    fn lower_params(&mut self, def: &FuncDef, param_stmt: StmtId, after_params: StmtId) {
        let TyKind::Func { params, .. } = self.tree.ty(def.decl.ty) else {
            panic!("function definition with non-function type");
        };

        for param in params.clone() {
            if matches!(self.tree.ty(param.ty), TyKind::Variadic) {
                continue;
            }

            let var = Var::new(param.name, ScopeId::PARAMS);
            let mut param_ir = self.lower_ir_ty(param.ty);

            if param_ir.is_aggregate() {
                let lcl = self.func.add_local(param_ir);
                self.func.lcl_mut(lcl).flags |= LclFlags::PARAM;

                let addr = self.func.append_op(
                    param_stmt,
                    OpKind::Addr {
                        target: AddrTarget::Lcl(lcl),
                    },
                    IrTy::POINTER,
                );
                self.func.op_mut(addr).flags |= OpFlags::PARAM;

                if var.name.is_present() {
                    self.refs.add_slot(VarKey::of(&var), SlotRef::Lcl(lcl));
                }
            } else {
                if matches!(param_ir, IrTy::Array { .. }) {
                    // Array parameters are really pointers.
                    param_ir = IrTy::Pointer;
                }

                let mov = self
                    .func
                    .append_op(param_stmt, OpKind::Mov { value: None }, param_ir.clone());
                self.func.op_mut(mov).flags |= OpFlags::PARAM;

                if var.name.is_present() {
                    self.declare_var(&var, &param_ir);
                    self.var_assg(after_params, mov, &var);
                }
            }
        }
    }

    fn fix_up_gotos(&mut self) {
        let pending = std::mem::take(&mut self.pending_gotos);
        for (op, label) in pending {
            let target = self
                .labels
                .iter()
                .find(|(name, _)| *name == label)
                .map(|(_, block)| *block)
                .unwrap_or_else(|| {
                    panic!("goto to unknown label '{}'", self.tree.lookup(label))
                });
            let block = self.func.stmt(self.func.op(op).stmt).block;
            self.func.make_merge(block, target);
        }
    }

    /// Guarantee the function ends in a `RET`. `main` returns an implicit
    /// integer zero; other functions return no value at the IR level.
    fn ensure_ret(&mut self, body_end: BlockId) {
        let mut last = body_end;

        let needs_fresh_block = self.func.block(last).detached
            || match self.last_op(last) {
                Some(op) => {
                    let kind = &self.func.op(op).kind;
                    kind.is_terminator() && !matches!(kind, OpKind::Ret { .. })
                }
                None => false,
            };
        if needs_fresh_block {
            debug!("adding block to hold implicit return");
            last = self.func.alloc_block();
        }

        let ends_in_ret = self
            .last_op(last)
            .is_some_and(|op| matches!(self.func.op(op).kind, OpKind::Ret { .. }));
        if ends_in_ret {
            return;
        }

        let stmt = match self.func.block(last).stmts.last() {
            Some(&stmt) => stmt,
            None => self.func.alloc_stmt(last),
        };

        let value = if self.func.name == "main" {
            debug!("adding implicit return 0 to main");
            Some(
                self.func
                    .append_op(stmt, OpKind::Cnst(OpCnst::Int(0)), IrTy::I32),
            )
        } else {
            None
        };

        self.func.append_op(stmt, OpKind::Ret { value }, IrTy::None);
        self.func.make_ret(last);
    }

    /// The last op of a block, scanning statements from the back.
    pub(crate) fn last_op(&self, block: BlockId) -> Option<OpId> {
        self.func
            .block(block)
            .stmts
            .iter()
            .rev()
            .find_map(|&stmt| self.func.stmt(stmt).ops.last().copied())
    }

    /// Allocate the backing for a newly declared automatic variable.
    ///
    /// Aggregates and arrays always get a stack slot; scalars only under
    /// `SPILL_ALL`. Variables without a slot become SSA values.
    pub(crate) fn declare_var(&mut self, var: &Var, ty: &IrTy) -> Option<LclId> {
        if self.flags.contains(BuildFlags::SPILL_ALL)
            || ty.is_aggregate()
            || matches!(ty, IrTy::Array { .. })
        {
            let lcl = self.func.add_local(ty.clone());
            self.refs.add_slot(VarKey::of(var), SlotRef::Lcl(lcl));
            Some(lcl)
        } else {
            None
        }
    }
}

/// Decay aggregate and array parameter types to pointers in a function's
/// IR signature. The ops that materialise them carry the real types.
fn decay_signature(func_ty: &mut FuncTy) {
    for param in &mut func_ty.params {
        if param.is_aggregate() || matches!(param, IrTy::Array { .. }) {
            *param = IrTy::Pointer;
        }
    }
}

#[cfg(test)]
mod tests;
