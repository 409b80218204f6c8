//! Expression lowering.
//!
//! Expressions are lowered into a *current statement*, identified by a
//! `StmtId` cursor. Lowering an expression can advance the cursor across
//! sequence points and even into a different basic block (short-circuit
//! operators, ternaries, statement expressions), so callers must keep
//! using the cursor afterwards rather than a saved statement.

use cinder_ir::{
    AddrTarget, BinaryOpKind, FuncFlags, FuncTy, FuncTyFlags, GlbKind, IrTy, MemLoc, OpCnst,
    OpFlags, OpId, OpKind, PhiEntry, StmtId, UnaryOpKind,
};
use cinder_tree::{
    BinaryOp, Cnst, ExprId, ExprKind, Name, StmtKind, TyId, TyKind, UnaryOp, Var, VarKind,
};
use smallvec::smallvec;

use crate::func::FuncBuilder;
use crate::refs::{SlotRef, VarKey};
use crate::ty::{cast_info, member_by_name, needs_cast_op, CastInfo};
use crate::unit::mangle_static_name;
use crate::value::str_literal_global;

/// How a compound literal's value is delivered to its consumer.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ClMode {
    /// The consumer wants the literal's address.
    Addr,
    /// The consumer wants the stored value (scalar literals skip the
    /// memory round-trip entirely).
    Load,
}

/// Arguments to binary-op construction, carried as source types so the
/// signed/unsigned/float opcode variant and the pointer-arithmetic
/// rewrites can be selected.
pub(crate) struct BinaryArgs {
    pub op: BinaryOp,
    pub result_ty: TyId,
    pub lhs_ty: TyId,
    pub rhs_ty: TyId,
    pub lhs: OpId,
    pub rhs: OpId,
}

impl FuncBuilder<'_> {
    /// The block the cursor statement belongs to.
    pub(crate) fn block_of(&self, stmt: StmtId) -> cinder_ir::BlockId {
        self.func.stmt(stmt).block
    }

    /// Lower an expression, returning the op producing its value.
    /// `None` for the few expressions that produce nothing (`va_end`,
    /// a statement expression ending in a non-expression statement).
    pub(crate) fn lower_expr(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        let tree = self.tree;
        let ir_ty = self.lower_ir_ty(tree.expr_ty(expr));

        match &tree.expr(expr).kind {
            ExprKind::Cnst(_) => Some(self.lower_cnst(stmt, ir_ty, expr)),
            ExprKind::Var(var) => Some(self.lower_var_read(stmt, ir_ty, var)),
            ExprKind::Builtin(name) => {
                panic!("builtin '{}' used outside a call target", tree.lookup(*name))
            }
            ExprKind::Unary { .. } => self.lower_unary(stmt, expr),
            ExprKind::Cast { .. } => Some(self.lower_cast(stmt, expr)),
            ExprKind::Binary { .. } => Some(self.lower_binary(stmt, ir_ty, expr)),
            ExprKind::Assg(_) => Some(self.lower_assg(stmt, expr)),
            ExprKind::ArrayAccess { .. } => Some(self.lower_array_access(stmt, expr)),
            ExprKind::MemberAccess { .. } => Some(self.lower_member_access(stmt, ir_ty, expr)),
            ExprKind::PointerAccess { .. } => Some(self.lower_pointer_access(stmt, ir_ty, expr)),
            ExprKind::Ternary { .. } => Some(self.lower_ternary(stmt, ir_ty, expr)),
            ExprKind::Call { .. } => self.lower_call(stmt, expr),
            ExprKind::CompoundExpr(_) => self.lower_compound_expr(stmt, expr),
            ExprKind::CompoundLiteral { .. } => {
                Some(self.lower_compound_literal(stmt, None, ClMode::Load, expr))
            }
            ExprKind::SizeOf { ty } => {
                let size = self.ty_layout(*ty).size;
                Some(self.func.append_op(*stmt, OpKind::Cnst(OpCnst::Int(size)), ir_ty))
            }
            ExprKind::AlignOf { ty } => {
                let align = self.ty_layout(*ty).align;
                Some(self.func.append_op(*stmt, OpKind::Cnst(OpCnst::Int(align)), ir_ty))
            }
            ExprKind::VaArg { list } => {
                let list_addr = self.lower_addressof(stmt, *list);
                Some(self.func.append_op(
                    *stmt,
                    OpKind::VaArg {
                        list_addr,
                        arg_ty: ir_ty.clone(),
                    },
                    ir_ty,
                ))
            }
            ExprKind::StmtExpr { .. } => self.lower_stmt_expr(stmt, expr),
        }
    }

    /// Lower an expression that must produce a value.
    pub(crate) fn lower_value_expr(&mut self, stmt: &mut StmtId, expr: ExprId) -> OpId {
        self.lower_expr(stmt, expr)
            .unwrap_or_else(|| panic!("expression {expr:?} produced no value"))
    }

    // -- Constants --

    fn lower_cnst(&mut self, stmt: &mut StmtId, ir_ty: IrTy, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::Cnst(cnst) = &tree.expr(expr).kind else {
            unreachable!();
        };
        match cnst {
            Cnst::Int(v) => self
                .func
                .append_op(*stmt, OpKind::Cnst(OpCnst::Int(*v)), ir_ty),
            Cnst::Flt(v) => self
                .func
                .append_op(*stmt, OpKind::Cnst(OpCnst::Flt(*v)), ir_ty),
            Cnst::Str(s) => {
                let glb = str_literal_global(tree, self.unit, tree.expr_ty(expr), s);
                self.func.append_op(
                    *stmt,
                    OpKind::Addr {
                        target: AddrTarget::Glb(glb),
                    },
                    IrTy::POINTER,
                )
            }
        }
    }

    // -- Variables --

    /// Lower a variable read.
    ///
    /// Arrays and functions decay to their address. Memory-backed
    /// variables load; SSA-tracked variables yield their current
    /// definition, or a pending phi when the defining write is in another
    /// block.
    pub(crate) fn lower_var_read(&mut self, stmt: &mut StmtId, var_ty: IrTy, var: &Var) -> OpId {
        let tree = self.tree;

        if tree.lookup(var.name) == "__func__" {
            let glb = self.func_name_global();
            return self.func.append_op(
                *stmt,
                OpKind::Addr {
                    target: AddrTarget::Glb(glb),
                },
                IrTy::POINTER,
            );
        }

        // Reading an array or function is really taking its address.
        if matches!(var_ty, IrTy::Array { .. } | IrTy::Func(_)) {
            return self.lower_addressof_var(stmt, var, var_ty);
        }

        if let VarKind::Enumerator(value) = var.kind {
            return self
                .func
                .append_op(*stmt, OpKind::Cnst(OpCnst::Int(value)), var_ty);
        }

        let key = VarKey::of(var);
        let block = self.block_of(*stmt);

        if let Some(op) = self.refs.def_in(key, block) {
            return op;
        }

        let slot = self
            .refs
            .slot(key)
            .or_else(|| self.global_refs.get(key).map(SlotRef::Glb));

        match slot {
            Some(SlotRef::Lcl(lcl)) => {
                let lcl_ty = self.func.lcl(lcl).ty.clone();
                if matches!(lcl_ty, IrTy::Array { .. } | IrTy::Func(_)) {
                    return self.lower_addressof_var(stmt, var, lcl_ty);
                }
                let load_ty = if matches!(var_ty, IrTy::Array { .. }) {
                    IrTy::Pointer
                } else {
                    var_ty
                };
                self.func
                    .append_op(*stmt, OpKind::Load { src: MemLoc::Lcl(lcl) }, load_ty)
            }
            Some(SlotRef::Glb(glb)) => {
                let glb_ty = self.unit.global(glb).ty.clone();
                if matches!(glb_ty, IrTy::Array { .. } | IrTy::Func(_)) {
                    return self.lower_addressof_var(stmt, var, glb_ty);
                }
                self.func
                    .append_op(*stmt, OpKind::Load { src: MemLoc::Glb(glb) }, var_ty)
            }
            None => {
                // No definition in this block: leave an empty phi for the
                // SSA completion pass to fill from the predecessors.
                let phi = self.func.insert_phi(block, var_ty);
                self.pending_phis.push(crate::func::PendingPhi { op: phi, key });
                self.refs.set_def(key, block, phi);
                phi
            }
        }
    }

    /// Lazily intern the `__func__` global for this function.
    fn func_name_global(&mut self) -> cinder_ir::GlbId {
        if let Some(glb) = self.func_name_glb {
            return glb;
        }
        let value = self.func.name.clone();
        let array_ty = IrTy::Array {
            elem: Box::new(IrTy::I8),
            len: value.len() as u64 + 1,
        };
        let name = mangle_static_name(Some(&self.func.name), "__func__");
        let glb = self.unit.add_global(
            GlbKind::Data,
            array_ty.clone(),
            cinder_ir::DefKind::Defined,
            Some(name),
        );
        let global = self.unit.global_mut(glb);
        global.linkage = cinder_ir::Linkage::Internal;
        global.var = Some(cinder_ir::GlbVar {
            category: cinder_ir::DataCategory::StringLiteral,
            ty: array_ty.clone(),
            value: cinder_ir::VarValue {
                ty: array_ty,
                kind: cinder_ir::VarValueKind::Str(cinder_ir::StrValue::Bytes(
                    value.into_bytes(),
                )),
            },
        });
        self.func_name_glb = Some(glb);
        glb
    }

    /// Take the address of a variable.
    ///
    /// Memory-backed variables hand out their slot address. Taking the
    /// address of an SSA-tracked variable demotes it: the current value
    /// is stored to a fresh slot, and the slot backs the variable from
    /// then on.
    fn lower_addressof_var(&mut self, stmt: &mut StmtId, var: &Var, var_td_ir: IrTy) -> OpId {
        let key = VarKey::of(var);

        let slot = self
            .refs
            .slot(key)
            .or_else(|| self.global_refs.get(key).map(SlotRef::Glb));

        match slot {
            Some(SlotRef::Lcl(lcl)) => self.func.append_op(
                *stmt,
                OpKind::Addr {
                    target: AddrTarget::Lcl(lcl),
                },
                IrTy::POINTER,
            ),
            Some(SlotRef::Glb(glb)) => self.func.append_op(
                *stmt,
                OpKind::Addr {
                    target: AddrTarget::Glb(glb),
                },
                IrTy::POINTER,
            ),
            None => {
                let value = self.lower_var_read(stmt, var_td_ir.clone(), var);
                let lcl = self.func.add_local(var_td_ir);
                self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Lcl(lcl),
                        value,
                    },
                    IrTy::None,
                );
                self.refs.add_slot(key, SlotRef::Lcl(lcl));
                self.func.append_op(
                    *stmt,
                    OpKind::Addr {
                        target: AddrTarget::Lcl(lcl),
                    },
                    IrTy::POINTER,
                )
            }
        }
    }

    // -- Address formation --

    /// Lower `&expr` (and the implicit address-of contexts: call targets,
    /// member bases, `va_list` arguments). Never reads the operand.
    pub(crate) fn lower_addressof(&mut self, stmt: &mut StmtId, expr: ExprId) -> OpId {
        let tree = self.tree;
        match &tree.expr(expr).kind {
            ExprKind::ArrayAccess { lhs, rhs } => self.array_address(stmt, *lhs, *rhs),
            ExprKind::MemberAccess { lhs, member } => {
                self.member_address(stmt, *lhs, *member).0
            }
            ExprKind::PointerAccess { lhs, member } => {
                self.pointer_address(stmt, *lhs, *member).0
            }
            ExprKind::CompoundLiteral { .. } => {
                self.lower_compound_literal(stmt, None, ClMode::Addr, expr)
            }
            ExprKind::Var(var) => {
                let ir_ty = self.lower_ir_ty(tree.expr_ty(expr));
                self.lower_addressof_var(stmt, var, ir_ty)
            }
            ExprKind::Cnst(Cnst::Str(_)) => {
                // `&"foo"` is the same as `"foo"`.
                let ir_ty = self.lower_ir_ty(tree.expr_ty(expr));
                self.lower_cnst(stmt, ir_ty, expr)
            }
            ExprKind::Call { .. } => {
                // Spill the call result and address the spill slot.
                let value = self.lower_value_expr(stmt, expr);
                let lcl = self.func.add_local(self.func.op(value).ty.clone());
                self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Lcl(lcl),
                        value,
                    },
                    IrTy::None,
                );
                self.func.append_op(
                    *stmt,
                    OpKind::Addr {
                        target: AddrTarget::Lcl(lcl),
                    },
                    IrTy::POINTER,
                )
            }
            ExprKind::Unary {
                op: UnaryOp::Indirection,
                expr: inner,
            } => {
                // `&*e` cancels to `e`.
                self.lower_value_expr(stmt, *inner)
            }
            ExprKind::Cast { expr: inner } => {
                let target = self.unit.target;
                let to_ir = self.lower_ir_ty(tree.expr_ty(expr));
                let from_ir = self.lower_ir_ty(tree.expr_ty(*inner));
                if needs_cast_op(&target, &to_ir, &from_ir) {
                    panic!("cannot take the address of a value-changing cast");
                }
                self.lower_addressof(stmt, *inner)
            }
            ExprKind::CompoundExpr(exprs) => {
                // `(a, b)(args)` implicitly takes the address of `b`.
                debug_assert!(exprs.len() > 1, "compound expr with a single expression");
                for &e in &exprs[..exprs.len() - 1] {
                    self.lower_expr(stmt, e);
                    *stmt = self.func.alloc_stmt(self.block_of(*stmt));
                }
                self.lower_addressof(stmt, *exprs.last().unwrap())
            }
            other => panic!("cannot take the address of {other:?}"),
        }
    }

    /// `&base[index]`: decay the base if it is an array, scale the index
    /// by the element size.
    pub(crate) fn array_address(&mut self, stmt: &mut StmtId, lhs: ExprId, rhs: ExprId) -> OpId {
        let tree = self.tree;
        let lhs_ty = tree.expr_ty(lhs);

        let base = if matches!(tree.ty(lhs_ty), TyKind::Array { .. }) {
            self.lower_addressof(stmt, lhs)
        } else {
            self.lower_value_expr(stmt, lhs)
        };

        let index = self.lower_value_expr(stmt, rhs);

        let elem = tree.underlying(lhs_ty);
        let scale = self.ty_layout(elem).size;

        self.func.append_op(
            *stmt,
            OpKind::AddrOffset {
                base,
                index: Some(index),
                scale,
                offset: 0,
            },
            IrTy::POINTER,
        )
    }

    /// `&base.member`: the base address plus a constant offset.
    pub(crate) fn member_address(
        &mut self,
        stmt: &mut StmtId,
        lhs: ExprId,
        member: Name,
    ) -> (OpId, Option<cinder_ir::Bitfield>) {
        let tree = self.tree;
        let target = self.unit.target;
        let base = self.lower_addressof(stmt, lhs);
        let info = member_by_name(tree, &target, tree.expr_ty(lhs), member);
        self.offset_address(stmt, base, info.offset, info.bitfield)
    }

    /// `&base->member`: the pointer value plus a constant offset.
    pub(crate) fn pointer_address(
        &mut self,
        stmt: &mut StmtId,
        lhs: ExprId,
        member: Name,
    ) -> (OpId, Option<cinder_ir::Bitfield>) {
        let tree = self.tree;
        let target = self.unit.target;
        debug_assert!(
            matches!(tree.ty(tree.expr_ty(lhs)), TyKind::Pointer { .. }),
            "pointer access through non-pointer"
        );
        let base = self.lower_value_expr(stmt, lhs);
        let aggregate = tree.underlying(tree.expr_ty(lhs));
        let info = member_by_name(tree, &target, aggregate, member);
        self.offset_address(stmt, base, info.offset, info.bitfield)
    }

    fn offset_address(
        &mut self,
        stmt: &mut StmtId,
        base: OpId,
        offset: u64,
        bitfield: Option<cinder_ir::Bitfield>,
    ) -> (OpId, Option<cinder_ir::Bitfield>) {
        if offset == 0 {
            return (base, bitfield);
        }
        let addr = self.func.append_op(
            *stmt,
            OpKind::AddrOffset {
                base,
                index: None,
                scale: 0,
                offset,
            },
            IrTy::POINTER,
        );
        (addr, bitfield)
    }

    // -- Accesses --

    fn lower_array_access(&mut self, stmt: &mut StmtId, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::ArrayAccess { lhs, rhs } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let elem = tree.underlying(tree.expr_ty(*lhs));
        let elem_ir = self.lower_ir_ty(elem);

        let address = self.array_address(stmt, *lhs, *rhs);

        if matches!(elem_ir, IrTy::Array { .. }) {
            // Multidimensional indexing yields the row address.
            return address;
        }

        self.func.append_op(
            *stmt,
            OpKind::Load {
                src: MemLoc::Addr(address),
            },
            elem_ir,
        )
    }

    fn lower_member_access(&mut self, stmt: &mut StmtId, ir_ty: IrTy, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::MemberAccess { lhs, member } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let (address, bitfield) = self.member_address(stmt, *lhs, *member);
        self.load_member(stmt, ir_ty, address, bitfield)
    }

    fn lower_pointer_access(&mut self, stmt: &mut StmtId, ir_ty: IrTy, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::PointerAccess { lhs, member } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let (address, bitfield) = self.pointer_address(stmt, *lhs, *member);
        self.load_member(stmt, ir_ty, address, bitfield)
    }

    fn load_member(
        &mut self,
        stmt: &mut StmtId,
        ir_ty: IrTy,
        address: OpId,
        bitfield: Option<cinder_ir::Bitfield>,
    ) -> OpId {
        match bitfield {
            Some(bitfield) => self.func.append_op(
                *stmt,
                OpKind::LoadBitfield {
                    addr: address,
                    bitfield,
                },
                ir_ty,
            ),
            None => self.func.append_op(
                *stmt,
                OpKind::Load {
                    src: MemLoc::Addr(address),
                },
                ir_ty,
            ),
        }
    }

    // -- Casts --

    pub(crate) fn insert_cast(
        &mut self,
        stmt: StmtId,
        op: OpId,
        to: IrTy,
        info: CastInfo,
    ) -> OpId {
        match info {
            CastInfo::CmpNonZero => {
                let from_ty = self.func.op(op).ty.clone();
                let is_fp = from_ty.is_fp();
                let zero = if is_fp {
                    OpKind::Cnst(OpCnst::Flt(0.0))
                } else {
                    OpKind::Cnst(OpCnst::Int(0))
                };
                let zero = self.func.append_op(stmt, zero, from_ty);
                self.func.append_op(
                    stmt,
                    OpKind::BinaryOp {
                        op: if is_fp {
                            BinaryOpKind::FNeq
                        } else {
                            BinaryOpKind::Neq
                        },
                        lhs: op,
                        rhs: zero,
                    },
                    to,
                )
            }
            CastInfo::Cast(kind) => self.func.append_op(
                stmt,
                OpKind::CastOp {
                    op: kind.op(),
                    value: op,
                },
                to,
            ),
        }
    }

    /// Convert `op` from one source type to another, emitting a cast op
    /// only when the representation changes; otherwise the op is retyped
    /// in place.
    pub(crate) fn insert_cast_if_needed(
        &mut self,
        stmt: StmtId,
        op: OpId,
        from: TyId,
        to: TyId,
    ) -> OpId {
        let target = self.unit.target;
        let from_ir = self.lower_ir_ty(from);
        let to_ir = self.lower_ir_ty(to);
        if needs_cast_op(&target, &to_ir, &from_ir) {
            let info = cast_info(self.tree, &target, from, to);
            self.insert_cast(stmt, op, to_ir, info)
        } else {
            self.func.op_mut(op).ty = to_ir;
            op
        }
    }

    fn lower_cast(&mut self, stmt: &mut StmtId, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::Cast { expr: inner } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let value = self.lower_value_expr(stmt, *inner);

        let to = tree.expr_ty(expr);
        if matches!(tree.ty(to), TyKind::Void) {
            // A cast to void just leaves the value unused.
            return value;
        }
        self.insert_cast_if_needed(*stmt, value, tree.expr_ty(*inner), to)
    }

    // -- Unary operators --

    fn lower_unary(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        let tree = self.tree;
        let ExprKind::Unary { op, expr: inner } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let (op, inner) = (*op, *inner);
        let ir_ty = self.lower_ir_ty(tree.expr_ty(expr));

        if op == UnaryOp::AddressOf {
            return Some(self.lower_addressof(stmt, inner));
        }

        let value = self.lower_value_expr(stmt, inner);

        let unary_kind = match op {
            UnaryOp::AddressOf => unreachable!(),
            UnaryOp::Indirection => {
                return Some(self.func.append_op(
                    *stmt,
                    OpKind::Load {
                        src: MemLoc::Addr(value),
                    },
                    ir_ty,
                ));
            }
            UnaryOp::Plus => return Some(value),
            UnaryOp::PrefixInc | UnaryOp::PrefixDec | UnaryOp::PostfixInc | UnaryOp::PostfixDec => {
                return Some(self.lower_inc_dec(stmt, op, inner, value));
            }
            UnaryOp::Minus => {
                if tree.is_fp(tree.expr_ty(expr)) {
                    UnaryOpKind::FNeg
                } else {
                    UnaryOpKind::Neg
                }
            }
            UnaryOp::LogicalNot => UnaryOpKind::LogicalNot,
            UnaryOp::Not => UnaryOpKind::Not,
        };

        Some(self.func.append_op(
            *stmt,
            OpKind::UnaryOp {
                op: unary_kind,
                value,
            },
            ir_ty,
        ))
    }

    /// `++`/`--` lower to `assignee = assignee ± 1` plus the pre/post
    /// value choice. For pointer targets the `1` is synthesised with a
    /// pointer-sized integer type, so the binary-op rewrite produces an
    /// `AddrOffset` instead of pointer subtraction.
    fn lower_inc_dec(
        &mut self,
        stmt: &mut StmtId,
        op: UnaryOp,
        assignee: ExprId,
        old_value: OpId,
    ) -> OpId {
        let tree = self.tree;
        let assignee_ty = tree.expr_ty(assignee);

        let one = if tree.is_fp(assignee_ty) {
            let ty = self.lower_ir_ty(assignee_ty);
            self.func.append_op(*stmt, OpKind::Cnst(OpCnst::Flt(1.0)), ty)
        } else if matches!(
            tree.ty(assignee_ty),
            TyKind::Pointer { .. } | TyKind::Array { .. }
        ) {
            let target = self.unit.target;
            let ty = IrTy::Primitive(IrTy::pointer_sized_int(&target));
            self.func.append_op(*stmt, OpKind::Cnst(OpCnst::Int(1)), ty)
        } else {
            let ty = self.lower_ir_ty(assignee_ty);
            self.func.append_op(*stmt, OpKind::Cnst(OpCnst::Int(1)), ty)
        };

        let binary = match op {
            UnaryOp::PrefixInc | UnaryOp::PostfixInc => BinaryOp::Add,
            UnaryOp::PrefixDec | UnaryOp::PostfixDec => BinaryOp::Sub,
            _ => unreachable!(),
        };

        let new_value = self.alloc_binaryop(
            *stmt,
            BinaryArgs {
                op: binary,
                result_ty: assignee_ty,
                lhs_ty: assignee_ty,
                rhs_ty: assignee_ty,
                lhs: old_value,
                rhs: one,
            },
        );

        self.store_to_assignee(stmt, assignee, new_value);

        match op {
            UnaryOp::PostfixInc | UnaryOp::PostfixDec => old_value,
            _ => new_value,
        }
    }

    // -- Binary operators --

    fn lower_binary(&mut self, stmt: &mut StmtId, ir_ty: IrTy, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::Binary { op, lhs, rhs } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let (op, lhs, rhs) = (*op, *lhs, *rhs);

        let lhs_op = self.lower_value_expr(stmt, lhs);

        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            return self.lower_short_circuit(stmt, op, lhs_op, rhs, ir_ty);
        }

        let rhs_op = self.lower_value_expr(stmt, rhs);

        self.alloc_binaryop(
            *stmt,
            BinaryArgs {
                op,
                result_ty: tree.expr_ty(expr),
                lhs_ty: tree.expr_ty(lhs),
                rhs_ty: tree.expr_ty(rhs),
                lhs: lhs_op,
                rhs: rhs_op,
            },
        )
    }

    /// `&&`/`||` lower to a CFG: the right operand only evaluates on the
    /// path where it decides the result, and the boolean value is a phi
    /// of the constants 1 and 0.
    fn lower_short_circuit(
        &mut self,
        stmt: &mut StmtId,
        op: BinaryOp,
        lhs: OpId,
        rhs: ExprId,
        ir_ty: IrTy,
    ) -> OpId {
        let entry_bb = self.block_of(*stmt);
        let rhs_bb = self.func.alloc_block();
        let true_bb = self.func.alloc_block();
        let false_bb = self.func.alloc_block();
        let end_bb = self.func.alloc_block();

        if op == BinaryOp::LogicalAnd {
            self.func.make_split(entry_bb, rhs_bb, false_bb);
        } else {
            self.func.make_split(entry_bb, true_bb, rhs_bb);
        }

        let entry_stmt = self.func.alloc_stmt(entry_bb);
        self.func
            .append_op(entry_stmt, OpKind::BrCond { cond: lhs }, IrTy::None);

        let mut rhs_stmt = self.func.alloc_stmt(rhs_bb);
        let rhs_op = self.lower_value_expr(&mut rhs_stmt, rhs);

        let rhs_end_bb = self.block_of(rhs_stmt);
        let rhs_br_stmt = self.func.alloc_stmt(rhs_end_bb);
        self.func
            .append_op(rhs_br_stmt, OpKind::BrCond { cond: rhs_op }, IrTy::None);
        self.func.make_split(rhs_end_bb, true_bb, false_bb);

        let true_stmt = self.func.alloc_stmt(true_bb);
        let true_op = self
            .func
            .append_op(true_stmt, OpKind::Cnst(OpCnst::Int(1)), IrTy::I32);
        self.func.make_merge(true_bb, end_bb);
        let true_br_stmt = self.func.alloc_stmt(true_bb);
        self.func.append_op(true_br_stmt, OpKind::Br, IrTy::None);

        let false_stmt = self.func.alloc_stmt(false_bb);
        let false_op = self
            .func
            .append_op(false_stmt, OpKind::Cnst(OpCnst::Int(0)), IrTy::I32);
        self.func.make_merge(false_bb, end_bb);
        let false_br_stmt = self.func.alloc_stmt(false_bb);
        self.func.append_op(false_br_stmt, OpKind::Br, IrTy::None);

        let phi = self.func.insert_phi(end_bb, ir_ty);
        self.func.op_mut(phi).kind = OpKind::Phi {
            entries: smallvec![
                PhiEntry {
                    block: true_bb,
                    value: true_op,
                },
                PhiEntry {
                    block: false_bb,
                    value: false_op,
                },
            ],
        };

        *stmt = self.func.alloc_stmt(end_bb);
        phi
    }

    /// Build a binary op, applying the pointer-arithmetic rewrites:
    /// pointer + integer becomes `AddrOffset`, pointer − integer scales
    /// the integer, pointer − pointer divides the byte difference.
    pub(crate) fn alloc_binaryop(&mut self, stmt: StmtId, args: BinaryArgs) -> OpId {
        let tree = self.tree;

        debug_assert!(
            !(matches!(self.func.op(args.lhs).ty, IrTy::Array { .. })
                && matches!(self.func.op(args.rhs).ty, IrTy::Array { .. })),
            "arrays should have decayed to pointers"
        );

        let var_ty = self.lower_ir_ty(args.result_ty);

        let lhs_is_ptr = matches!(tree.ty(args.lhs_ty), TyKind::Pointer { .. });
        let rhs_is_ptr = matches!(tree.ty(args.rhs_ty), TyKind::Pointer { .. });

        if !args.op.is_comparison() && (lhs_is_ptr || rhs_is_ptr) {
            match tree.ty(args.result_ty) {
                TyKind::WellKnown(_) => {
                    // Pointer difference: byte difference divided by the
                    // element size, signed.
                    let ptr_ty = if lhs_is_ptr { args.lhs_ty } else { args.rhs_ty };
                    let el_size = self.ty_layout(tree.underlying(ptr_ty)).size;
                    let el_size_op = self.pointer_cnst(stmt, el_size);
                    let diff = self.func.append_op(
                        stmt,
                        OpKind::BinaryOp {
                            op: BinaryOpKind::Sub,
                            lhs: args.lhs,
                            rhs: args.rhs,
                        },
                        var_ty.clone(),
                    );
                    return self.func.append_op(
                        stmt,
                        OpKind::BinaryOp {
                            op: BinaryOpKind::SDiv,
                            lhs: diff,
                            rhs: el_size_op,
                        },
                        var_ty,
                    );
                }
                TyKind::Pointer { underlying, .. } if args.op == BinaryOp::Add => {
                    let el_size = self.ty_layout(*underlying).size;
                    return self.func.append_op(
                        stmt,
                        OpKind::AddrOffset {
                            base: args.lhs,
                            index: Some(args.rhs),
                            scale: el_size,
                            offset: 0,
                        },
                        var_ty,
                    );
                }
                TyKind::Pointer { underlying, .. } => {
                    debug_assert!(args.op == BinaryOp::Sub, "pointer arithmetic op");
                    let el_size = self.ty_layout(*underlying).size;
                    let el_size_op = self.pointer_cnst(stmt, el_size);
                    let scaled = self.func.append_op(
                        stmt,
                        OpKind::BinaryOp {
                            op: BinaryOpKind::Mul,
                            lhs: el_size_op,
                            rhs: args.rhs,
                        },
                        var_ty.clone(),
                    );
                    return self.func.append_op(
                        stmt,
                        OpKind::BinaryOp {
                            op: BinaryOpKind::Sub,
                            lhs: args.lhs,
                            rhs: scaled,
                        },
                        var_ty,
                    );
                }
                other => panic!("pointer arithmetic with result type {other:?}"),
            }
        }

        let is_fp = self.func.op(args.lhs).ty.is_fp();
        let is_signed = tree
            .well_known(args.lhs_ty)
            .is_some_and(cinder_tree::WellKnown::is_signed);
        debug_assert_eq!(
            is_fp,
            self.func.op(args.rhs).ty.is_fp(),
            "operand float-ness mismatch"
        );

        use BinaryOpKind as K;
        let kind = match args.op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                panic!("logical operators need CFG lowering, not a binary op")
            }
            BinaryOp::Eq => if is_fp { K::FEq } else { K::Eq },
            BinaryOp::Neq => if is_fp { K::FNeq } else { K::Neq },
            BinaryOp::Gt => if is_fp { K::Fgt } else if is_signed { K::Sgt } else { K::Ugt },
            BinaryOp::GtEq => if is_fp { K::FgtEq } else if is_signed { K::SgtEq } else { K::UgtEq },
            BinaryOp::Lt => if is_fp { K::Flt } else if is_signed { K::Slt } else { K::Ult },
            BinaryOp::LtEq => if is_fp { K::FltEq } else if is_signed { K::SltEq } else { K::UltEq },
            BinaryOp::RShift => if is_signed { K::SRShift } else { K::URShift },
            BinaryOp::LShift => K::LShift,
            BinaryOp::And => K::And,
            BinaryOp::Or => K::Or,
            BinaryOp::Xor => K::Xor,
            BinaryOp::Add => if is_fp { K::FAdd } else { K::Add },
            BinaryOp::Sub => if is_fp { K::FSub } else { K::Sub },
            BinaryOp::Mul => if is_fp { K::FMul } else { K::Mul },
            BinaryOp::Div => if is_fp { K::FDiv } else if is_signed { K::SDiv } else { K::UDiv },
            BinaryOp::Mod => if is_signed { K::SMod } else { K::UMod },
        };

        self.func.append_op(
            stmt,
            OpKind::BinaryOp {
                op: kind,
                lhs: args.lhs,
                rhs: args.rhs,
            },
            var_ty,
        )
    }

    /// A pointer-width integer constant.
    fn pointer_cnst(&mut self, stmt: StmtId, value: u64) -> OpId {
        let target = self.unit.target;
        let ty = IrTy::Primitive(IrTy::pointer_sized_int(&target));
        self.func.append_op(stmt, OpKind::Cnst(OpCnst::Int(value)), ty)
    }

    // -- Assignment --

    fn lower_assg(&mut self, stmt: &mut StmtId, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::Assg(assg) = &tree.expr(expr).kind else {
            unreachable!();
        };
        let assg = assg.clone();

        let value = match assg.kind.binary_op() {
            None => self.lower_value_expr(stmt, assg.value),
            Some(op) => {
                let assignee = self.lower_value_expr(stmt, assg.assignee);
                let lhs = if assg.cast_assignee {
                    self.insert_cast_if_needed(
                        *stmt,
                        assignee,
                        tree.expr_ty(assg.assignee),
                        assg.assignee_ty,
                    )
                } else {
                    assignee
                };

                let rhs = self.lower_value_expr(stmt, assg.value);

                let mut value = self.alloc_binaryop(
                    *stmt,
                    BinaryArgs {
                        op,
                        result_ty: assg.result_ty,
                        lhs_ty: assg.assignee_ty,
                        rhs_ty: tree.expr_ty(assg.value),
                        lhs,
                        rhs,
                    },
                );

                if assg.cast_result {
                    value = self.insert_cast_if_needed(
                        *stmt,
                        value,
                        assg.result_ty,
                        tree.expr_ty(assg.assignee),
                    );
                }
                value
            }
        };

        self.store_to_assignee(stmt, assg.assignee, value)
    }

    /// Store a value into an lvalue, returning the value (the result of
    /// an assignment expression is the assigned value, not a re-load).
    pub(crate) fn store_to_assignee(
        &mut self,
        stmt: &mut StmtId,
        assignee: ExprId,
        value: OpId,
    ) -> OpId {
        let tree = self.tree;
        let (address, bitfield) = match &tree.expr(assignee).kind {
            ExprKind::Var(var) => return self.var_assg(*stmt, value, var),
            ExprKind::ArrayAccess { lhs, rhs } => {
                (self.array_address(stmt, *lhs, *rhs), None)
            }
            ExprKind::MemberAccess { lhs, member } => self.member_address(stmt, *lhs, *member),
            ExprKind::PointerAccess { lhs, member } => self.pointer_address(stmt, *lhs, *member),
            ExprKind::Unary {
                op: UnaryOp::Indirection,
                expr: inner,
            } => (self.lower_value_expr(stmt, *inner), None),
            other => panic!("cannot assign to {other:?}"),
        };

        match bitfield {
            Some(bitfield) => {
                self.func.append_op(
                    *stmt,
                    OpKind::StoreBitfield {
                        addr: address,
                        value,
                        bitfield,
                    },
                    IrTy::None,
                );
            }
            None => {
                self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Addr(address),
                        value,
                    },
                    IrTy::None,
                );
            }
        }
        value
    }

    /// Record a write to a variable: stores for memory-backed variables,
    /// a new per-block SSA definition otherwise.
    pub(crate) fn var_assg(&mut self, stmt: StmtId, value: OpId, var: &Var) -> OpId {
        let key = VarKey::of(var);

        let slot = self
            .refs
            .slot(key)
            .or_else(|| self.global_refs.get(key).map(SlotRef::Glb));

        match slot {
            Some(SlotRef::Lcl(lcl)) => {
                self.func.append_op(
                    stmt,
                    OpKind::Store {
                        dest: MemLoc::Lcl(lcl),
                        value,
                    },
                    IrTy::None,
                );
                value
            }
            Some(SlotRef::Glb(glb)) => {
                self.func.append_op(
                    stmt,
                    OpKind::Store {
                        dest: MemLoc::Glb(glb),
                        value,
                    },
                    IrTy::None,
                );
                value
            }
            None => {
                let block = self.func.stmt(stmt).block;
                self.refs.set_def(key, block, value);
                value
            }
        }
    }

    // -- Ternaries --

    fn lower_ternary(&mut self, stmt: &mut StmtId, ir_ty: IrTy, expr: ExprId) -> OpId {
        let tree = self.tree;
        let ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } = &tree.expr(expr).kind
        else {
            unreachable!();
        };
        let (cond, then_expr, else_expr) = (*cond, *then_expr, *else_expr);

        let Some(then_expr) = then_expr else {
            return self.lower_elvis(stmt, ir_ty, cond, else_expr);
        };

        let cond_op = self.lower_value_expr(stmt, cond);
        let pre_bb = self.block_of(*stmt);
        let br_cond_stmt = self.func.alloc_stmt(pre_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        let true_bb = self.func.alloc_block();
        let false_bb = self.func.alloc_block();
        let end_bb = self.func.alloc_block();
        self.func.make_split(pre_bb, true_bb, false_bb);

        let mut true_stmt = self.func.alloc_stmt(true_bb);
        let mut true_op = self.lower_value_expr(&mut true_stmt, then_expr);
        let true_end_bb = self.block_of(true_stmt);
        self.func.make_merge(true_end_bb, end_bb);
        let true_br_stmt = self.func.alloc_stmt(true_end_bb);
        self.func.append_op(true_br_stmt, OpKind::Br, IrTy::None);

        let mut false_stmt = self.func.alloc_stmt(false_bb);
        let mut false_op = self.lower_value_expr(&mut false_stmt, else_expr);
        let false_end_bb = self.block_of(false_stmt);
        self.func.make_merge(false_end_bb, end_bb);
        let false_br_stmt = self.func.alloc_stmt(false_end_bb);
        self.func.append_op(false_br_stmt, OpKind::Br, IrTy::None);

        // Aggregate arms phi over addresses, with a trailing load.
        let mut load_ty = None;
        if self.func.op(true_op).ty.is_aggregate() && self.func.op(false_op).ty.is_aggregate() {
            debug_assert_eq!(
                self.func.op(true_op).ty,
                self.func.op(false_op).ty,
                "ternary arms with different aggregate types"
            );
            load_ty = Some(self.func.op(true_op).ty.clone());

            if matches!(self.func.op(true_op).kind, OpKind::Call { .. }) {
                self.func.spill_op(true_op);
            }
            if matches!(self.func.op(false_op).kind, OpKind::Call { .. }) {
                self.func.spill_op(false_op);
            }
            true_op = self.func.op_addr(true_stmt, true_op);
            false_op = self.func.op_addr(false_stmt, false_op);
        }

        let phi_ty = if load_ty.is_some() { IrTy::Pointer } else { ir_ty };
        let phi = self.func.insert_phi(end_bb, phi_ty);
        self.func.op_mut(phi).kind = OpKind::Phi {
            entries: smallvec![
                PhiEntry {
                    block: self.block_of(self.func.op(false_op).stmt),
                    value: false_op,
                },
                PhiEntry {
                    block: self.block_of(self.func.op(true_op).stmt),
                    value: true_op,
                },
            ],
        };

        let end_stmt = self.func.alloc_stmt(end_bb);
        *stmt = end_stmt;

        if let Some(load_ty) = load_ty {
            return self.func.append_op(
                end_stmt,
                OpKind::Load {
                    src: MemLoc::Addr(phi),
                },
                load_ty,
            );
        }
        phi
    }

    /// The GNU `a ?: b` form: the condition value doubles as the "true"
    /// arm and is only evaluated once.
    fn lower_elvis(
        &mut self,
        stmt: &mut StmtId,
        ir_ty: IrTy,
        cond: ExprId,
        else_expr: ExprId,
    ) -> OpId {
        let mut cond_op = self.lower_value_expr(stmt, cond);
        let cond_stmt = *stmt;
        let pre_bb = self.block_of(*stmt);
        let br_cond_stmt = self.func.alloc_stmt(pre_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        let false_bb = self.func.alloc_block();
        let end_bb = self.func.alloc_block();
        self.func.make_split(pre_bb, end_bb, false_bb);

        let mut false_stmt = self.func.alloc_stmt(false_bb);
        let mut false_op = self.lower_value_expr(&mut false_stmt, else_expr);
        let false_end_bb = self.block_of(false_stmt);
        self.func.make_merge(false_end_bb, end_bb);
        let false_br_stmt = self.func.alloc_stmt(false_end_bb);
        self.func.append_op(false_br_stmt, OpKind::Br, IrTy::None);

        let mut load_ty = None;
        if self.func.op(false_op).ty.is_aggregate() {
            load_ty = Some(self.func.op(false_op).ty.clone());

            if matches!(self.func.op(false_op).kind, OpKind::Call { .. }) {
                self.func.spill_op(false_op);
            }
            if matches!(self.func.op(cond_op).kind, OpKind::Call { .. }) {
                self.func.spill_op(cond_op);
            }
            false_op = self.func.op_addr(false_stmt, false_op);
            cond_op = self.func.op_addr(cond_stmt, cond_op);
        }

        let phi_ty = if load_ty.is_some() { IrTy::Pointer } else { ir_ty };
        let phi = self.func.insert_phi(end_bb, phi_ty);
        self.func.op_mut(phi).kind = OpKind::Phi {
            entries: smallvec![
                PhiEntry {
                    block: self.block_of(self.func.op(false_op).stmt),
                    value: false_op,
                },
                PhiEntry {
                    block: self.block_of(self.func.op(cond_op).stmt),
                    value: cond_op,
                },
            ],
        };

        let end_stmt = self.func.alloc_stmt(end_bb);
        *stmt = end_stmt;

        if let Some(load_ty) = load_ty {
            return self.func.append_op(
                end_stmt,
                OpKind::Load {
                    src: MemLoc::Addr(phi),
                },
                load_ty,
            );
        }
        phi
    }

    // -- Sequencing --

    fn lower_compound_expr(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        let tree = self.tree;
        let ExprKind::CompoundExpr(exprs) = &tree.expr(expr).kind else {
            unreachable!();
        };
        let mut last = None;
        for &e in exprs {
            last = self.lower_expr(stmt, e);
            // Commas are sequence points.
            *stmt = self.func.alloc_stmt(self.block_of(*stmt));
        }
        last
    }

    fn lower_stmt_expr(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        let tree = self.tree;
        let ExprKind::StmtExpr { stmts } = &tree.expr(expr).kind else {
            unreachable!();
        };

        let trailing = stmts.last().and_then(|&last| match tree.stmt(last) {
            StmtKind::Expr(e) => Some(*e),
            _ => None,
        });
        let body = if trailing.is_some() {
            &stmts[..stmts.len() - 1]
        } else {
            &stmts[..]
        };

        let mut bb = self.block_of(*stmt);
        for &s in body {
            bb = self.lower_stmt(bb, s);
        }
        *stmt = self.func.alloc_stmt(bb);

        trailing.and_then(|e| self.lower_expr(stmt, e))
    }

    // -- Calls --

    fn lower_call(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        if let Some(op) = self.lower_intrinsic(stmt, expr) {
            return Some(op);
        }

        let tree = self.tree;
        let ExprKind::Call { target, args } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let (target, args) = (*target, args.clone());

        if let ExprKind::Builtin(name) = &tree.expr(target).kind {
            return self.lower_builtin(stmt, &args, *name);
        }

        // The target may be a function designator, a function pointer or
        // (for arrays of function pointers) one level of decay.
        let target_td = tree.expr_ty(target);
        let func_ir = match tree.ty(target_td) {
            TyKind::Pointer { .. } | TyKind::Array { .. } => {
                self.lower_ir_ty(tree.underlying(target_td))
            }
            _ => self.lower_ir_ty(target_td),
        };
        let IrTy::Func(func_ty) = func_ir else {
            panic!("call target is not a function: {func_ir:?}");
        };

        let fixed_arity = func_ty.params.len();

        let mut arg_ops = Vec::with_capacity(args.len());
        for (i, &arg) in args.iter().enumerate() {
            let value = self.lower_value_expr(stmt, arg);
            let value = self.store_load_if_needed(stmt, value);
            if i >= fixed_arity {
                self.func.op_mut(value).flags |= OpFlags::VARIADIC_PARAM;
            }
            arg_ops.push(value);
        }

        // Function identifiers are addressed; pointer values are used
        // directly.
        let target_op = if matches!(tree.ty(target_td), TyKind::Pointer { .. }) {
            self.lower_value_expr(stmt, target)
        } else {
            self.lower_addressof(stmt, target)
        };

        self.func.flags |= FuncFlags::MAKES_CALL;

        let ret_ty = func_ty.ret.as_ref().clone();
        Some(self.func.append_op(
            *stmt,
            OpKind::Call {
                func_ty,
                target: target_op,
                args: arg_ops,
            },
            ret_ty,
        ))
    }

    /// Aggregate values passed to calls (and returned) are materialised
    /// into locals so the backend can marshal them.
    pub(crate) fn store_load_if_needed(&mut self, stmt: &mut StmtId, op: OpId) -> OpId {
        let ty = self.func.op(op).ty.clone();
        if !ty.is_aggregate() || matches!(self.func.op(op).kind, OpKind::Load { .. }) {
            return op;
        }

        let lcl = self.func.add_local(ty.clone());
        self.func.append_op(
            *stmt,
            OpKind::Store {
                dest: MemLoc::Lcl(lcl),
                value: op,
            },
            IrTy::None,
        );
        self.func
            .append_op(*stmt, OpKind::Load { src: MemLoc::Lcl(lcl) }, ty)
    }

    /// Calls to a handful of libc math functions at global scope lower
    /// straight to IR ops.
    fn lower_intrinsic(&mut self, stmt: &mut StmtId, expr: ExprId) -> Option<OpId> {
        let tree = self.tree;
        let ExprKind::Call { target, args } = &tree.expr(expr).kind else {
            unreachable!();
        };

        let ExprKind::Var(var) = &tree.expr(*target).kind else {
            return None;
        };
        if var.scope != cinder_tree::ScopeId::GLOBAL || var.kind != VarKind::Var {
            return None;
        }

        let op = match tree.lookup(var.name) {
            "fabs" | "fabsf" | "fabsl" => UnaryOpKind::FAbs,
            "sqrt" | "sqrtf" | "sqrtl" => UnaryOpKind::FSqrt,
            _ => return None,
        };

        debug_assert_eq!(args.len(), 1, "unary math intrinsic with bad arity");
        let arg = args[0];
        let ret_ty = self.lower_ir_ty(tree.expr_ty(expr));
        let value = self.lower_value_expr(stmt, arg);
        Some(
            self.func
                .append_op(*stmt, OpKind::UnaryOp { op, value }, ret_ty),
        )
    }

    fn lower_builtin(
        &mut self,
        stmt: &mut StmtId,
        args: &[ExprId],
        name: Name,
    ) -> Option<OpId> {
        let tree = self.tree;
        match tree.lookup(name) {
            "__builtin_va_start" => {
                self.func.flags |= FuncFlags::USES_VA_ARGS;
                let list_addr = self.lower_addressof(stmt, args[0]);
                Some(
                    self.func
                        .append_op(*stmt, OpKind::VaStart { list_addr }, IrTy::None),
                )
            }
            "__builtin_va_end" => None,
            "__builtin_va_copy" => {
                // All backends support bitwise copies of `va_list`; on
                // by-reference targets the source is an extra load away.
                let dest_addr = self.lower_addressof(stmt, args[0]);
                let mut src = self.lower_value_expr(stmt, args[1]);

                let target = self.unit.target;
                if target.va_list_byref() {
                    let load_ty = self.lower_ir_ty(tree.underlying(tree.expr_ty(args[1])));
                    src = self.func.append_op(
                        *stmt,
                        OpKind::Load {
                            src: MemLoc::Addr(src),
                        },
                        load_ty,
                    );
                }

                Some(self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Addr(dest_addr),
                        value: src,
                    },
                    IrTy::None,
                ))
            }
            "__builtin_popcount" | "__builtin_popcountl" | "__builtin_popcountll" => {
                Some(self.unary_builtin(stmt, args[0], UnaryOpKind::Popcnt, IrTy::I32))
            }
            "__builtin_clz" | "__builtin_clzl" | "__builtin_clzll" => {
                Some(self.unary_builtin(stmt, args[0], UnaryOpKind::Clz, IrTy::I32))
            }
            "__builtin_ctz" | "__builtin_ctzl" | "__builtin_ctzll" => {
                Some(self.unary_builtin(stmt, args[0], UnaryOpKind::Ctz, IrTy::I32))
            }
            "__builtin_bswap16" | "__builtin_bswap32" | "__builtin_bswap64" => {
                let value = self.lower_value_expr(stmt, args[0]);
                let ty = self.func.op(value).ty.clone();
                Some(self.func.append_op(
                    *stmt,
                    OpKind::UnaryOp {
                        op: UnaryOpKind::Rev,
                        value,
                    },
                    ty,
                ))
            }
            "__builtin_memset" => self.bulk_memory_call(stmt, "memset", args, IrTy::POINTER),
            "__builtin_memcpy" => self.bulk_memory_call(stmt, "memcpy", args, IrTy::POINTER),
            "__builtin_memmove" => self.bulk_memory_call(stmt, "memmove", args, IrTy::POINTER),
            "__builtin_memcmp" => self.bulk_memory_call(stmt, "memcmp", args, IrTy::I32),
            "__builtin_unreachable" => None,
            other => panic!("unrecognised builtin '{other}'"),
        }
    }

    fn unary_builtin(
        &mut self,
        stmt: &mut StmtId,
        arg: ExprId,
        op: UnaryOpKind,
        ty: IrTy,
    ) -> OpId {
        let value = self.lower_value_expr(stmt, arg);
        self.func.append_op(*stmt, OpKind::UnaryOp { op, value }, ty)
    }

    /// Lower a bulk-memory builtin as a call to the well-known libc
    /// symbol, creating its (undefined, external) function global on
    /// first use.
    fn bulk_memory_call(
        &mut self,
        stmt: &mut StmtId,
        symbol: &str,
        args: &[ExprId],
        ret_ty: IrTy,
    ) -> Option<OpId> {
        let arg_ops: Vec<OpId> = args
            .iter()
            .map(|&arg| self.lower_value_expr(stmt, arg))
            .collect();
        let param_tys: Vec<IrTy> = arg_ops
            .iter()
            .map(|&op| self.func.op(op).ty.clone())
            .collect();

        let func_ty = FuncTy {
            ret: Box::new(ret_ty.clone()),
            params: param_tys,
            flags: FuncTyFlags::empty(),
        };

        let glb = self.well_known_func(symbol, &func_ty);
        let target_op = self.func.append_op(
            *stmt,
            OpKind::Addr {
                target: AddrTarget::Glb(glb),
            },
            IrTy::POINTER,
        );

        self.func.flags |= FuncFlags::MAKES_CALL;
        Some(self.func.append_op(
            *stmt,
            OpKind::Call {
                func_ty,
                target: target_op,
                args: arg_ops,
            },
            ret_ty,
        ))
    }

    /// Get or create the external function global for a well-known libc
    /// symbol.
    fn well_known_func(&mut self, symbol: &str, func_ty: &FuncTy) -> cinder_ir::GlbId {
        let name = self.tree.intern(symbol);
        let key = VarKey::global(name);
        if let Some(glb) = self.global_refs.get_exact(key) {
            return glb;
        }
        let glb = self.unit.add_global(
            GlbKind::Func,
            IrTy::Func(func_ty.clone()),
            cinder_ir::DefKind::Undefined,
            Some(symbol.to_owned()),
        );
        self.unit.global_mut(glb).linkage = cinder_ir::Linkage::External;
        self.global_refs.insert(key, glb);
        glb
    }

    // -- Compound literals --

    /// Lower a compound literal. With an enclosing address the literal
    /// writes in place; otherwise a fresh local is allocated. Scalar
    /// literals consumed by value skip memory entirely.
    pub(crate) fn lower_compound_literal(
        &mut self,
        stmt: &mut StmtId,
        address: Option<OpId>,
        mode: ClMode,
        expr: ExprId,
    ) -> OpId {
        let tree = self.tree;
        let ExprKind::CompoundLiteral { init_list } = &tree.expr(expr).kind else {
            unreachable!();
        };

        if mode == ClMode::Load && tree.is_scalar(tree.expr_ty(expr)) {
            debug_assert_eq!(init_list.inits.len(), 1, "scalar literal with several inits");
            let e = match &*init_list.inits[0].init {
                cinder_tree::Init::Expr(e) => *e,
                cinder_tree::Init::List(_) => {
                    panic!("scalar literal initialised by a nested list")
                }
            };
            return self.lower_value_expr(stmt, e);
        }

        let var_ty = self.lower_ir_ty(init_list.ty);
        let init_list = init_list.clone();

        let address = address.unwrap_or_else(|| {
            let lcl = self.func.add_local(var_ty.clone());
            self.func.append_op(
                *stmt,
                OpKind::Addr {
                    target: AddrTarget::Lcl(lcl),
                },
                IrTy::POINTER,
            )
        });

        self.lower_init_list(stmt, address, &init_list);

        match mode {
            ClMode::Load => self.func.append_op(
                *stmt,
                OpKind::Load {
                    src: MemLoc::Addr(address),
                },
                var_ty,
            ),
            ClMode::Addr => address,
        }
    }
}

#[cfg(test)]
mod tests;
