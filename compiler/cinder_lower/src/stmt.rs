//! Statement lowering and CFG construction.
//!
//! Statement lowering works block-to-block: each statement is lowered
//! into a current basic block and returns the block lowering continues
//! in. Loops, switches and scopes communicate through the jumps, cases
//! and defers stacks, each opened by an explicit marker variant.

use cinder_ir::{
    AddrTarget, BlockId, IrTy, MemLoc, OpKind, StmtId, SwitchCase,
};
use cinder_tree::{
    Declaration, DeclarationOrExpr, ExprId, IterStmt, JumpStmt, LabeledStmt, SelectStmt,
    StmtId as TreeStmtId, StmtKind, StorageClass, TyKind, VarDeclaration,
};

use crate::func::{CaseEntry, DeferEntry, FuncBuilder, Jump};
use crate::unit::lower_global_var;

/// The two blocks `break` and `continue` need to know about.
struct Loop {
    entry: BlockId,
    exit: BlockId,
}

impl FuncBuilder<'_> {
    /// Lower a statement into `block`, returning the block lowering
    /// continues in.
    pub(crate) fn lower_stmt(&mut self, block: BlockId, id: TreeStmtId) -> BlockId {
        let tree = self.tree;
        match tree.stmt(id) {
            StmtKind::Null => block,
            StmtKind::Expr(e) => {
                let mut stmt = self.func.alloc_stmt(block);
                self.lower_expr(&mut stmt, *e);
                self.block_of(stmt)
            }
            StmtKind::Declaration(decl) => {
                let mut stmt = self.func.alloc_stmt(block);
                self.lower_declaration_into(&mut stmt, decl);
                self.block_of(stmt)
            }
            StmtKind::Compound(stmts) => self.lower_compound(block, stmts),
            StmtKind::Jump(jump) => self.lower_jump(block, jump),
            StmtKind::Select(select) => match select {
                SelectStmt::If { cond, body } => self.lower_if(block, *cond, *body),
                SelectStmt::IfElse {
                    cond,
                    body,
                    else_body,
                } => self.lower_if_else(block, *cond, *body, *else_body),
                SelectStmt::Switch { ctrl, body } => self.lower_switch(block, *ctrl, *body),
            },
            StmtKind::Iter(iter) => self.lower_iter(block, iter),
            StmtKind::Labeled(labeled) => self.lower_labeled(block, labeled),
            StmtKind::Defer(inner) => {
                self.defers.push(DeferEntry::Defer(*inner));
                block
            }
        }
    }

    // -- Scopes and defers --

    fn lower_compound(&mut self, mut block: BlockId, stmts: &[TreeStmtId]) -> BlockId {
        self.defers.push(DeferEntry::NewScope);

        for &s in stmts {
            block = self.lower_stmt(block, s);
        }

        // Scope exit runs the scope's deferred statements in LIFO order.
        while let Some(entry) = self.defers.pop() {
            match entry {
                DeferEntry::NewScope => break,
                DeferEntry::Defer(s) => block = self.lower_stmt(block, s),
            }
        }

        block
    }

    /// Run pending deferred statements up to (but not popping) the
    /// nearest scope marker, for early exits (`return`/`break`/
    /// `continue`).
    pub(crate) fn run_pending_defers(&mut self, stmt: &mut StmtId) {
        *stmt = self.func.alloc_stmt(self.block_of(*stmt));

        let mut pending = Vec::new();
        for entry in self.defers.iter().rev() {
            match entry {
                DeferEntry::NewScope => break,
                DeferEntry::Defer(s) => pending.push(*s),
            }
        }

        for s in pending {
            let block = self.lower_stmt(self.block_of(*stmt), s);
            *stmt = self.func.alloc_stmt(block);
        }
    }

    // -- Selection --

    fn lower_if(&mut self, block: BlockId, cond: ExprId, body: TreeStmtId) -> BlockId {
        let mut cond_stmt = self.func.alloc_stmt(block);
        let cond_op = self.lower_value_expr(&mut cond_stmt, cond);
        let pre_bb = self.block_of(cond_stmt);

        let body_bb = self.func.alloc_block();

        let br_cond_stmt = self.func.alloc_stmt(pre_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        let body_end = self.lower_stmt(body_bb, body);

        // A redundant branch keeps the invariant that every block ends
        // with a terminator op.
        let br_stmt = self.func.alloc_stmt(body_end);
        self.func.append_op(br_stmt, OpKind::Br, IrTy::None);

        let after_bb = self.func.alloc_block();
        self.func.make_split(pre_bb, body_bb, after_bb);
        self.func.make_merge(body_end, after_bb);

        after_bb
    }

    fn lower_if_else(
        &mut self,
        block: BlockId,
        cond: ExprId,
        body: TreeStmtId,
        else_body: TreeStmtId,
    ) -> BlockId {
        let mut cond_stmt = self.func.alloc_stmt(block);
        let cond_op = self.lower_value_expr(&mut cond_stmt, cond);
        let pre_bb = self.block_of(cond_stmt);

        let body_bb = self.func.alloc_block();
        let body_end = self.lower_stmt(body_bb, body);

        let else_bb = self.func.alloc_block();
        let else_end = self.lower_stmt(else_bb, else_body);

        let after_bb = self.func.alloc_block();

        self.func.make_split(pre_bb, body_bb, else_bb);
        let br_cond_stmt = self.func.alloc_stmt(pre_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        let body_br = self.func.alloc_stmt(body_end);
        self.func.append_op(body_br, OpKind::Br, IrTy::None);
        self.func.make_merge(body_end, after_bb);

        let else_br = self.func.alloc_stmt(else_end);
        self.func.append_op(else_br, OpKind::Br, IrTy::None);
        self.func.make_merge(else_end, after_bb);

        after_bb
    }

    fn lower_switch(&mut self, block: BlockId, ctrl: ExprId, body: TreeStmtId) -> BlockId {
        // A switch opens both a case scope and a jump scope: `break`
        // belongs to the switch, `continue` to the enclosing loop.
        self.jumps.push(Jump::NewLoop);
        self.cases.push(CaseEntry::NewSwitch);

        let mut ctrl_stmt = self.func.alloc_stmt(block);
        let ctrl_op = self.lower_value_expr(&mut ctrl_stmt, ctrl);
        let header_bb = self.block_of(ctrl_stmt);

        let switch_stmt = self.func.alloc_stmt(header_bb);
        self.func
            .append_op(switch_stmt, OpKind::BrSwitch { value: ctrl_op }, IrTy::None);

        let body_bb = self.func.alloc_block();
        let body_end = self.lower_stmt(body_bb, body);

        let after_bb = self.func.alloc_block();
        self.func.make_merge(body_end, after_bb);
        let br_stmt = self.func.alloc_stmt(body_end);
        self.func.append_op(br_stmt, OpKind::Br, IrTy::None);

        let mut cases = Vec::new();
        let mut default_target = None;
        while let Some(entry) = self.cases.pop() {
            match entry {
                CaseEntry::NewSwitch => break,
                CaseEntry::Case { value, target } => cases.push(SwitchCase { value, target }),
                CaseEntry::Default { target } => default_target = Some(target),
            }
        }

        // Unmatched values flow to the default, or past the switch when
        // there is none.
        self.func
            .make_switch(header_bb, cases, default_target.unwrap_or(after_bb));

        let mut continues = Vec::new();
        while let Some(jump) = self.jumps.pop() {
            match jump {
                Jump::NewLoop => break,
                Jump::Break(bb) => {
                    self.func.make_merge(bb, after_bb);
                    let br = self.func.alloc_stmt(bb);
                    self.func.append_op(br, OpKind::Br, IrTy::None);
                }
                Jump::Continue(bb) => continues.push(Jump::Continue(bb)),
            }
        }
        // Continues belong to the enclosing loop.
        self.jumps.extend(continues);

        after_bb
    }

    // -- Iteration --

    fn lower_iter(&mut self, block: BlockId, iter: &IterStmt) -> BlockId {
        self.jumps.push(Jump::NewLoop);

        let loop_blocks = match iter {
            IterStmt::While { cond, body } => self.lower_while(block, *cond, *body),
            IterStmt::DoWhile { cond, body } => self.lower_do_while(block, *cond, *body),
            IterStmt::For {
                init,
                cond,
                iter,
                body,
            } => self.lower_for(block, init.as_ref(), *cond, *iter, *body),
        };

        while let Some(jump) = self.jumps.pop() {
            match jump {
                Jump::NewLoop => return loop_blocks.exit,
                Jump::Break(bb) => {
                    self.func.make_merge(bb, loop_blocks.exit);
                    let br = self.func.alloc_stmt(bb);
                    self.func.append_op(br, OpKind::Br, IrTy::None);
                }
                Jump::Continue(bb) => {
                    self.func.make_merge(bb, loop_blocks.entry);
                    let br = self.func.alloc_stmt(bb);
                    self.func.append_op(br, OpKind::Br, IrTy::None);
                }
            }
        }

        panic!("loop marker missing from the jumps stack");
    }

    fn lower_while(&mut self, block: BlockId, cond: ExprId, body: TreeStmtId) -> Loop {
        let cond_bb = self.func.alloc_block();
        self.func.make_merge(block, cond_bb);
        let pre_stmt = self.func.alloc_stmt(block);
        self.func.append_op(pre_stmt, OpKind::Br, IrTy::None);

        let mut cond_stmt = self.func.alloc_stmt(cond_bb);
        let cond_op = self.lower_value_expr(&mut cond_stmt, cond);
        let cond_end_bb = self.block_of(cond_stmt);
        let br_cond_stmt = self.func.alloc_stmt(cond_end_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        let body_bb = self.func.alloc_block();
        let body_end = self.lower_stmt(body_bb, body);
        let after_bb = self.func.alloc_block();

        self.func.make_split(cond_end_bb, body_bb, after_bb);

        self.func.make_merge(body_end, cond_bb);
        let br_stmt = self.func.alloc_stmt(body_end);
        self.func.append_op(br_stmt, OpKind::Br, IrTy::None);

        Loop {
            entry: cond_bb,
            exit: after_bb,
        }
    }

    fn lower_do_while(&mut self, block: BlockId, cond: ExprId, body: TreeStmtId) -> Loop {
        let pre_stmt = self.func.alloc_stmt(block);
        self.func.append_op(pre_stmt, OpKind::Br, IrTy::None);

        let body_bb = self.func.alloc_block();
        self.func.make_merge(block, body_bb);

        let body_end = self.lower_stmt(body_bb, body);

        let cond_bb = self.func.alloc_block();
        let mut cond_stmt = self.func.alloc_stmt(cond_bb);
        let cond_op = self.lower_value_expr(&mut cond_stmt, cond);
        let cond_end_bb = self.block_of(cond_stmt);
        let br_cond_stmt = self.func.alloc_stmt(cond_end_bb);
        self.func
            .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

        self.func.make_merge(body_end, cond_bb);
        let br_stmt = self.func.alloc_stmt(body_end);
        self.func.append_op(br_stmt, OpKind::Br, IrTy::None);

        let after_bb = self.func.alloc_block();
        self.func.make_split(cond_end_bb, body_bb, after_bb);

        Loop {
            entry: cond_bb,
            exit: after_bb,
        }
    }

    fn lower_for(
        &mut self,
        block: BlockId,
        init: Option<&DeclarationOrExpr>,
        cond: Option<ExprId>,
        iter: Option<ExprId>,
        body: TreeStmtId,
    ) -> Loop {
        let mut before_cond_bb = block;
        let mut before_body_bb = block;
        let mut after_cond_bb = block;

        if let Some(init) = init {
            let mut init_stmt = self.func.alloc_stmt(before_cond_bb);
            match init {
                DeclarationOrExpr::Decl(decl) => {
                    self.lower_declaration_into(&mut init_stmt, decl);
                }
                DeclarationOrExpr::Expr(e) => {
                    self.lower_expr(&mut init_stmt, *e);
                }
            }
            let bb = self.block_of(init_stmt);
            before_cond_bb = bb;
            before_body_bb = bb;
            after_cond_bb = bb;
        }

        if let Some(cond) = cond {
            let cond_bb = self.func.alloc_block();
            self.func.make_merge(before_cond_bb, cond_bb);
            let to_cond = self.func.alloc_stmt(before_cond_bb);
            self.func.append_op(to_cond, OpKind::Br, IrTy::None);

            let mut cond_stmt = self.func.alloc_stmt(cond_bb);
            let cond_op = self.lower_value_expr(&mut cond_stmt, cond);
            let cond_end_bb = self.block_of(cond_stmt);
            let br_cond_stmt = self.func.alloc_stmt(cond_end_bb);
            self.func
                .append_op(br_cond_stmt, OpKind::BrCond { cond: cond_op }, IrTy::None);

            before_body_bb = cond_bb;
            after_cond_bb = cond_end_bb;
        } else {
            let to_body = self.func.alloc_stmt(before_body_bb);
            self.func.append_op(to_body, OpKind::Br, IrTy::None);
        }

        let body_bb = self.func.alloc_block();
        if cond.is_none() {
            self.func.make_merge(after_cond_bb, body_bb);
            before_body_bb = body_bb;
        }

        let body_end = self.lower_stmt(body_bb, body);
        let mut end_body_bb = body_end;

        if let Some(iter) = iter {
            let iter_bb = self.func.alloc_block();
            self.func.make_merge(body_end, iter_bb);
            let to_iter = self.func.alloc_stmt(body_end);
            self.func.append_op(to_iter, OpKind::Br, IrTy::None);

            let mut iter_stmt = self.func.alloc_stmt(iter_bb);
            self.lower_expr(&mut iter_stmt, iter);
            end_body_bb = self.block_of(iter_stmt);
        }

        let end_stmt = self.func.alloc_stmt(end_body_bb);
        self.func.append_op(end_stmt, OpKind::Br, IrTy::None);
        self.func.make_merge(end_body_bb, before_body_bb);

        let after_body_bb = self.func.alloc_block();
        if cond.is_some() {
            self.func.make_split(after_cond_bb, body_bb, after_body_bb);
        }

        // `continue` re-enters at the iteration expression when there is
        // one, otherwise at the tail of the body (which branches back to
        // the condition).
        Loop {
            entry: end_body_bb,
            exit: after_body_bb,
        }
    }

    // -- Labels and jumps --

    fn lower_labeled(&mut self, block: BlockId, labeled: &LabeledStmt) -> BlockId {
        let next_bb = self.func.alloc_block();
        self.func.make_merge(block, next_bb);
        let br_stmt = self.func.alloc_stmt(block);
        self.func.append_op(br_stmt, OpKind::Br, IrTy::None);

        let inner = match labeled {
            LabeledStmt::Label { name, stmt } => {
                self.labels.push((*name, next_bb));
                *stmt
            }
            LabeledStmt::Case { value, stmt } => {
                self.cases.push(CaseEntry::Case {
                    value: *value,
                    target: next_bb,
                });
                *stmt
            }
            LabeledStmt::Default { stmt } => {
                self.cases.push(CaseEntry::Default { target: next_bb });
                *stmt
            }
        };

        self.lower_stmt(next_bb, inner)
    }

    fn lower_jump(&mut self, block: BlockId, jump: &JumpStmt) -> BlockId {
        let mut stmt = self.func.alloc_stmt(block);
        match jump {
            JumpStmt::Return { expr } => self.lower_ret(&mut stmt, *expr),
            JumpStmt::Goto { label } => {
                let br_stmt = self.func.alloc_stmt(self.block_of(stmt));
                let br = self.func.append_op(br_stmt, OpKind::Br, IrTy::None);
                // The edge is installed once every label has a block.
                self.pending_gotos.push((br, *label));
                self.func.alloc_block()
            }
            JumpStmt::Break => {
                self.run_pending_defers(&mut stmt);
                self.jumps.push(Jump::Break(self.block_of(stmt)));
                self.func.alloc_block()
            }
            JumpStmt::Continue => {
                self.run_pending_defers(&mut stmt);
                self.jumps.push(Jump::Continue(self.block_of(stmt)));
                self.func.alloc_block()
            }
        }
    }

    fn lower_ret(&mut self, stmt: &mut StmtId, expr: Option<ExprId>) -> BlockId {
        self.run_pending_defers(stmt);

        let value = expr.map(|e| {
            let v = self.lower_value_expr(stmt, e);
            self.store_load_if_needed(stmt, v)
        });

        *stmt = self.func.alloc_stmt(self.block_of(*stmt));

        let ret_ty = expr.map_or(IrTy::None, |e| self.lower_ir_ty(self.tree.expr_ty(e)));
        self.func.append_op(*stmt, OpKind::Ret { value }, ret_ty);

        let block = self.block_of(*stmt);
        self.func.make_ret(block);

        self.func.alloc_block()
    }

    // -- Declarations --

    /// Lower a block-scope declaration. Automatic variables lower here;
    /// `static`, `extern`, function and typedef declarators take the
    /// global pathway.
    pub(crate) fn lower_declaration_into(
        &mut self,
        stmt: &mut StmtId,
        decl: &Declaration,
    ) {
        if decl.storage == StorageClass::Typedef {
            return;
        }

        for declarator in &decl.declarators {
            let is_func = matches!(self.tree.ty(declarator.ty), TyKind::Func { .. });
            let automatic = matches!(
                decl.storage,
                StorageClass::None | StorageClass::Auto | StorageClass::Register
            );

            if !is_func && automatic {
                self.lower_auto_var(stmt, declarator);
            } else {
                let func_name = self.func.name.clone();
                lower_global_var(
                    self.tree,
                    self.unit,
                    self.global_refs,
                    Some(&mut self.refs),
                    Some(&func_name),
                    decl.storage,
                    decl.func_specifiers,
                    declarator,
                );
            }
        }
    }

    fn lower_auto_var(&mut self, stmt: &mut StmtId, decl: &VarDeclaration) {
        let var_ty = self.lower_ir_ty(decl.ty);
        let lcl = self.declare_var(&decl.var, &var_ty);

        let assignment = if let Some(init) = &decl.init {
            let address = lcl.map(|lcl| {
                self.func.append_op(
                    *stmt,
                    OpKind::Addr {
                        target: AddrTarget::Lcl(lcl),
                    },
                    IrTy::POINTER,
                )
            });
            self.lower_init(stmt, address, init)
        } else if lcl.is_none() {
            // Uninitialised scalars still need a defining op so every
            // later read has something to resolve to.
            Some(self.func.append_op(*stmt, OpKind::Undf, var_ty.clone()))
        } else {
            None
        };

        match (lcl, assignment) {
            (Some(lcl), Some(value)) => {
                // `char arr[N] = "..."` produces the literal's address;
                // copying the array means loading the global instead.
                let lcl_ty = self.func.lcl(lcl).ty.clone();
                if matches!(lcl_ty, IrTy::Array { .. }) {
                    if let OpKind::Addr {
                        target: AddrTarget::Glb(glb),
                    } = self.func.op(value).kind
                    {
                        let op = self.func.op_mut(value);
                        op.kind = OpKind::Load {
                            src: MemLoc::Glb(glb),
                        };
                        op.ty = lcl_ty;
                    }
                }

                self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Lcl(lcl),
                        value,
                    },
                    IrTy::None,
                );
            }
            (None, Some(value)) => {
                self.var_assg(*stmt, value, &decl.var);
            }
            _ => {}
        }
    }
}
