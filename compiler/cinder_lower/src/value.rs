//! Constant value trees for data globals.
//!
//! Global initialisers never emit ops; they evaluate to a [`VarValue`]
//! tree whose leaves are integers, floats, string bytes, or relocatable
//! addresses of other globals plus a constant offset.

use cinder_ir::{
    DataCategory, DefKind, GlbId, GlbKind, GlbVar, IrTy, StrValue, Unit, VarValue, VarValueKind,
};
use cinder_target::Target;
use cinder_tree::{
    Cnst, ExprId, ExprKind, Init, InitList, StrCnst, TyId, TyKind, Tree, TypeQualifiers, UnaryOp,
    VarKind, WellKnown,
};

use crate::init::init_list_layout;
use crate::refs::{GlobalRefs, VarKey};
use crate::ty::{lower_ty, member_by_name, ty_info};

/// Intern a string-literal global.
///
/// Embedded-NUL-free narrow strings consumed through `const char *`
/// stay `StringLiteral` (mergeable); everything else, including all wide
/// strings, is `ConstData`.
pub(crate) fn str_literal_global(
    tree: &Tree,
    unit: &mut Unit,
    consumer_ty: TyId,
    s: &StrCnst,
) -> GlbId {
    let (char_ty, mut is_data, value, len) = match s {
        StrCnst::Ascii(bytes) => (
            IrTy::I8,
            bytes.contains(&0),
            StrValue::Bytes(bytes.clone()),
            bytes.len(),
        ),
        StrCnst::Wide(units) => (IrTy::I32, true, StrValue::Wide(units.clone()), units.len()),
    };

    let const_ptr = matches!(
        tree.ty(consumer_ty),
        TyKind::Pointer { quals, .. } if quals.contains(TypeQualifiers::CONST)
    );
    if !const_ptr {
        is_data = true;
    }

    let array_ty = IrTy::Array {
        elem: Box::new(char_ty),
        len: len as u64 + 1,
    };

    let glb = unit.add_global(GlbKind::Data, array_ty.clone(), DefKind::Defined, None);
    unit.global_mut(glb).var = Some(GlbVar {
        category: if is_data {
            DataCategory::ConstData
        } else {
            DataCategory::StringLiteral
        },
        ty: array_ty.clone(),
        value: VarValue {
            ty: array_ty,
            kind: VarValueKind::Str(value),
        },
    });
    glb
}

/// Add a constant byte offset to a relocatable address value.
fn offset_base(mut base: VarValue, extra: u64) -> VarValue {
    match &mut base.kind {
        VarValueKind::Addr { offset, .. } => {
            *offset += extra;
            base
        }
        other => panic!("expected a relocatable address, found {other:?}"),
    }
}

/// Context for evaluating one global initialiser.
pub(crate) struct ValueLowerer<'a> {
    pub tree: &'a Tree,
    pub unit: &'a mut Unit,
    pub global_refs: &'a GlobalRefs,
}

impl ValueLowerer<'_> {
    fn target(&self) -> Target {
        self.unit.target
    }

    fn lower_ir_ty(&self, ty: TyId) -> IrTy {
        let target = self.target();
        lower_ty(self.tree, &target, ty)
    }

    /// Evaluate a declarator initialiser to a constant value.
    pub fn lower_var_value(&mut self, init: &Init, var_ty: TyId) -> VarValue {
        match init {
            Init::Expr(e) => self.value_expr(*e, self.tree.expr_ty(*e)),
            Init::List(list) => self.value_init_list(list, var_ty),
        }
    }

    fn value_expr(&mut self, expr: ExprId, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        match &tree.expr(expr).kind {
            ExprKind::CompoundLiteral { .. } => {
                if matches!(tree.ty(tree.expr_ty(expr)), TyKind::Array { .. }) {
                    return self.value_addr(expr, None, var_ty);
                }
                panic!("compound literal of non-array type in constant context");
            }
            ExprKind::Var(_) => self.value_var(expr, var_ty),
            ExprKind::Cast { .. } => self.value_cast(expr, var_ty),
            ExprKind::Unary {
                op: UnaryOp::AddressOf,
                ..
            } => self.value_addr(expr, None, var_ty),
            ExprKind::Binary { .. } => self.value_binary(expr, var_ty),
            ExprKind::Cnst(cnst) => self.value_cnst(expr, cnst.clone(), var_ty),
            other => panic!("unsupported constant expression {other:?}"),
        }
    }

    fn value_cnst(&mut self, expr: ExprId, cnst: Cnst, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        match cnst {
            Cnst::Int(v) => VarValue {
                ty: self.lower_ir_ty(var_ty),
                kind: VarValueKind::Int(v),
            },
            Cnst::Flt(v) => VarValue {
                ty: self.lower_ir_ty(var_ty),
                kind: VarValueKind::Flt(v),
            },
            Cnst::Str(s) => {
                if matches!(tree.ty(var_ty), TyKind::Array { .. }) {
                    // `char arr[N] = "..."` stores the bytes in place.
                    let value = match s {
                        StrCnst::Ascii(bytes) => StrValue::Bytes(bytes),
                        StrCnst::Wide(units) => StrValue::Wide(units),
                    };
                    return VarValue {
                        ty: self.lower_ir_ty(var_ty),
                        kind: VarValueKind::Str(value),
                    };
                }

                match s {
                    StrCnst::Ascii(_) => {
                        let glb =
                            str_literal_global(tree, self.unit, tree.expr_ty(expr), &s);
                        if matches!(tree.ty(var_ty), TyKind::Pointer { .. }) {
                            VarValue {
                                ty: self.lower_ir_ty(var_ty),
                                kind: VarValueKind::Addr { glb, offset: 0 },
                            }
                        } else {
                            self.unit
                                .global(glb)
                                .var
                                .as_ref()
                                .expect("literal global has a value")
                                .value
                                .clone()
                        }
                    }
                    StrCnst::Wide(_) => panic!("unimplemented: wide string globals"),
                }
            }
        }
    }

    fn value_var(&mut self, expr: ExprId, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        let ExprKind::Var(var) = &tree.expr(expr).kind else {
            unreachable!();
        };
        match var.kind {
            VarKind::Enumerator(value) => VarValue {
                ty: self.lower_ir_ty(var_ty),
                kind: VarValueKind::Int(value),
            },
            VarKind::Var => self.value_addr(expr, None, var_ty),
        }
    }

    fn value_binary(&mut self, expr: ExprId, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        let ExprKind::Binary { op, lhs, rhs } = &tree.expr(expr).kind else {
            unreachable!();
        };
        match op {
            cinder_tree::BinaryOp::Add => self.value_addr(*lhs, Some(*rhs), var_ty),
            other => panic!("unsupported binary operator {other:?} in a global initialiser"),
        }
    }

    fn value_cast(&mut self, expr: ExprId, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        let ExprKind::Cast { expr: inner } = &tree.expr(expr).kind else {
            unreachable!();
        };
        let from = tree.expr_ty(*inner);
        let to = tree.expr_ty(expr);

        let mut value = self.value_expr(*inner, to);

        let ptr_like = |ty: TyId| {
            matches!(
                tree.ty(ty),
                TyKind::Pointer { .. } | TyKind::Func { .. } | TyKind::Array { .. }
            )
        };

        if ptr_like(from) {
            if ptr_like(to) || tree.is_integral(to) {
                value.ty = self.lower_ir_ty(var_ty);
                return value;
            }
            panic!("unsupported pointer cast in constant expression");
        }

        if ptr_like(to) {
            if tree.well_known(from).is_some() {
                value.ty = self.lower_ir_ty(var_ty);
                return value;
            }
            panic!("unsupported cast to pointer in constant expression");
        }

        if let (Some(from_wk), Some(to_wk)) = (tree.well_known(from), tree.well_known(to)) {
            if from_wk.is_integral() && to_wk.is_fp() {
                let VarValueKind::Int(image) = value.kind else {
                    panic!("integer constant expected for int-to-float conversion");
                };
                let flt = match to_wk {
                    WellKnown::Half => panic!("unimplemented: constant cast to half"),
                    WellKnown::Float => {
                        if from_wk.is_signed() {
                            f64::from(image as i64 as f32)
                        } else {
                            f64::from(image as f32)
                        }
                    }
                    WellKnown::Double | WellKnown::LongDouble => {
                        if from_wk.is_signed() {
                            image as i64 as f64
                        } else {
                            image as f64
                        }
                    }
                    _ => unreachable!(),
                };
                return VarValue {
                    ty: self.lower_ir_ty(var_ty),
                    kind: VarValueKind::Flt(flt),
                };
            }

            if from_wk.is_integral() && to_wk.is_integral() {
                if let VarValueKind::Int(image) = value.kind {
                    return VarValue {
                        ty: self.lower_ir_ty(var_ty),
                        kind: VarValueKind::Int(image),
                    };
                }
            }
        }

        panic!("unsupported cast in constant expression");
    }

    /// Evaluate an address-shaped constant: a global (or literal) plus a
    /// constant byte offset.
    fn value_addr(&mut self, addr: ExprId, offset: Option<ExprId>, var_ty: TyId) -> VarValue {
        let tree = self.tree;
        let target = self.target();

        match &tree.expr(addr).kind {
            ExprKind::Unary {
                op: UnaryOp::AddressOf,
                expr: inner,
            } => {
                // `&(((T *)0)->member)` is the offsetof pattern and folds
                // to an integer constant.
                if let ExprKind::PointerAccess { lhs, member } = &tree.expr(*inner).kind {
                    if matches!(tree.expr(*lhs).kind, ExprKind::Cnst(Cnst::Int(0)))
                        || matches!(
                            &tree.expr(*lhs).kind,
                            ExprKind::Cast { expr: e }
                                if matches!(tree.expr(*e).kind, ExprKind::Cnst(Cnst::Int(0)))
                        )
                    {
                        let aggregate = tree.underlying(tree.expr_ty(*lhs));
                        let info = member_by_name(tree, &target, aggregate, *member);
                        debug_assert!(info.bitfield.is_none(), "address of a bitfield");
                        return VarValue {
                            ty: self.lower_ir_ty(var_ty),
                            kind: VarValueKind::Int(info.offset),
                        };
                    }
                }

                if matches!(tree.expr(*inner).kind, ExprKind::CompoundLiteral { .. }) {
                    return self.compound_literal_addr(*inner);
                }

                self.value_addr(*inner, offset, var_ty)
            }

            ExprKind::Cast { .. } => self.value_cast(addr, var_ty),

            ExprKind::Cnst(_) => {
                // `static int *p = &(int){10};` and friends: materialise
                // an anonymous global holding the constant.
                let ir_ty = self.lower_ir_ty(var_ty);
                let glb = self
                    .unit
                    .add_global(GlbKind::Data, ir_ty.clone(), DefKind::Defined, None);

                let offset = self.constant_offset(offset, var_ty);

                let value = self.value_expr(addr, var_ty);
                self.unit.global_mut(glb).var = Some(GlbVar {
                    category: DataCategory::Data,
                    ty: ir_ty.clone(),
                    value,
                });

                VarValue {
                    ty: ir_ty,
                    kind: VarValueKind::Addr { glb, offset },
                }
            }

            ExprKind::PointerAccess { lhs, member } => {
                let aggregate = tree.underlying(tree.expr_ty(*lhs));
                let info = member_by_name(tree, &target, aggregate, *member);
                let base = self.value_addr_boxed(*lhs, var_ty);
                offset_base(base, info.offset)
            }

            ExprKind::MemberAccess { lhs, member } => {
                let info = member_by_name(tree, &target, tree.expr_ty(*lhs), *member);
                let base = self.value_addr_boxed(*lhs, var_ty);
                offset_base(base, info.offset)
            }

            ExprKind::Binary { lhs, rhs, .. } => {
                let el = tree.underlying(tree.expr_ty(*lhs));
                let el_size = ty_info(tree, &target, el).size;
                let base = self.value_addr_boxed(*lhs, var_ty);

                let ExprKind::Cnst(Cnst::Int(index)) = &tree.expr(*rhs).kind else {
                    panic!("non-constant offset in a global address expression");
                };
                offset_base(base, el_size * index)
            }

            ExprKind::ArrayAccess { lhs, rhs } => {
                let el = tree.underlying(tree.expr_ty(*lhs));
                let el_size = ty_info(tree, &target, el).size;
                let base = self.value_addr_boxed(*lhs, var_ty);

                let ExprKind::Cnst(Cnst::Int(index)) = &tree.expr(*rhs).kind else {
                    panic!("non-constant index in a global address expression");
                };
                offset_base(base, el_size * index)
            }

            ExprKind::CompoundLiteral { init_list } => {
                if matches!(tree.ty(var_ty), TyKind::Pointer { .. })
                    && matches!(tree.ty(tree.expr_ty(addr)), TyKind::Array { .. })
                {
                    // Array literal decaying to a pointer: take an address.
                    return self.compound_literal_addr(addr);
                }
                let init_list = init_list.clone();
                self.value_init_list(&init_list, tree.expr_ty(addr))
            }

            ExprKind::Var(var) => {
                let glb = self
                    .global_refs
                    .get(VarKey::of(var))
                    .unwrap_or_else(|| {
                        panic!(
                            "global '{}' referenced before declaration",
                            tree.lookup(var.name)
                        )
                    });

                let offset = self.constant_offset(offset, var_ty);

                VarValue {
                    ty: self.lower_ir_ty(var_ty),
                    kind: VarValueKind::Addr { glb, offset },
                }
            }

            other => panic!("unsupported address expression {other:?} in a global"),
        }
    }

    fn value_addr_boxed(&mut self, addr: ExprId, var_ty: TyId) -> VarValue {
        self.value_addr(addr, None, var_ty)
    }

    /// An optional element-count offset expression, scaled to bytes by
    /// the pointee size.
    fn constant_offset(&mut self, offset: Option<ExprId>, var_ty: TyId) -> u64 {
        let Some(offset) = offset else {
            return 0;
        };
        let value = self.value_expr(offset, var_ty);
        let VarValueKind::Int(count) = value.kind else {
            panic!("non-integer offset in a global address expression");
        };

        let target = self.target();
        let el = self.tree.underlying(var_ty);
        count * ty_info(self.tree, &target, el).size
    }

    /// Materialise a compound literal as an anonymous data global and
    /// return its address.
    fn compound_literal_addr(&mut self, literal: ExprId) -> VarValue {
        let tree = self.tree;
        let literal_ty = tree.expr_ty(literal);
        let glb_ty = self.lower_ir_ty(literal_ty);

        let glb = self
            .unit
            .add_global(GlbKind::Data, glb_ty.clone(), DefKind::Defined, None);

        let value = self.value_addr(literal, None, literal_ty);
        self.unit.global_mut(glb).var = Some(GlbVar {
            category: DataCategory::Data,
            ty: glb_ty,
            value,
        });

        VarValue {
            ty: IrTy::POINTER,
            kind: VarValueKind::Addr { glb, offset: 0 },
        }
    }

    fn value_init_list(&mut self, init_list: &InitList, var_ty: TyId) -> VarValue {
        let target = self.target();
        let layout = init_list_layout(self.tree, &target, init_list);

        let mut offsets = Vec::with_capacity(layout.len());
        let mut values = Vec::with_capacity(layout.len());

        for entry in &layout {
            if entry.bitfield.is_some() {
                panic!("unimplemented: bitfield initialisers in globals");
            }
            values.push(self.value_expr(entry.expr, self.tree.expr_ty(entry.expr)));
            offsets.push(entry.offset);
        }

        VarValue {
            ty: self.lower_ir_ty(var_ty),
            kind: VarValueKind::List { offsets, values },
        }
    }
}

#[cfg(test)]
mod tests;
