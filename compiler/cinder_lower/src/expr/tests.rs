use cinder_ir::{
    AddrTarget, BinaryOpKind, DataCategory, IrTy, MemLoc, OpCnst, OpFlags, OpKind, StrValue,
    UnaryOpKind, VarValueKind,
};
use cinder_tree::{Cnst, ExprKind, Init, InitEntry, InitList, ScopeId, StrCnst, UnaryOp};
use pretty_assertions::assert_eq;

use crate::testing::{func_named, fx, op_kinds, BODY};
use crate::BuildFlags;

#[test]
fn pointer_addition_scales_by_element_size() {
    // int *p; p + 3; (index is pointer-width per usual arithmetic)
    let mut f = fx();
    let int_ptr = f.ptr(f.int);
    let p = f.var("p", ScopeId::PARAMS, int_ptr);
    let three = f.cnst(3, f.long);
    let sum = f.expr(
        ExprKind::Binary {
            op: cinder_tree::BinaryOp::Add,
            lhs: p,
            rhs: three,
        },
        int_ptr,
    );
    let body_stmt = f.expr_stmt(sum);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("p", int_ptr)], body);

    let unit = f.build_tu_flags(vec![def], BuildFlags::SPILL_ALL);
    let func = func_named(&unit, "f");

    let addr_offset = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::AddrOffset {
                base,
                index: Some(index),
                scale,
                offset,
            } => Some((*base, *index, *scale, *offset)),
            _ => None,
        })
        .expect("pointer addition lowers to an address offset");

    let (base, index, scale, offset) = addr_offset;
    assert!(matches!(func.op(base).kind, OpKind::Load { .. }));
    assert_eq!(func.op(index).kind, OpKind::Cnst(OpCnst::Int(3)));
    assert_eq!(scale, 4);
    assert_eq!(offset, 0);
}

#[test]
fn pointer_difference_divides_by_element_size() {
    // int *a, *b; a - b;
    let mut f = fx();
    let int_ptr = f.ptr(f.int);
    let a = f.var("a", ScopeId::PARAMS, int_ptr);
    let b = f.var("b", ScopeId::PARAMS, int_ptr);
    let diff = f.expr(
        ExprKind::Binary {
            op: cinder_tree::BinaryOp::Sub,
            lhs: a,
            rhs: b,
        },
        f.long,
    );
    let body_stmt = f.expr_stmt(diff);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("a", int_ptr), ("b", int_ptr)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let sdiv = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::BinaryOp {
                op: BinaryOpKind::SDiv,
                lhs,
                rhs,
            } => Some((id, *lhs, *rhs)),
            _ => None,
        })
        .expect("pointer difference lowers through a signed division");

    let (sdiv_id, lhs, rhs) = sdiv;
    assert!(matches!(
        func.op(lhs).kind,
        OpKind::BinaryOp {
            op: BinaryOpKind::Sub,
            ..
        }
    ));
    assert_eq!(func.op(rhs).kind, OpKind::Cnst(OpCnst::Int(4)));
    // The result is a signed pointer-width integer.
    assert_eq!(func.op(sdiv_id).ty, IrTy::I64);
}

#[test]
fn short_circuit_and_builds_cfg_with_boolean_phi() {
    // a && b
    let mut f = fx();
    let a = f.var("a", ScopeId::PARAMS, f.int);
    let b = f.var("b", ScopeId::PARAMS, f.int);
    let and = f.expr(
        ExprKind::Binary {
            op: cinder_tree::BinaryOp::LogicalAnd,
            lhs: a,
            rhs: b,
        },
        f.int,
    );
    let body_stmt = f.expr_stmt(and);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("a", f.int), ("b", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    // entry, rhs, true, false, tail.
    assert_eq!(func.block_ids().len(), 5);

    let phi_values: Vec<u64> = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Phi { entries } => Some(
                entries
                    .iter()
                    .map(|e| match &func.op(e.value).kind {
                        OpKind::Cnst(OpCnst::Int(v)) => *v,
                        other => panic!("phi of non-constant {other:?}"),
                    })
                    .collect(),
            ),
            _ => None,
        })
        .expect("short-circuit result is a phi");

    let mut sorted = phi_values.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1]);
}

#[test]
fn aggregate_ternary_phis_addresses_then_loads() {
    // struct S s1, s2; c ? s1 : s2;
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("x", f.int), ("y", f.int)]);
    let decl_s1 = f.decl(cinder_tree::StorageClass::None, "s1", BODY, s_ty, None);
    let decl_s2 = f.decl(cinder_tree::StorageClass::None, "s2", BODY, s_ty, None);
    let c = f.var("c", ScopeId::PARAMS, f.int);
    let s1 = f.var("s1", BODY, s_ty);
    let s2 = f.var("s2", BODY, s_ty);
    let ternary = f.expr(
        ExprKind::Ternary {
            cond: c,
            then_expr: Some(s1),
            else_expr: s2,
        },
        s_ty,
    );
    let use_stmt = f.expr_stmt(ternary);
    let body = f.compound(vec![decl_s1, decl_s2, use_stmt]);
    let def = f.fn_def("f", f.void, &[("c", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let phi = func
        .op_ids_in_order()
        .into_iter()
        .find(|&id| matches!(func.op(id).kind, OpKind::Phi { .. }))
        .expect("aggregate ternary produces a phi");
    assert_eq!(func.op(phi).ty, IrTy::Pointer, "phi is over addresses");

    let load = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Load {
                src: MemLoc::Addr(addr),
            } if *addr == phi => Some(id),
            _ => None,
        })
        .expect("the phi of addresses is loaded");
    assert!(func.op(load).ty.is_aggregate());
}

#[test]
fn pointer_increment_uses_addr_offset() {
    // int *p; p++;
    let mut f = fx();
    let int_ptr = f.ptr(f.int);
    let p = f.var("p", ScopeId::PARAMS, int_ptr);
    let inc = f.expr(
        ExprKind::Unary {
            op: UnaryOp::PostfixInc,
            expr: p,
        },
        int_ptr,
    );
    let body_stmt = f.expr_stmt(inc);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("p", int_ptr)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let found = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::AddrOffset {
                index: Some(index),
                scale,
                ..
            } => Some((*index, *scale)),
            _ => None,
        })
        .expect("pointer increment lowers to an address offset");
    assert_eq!(func.op(found.0).kind, OpKind::Cnst(OpCnst::Int(1)));
    assert_eq!(found.1, 4);
}

#[test]
fn bool_conversion_compares_against_zero() {
    // (_Bool)x
    let mut f = fx();
    let x = f.var("x", ScopeId::PARAMS, f.int);
    let cast = f.expr(ExprKind::Cast { expr: x }, f.bool_ty);
    let body_stmt = f.expr_stmt(cast);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("x", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let neq = func
        .op_ids_in_order()
        .into_iter()
        .find(|&id| {
            matches!(
                func.op(id).kind,
                OpKind::BinaryOp {
                    op: BinaryOpKind::Neq,
                    ..
                }
            )
        })
        .expect("bool conversion compares non-zero");
    assert_eq!(func.op(neq).ty, IrTy::I1);
}

#[test]
fn sizeof_folds_to_a_constant() {
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("a", f.long), ("b", f.char_ty)]);
    let size_of = f.expr(ExprKind::SizeOf { ty: s_ty }, f.long);
    let body_stmt = f.expr_stmt(size_of);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(op_kinds(func)
        .iter()
        .any(|kind| *kind == OpKind::Cnst(OpCnst::Int(16))));
}

#[test]
fn address_of_deref_cancels() {
    // &*p adds no ops beyond the lowering of p.
    let mut f = fx();
    let int_ptr = f.ptr(f.int);
    let p = f.var("p", ScopeId::PARAMS, int_ptr);
    let deref = f.expr(
        ExprKind::Unary {
            op: UnaryOp::Indirection,
            expr: p,
        },
        f.int,
    );
    let addr = f.expr(
        ExprKind::Unary {
            op: UnaryOp::AddressOf,
            expr: deref,
        },
        int_ptr,
    );
    let body_stmt = f.expr_stmt(addr);
    let body = f.compound(vec![body_stmt]);
    let def = f.fn_def("f", f.void, &[("p", int_ptr)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    for kind in op_kinds(func) {
        assert!(
            !matches!(kind, OpKind::Load { .. } | OpKind::Addr { .. }),
            "&*p must not emit a load or address op, found {kind:?}"
        );
    }
}

#[test]
fn unused_read_still_emits_load() {
    // int x; x; (spill-all keeps the variable in memory, so the read is
    // an observable load)
    let mut f = fx();
    let decl_x = f.decl(cinder_tree::StorageClass::None, "x", BODY, f.int, None);
    let x = f.var("x", BODY, f.int);
    let use_stmt = f.expr_stmt(x);
    let body = f.compound(vec![decl_x, use_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu_flags(vec![def], BuildFlags::SPILL_ALL);
    let func = func_named(&unit, "f");

    let loads = op_kinds(func)
        .iter()
        .filter(|kind| matches!(kind, OpKind::Load { .. }))
        .count();
    assert_eq!(loads, 1);
}

#[test]
fn variadic_arguments_are_flagged() {
    // int printf(const char *, ...); printf("x", 1, 2);
    let mut f = fx();
    let const_char_ptr = f.const_ptr(f.char_ty);
    let printf_ty = f.func_ty(f.int, &[("fmt", const_char_ptr)], true);
    let printf_decl = f.declaration(
        cinder_tree::StorageClass::None,
        "printf",
        ScopeId::GLOBAL,
        printf_ty,
        None,
    );

    let fmt = f.expr(
        ExprKind::Cnst(Cnst::Str(StrCnst::Ascii(b"x".to_vec()))),
        const_char_ptr,
    );
    let one = f.int_cnst(1);
    let two = f.int_cnst(2);
    let target = f.var("printf", ScopeId::GLOBAL, printf_ty);
    let call = f.expr(
        ExprKind::Call {
            target,
            args: vec![fmt, one, two],
        },
        f.int,
    );
    let call_stmt = f.expr_stmt(call);
    let body = f.compound(vec![call_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![
        cinder_tree::ExternalDecl::Declaration(printf_decl),
        def,
    ]);
    let func = func_named(&unit, "f");

    assert!(func.flags.contains(cinder_ir::FuncFlags::MAKES_CALL));

    let call_args = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Call { func_ty, args, .. } => {
                assert!(func_ty.is_variadic());
                Some(args.clone())
            }
            _ => None,
        })
        .expect("call lowered");

    assert_eq!(call_args.len(), 3);
    assert!(!func.op(call_args[0]).flags.contains(OpFlags::VARIADIC_PARAM));
    assert!(func.op(call_args[1]).flags.contains(OpFlags::VARIADIC_PARAM));
    assert!(func.op(call_args[2]).flags.contains(OpFlags::VARIADIC_PARAM));
}

#[test]
fn builtin_popcount_lowers_to_an_op() {
    let mut f = fx();
    let builtin_name = f.name("__builtin_popcount");
    let target = f.expr(ExprKind::Builtin(builtin_name), f.int);
    let x = f.var("x", ScopeId::PARAMS, f.int);
    let call = f.expr(
        ExprKind::Call {
            target,
            args: vec![x],
        },
        f.int,
    );
    let call_stmt = f.expr_stmt(call);
    let body = f.compound(vec![call_stmt]);
    let def = f.fn_def("f", f.void, &[("x", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(op_kinds(func).iter().any(|kind| matches!(
        kind,
        OpKind::UnaryOp {
            op: UnaryOpKind::Popcnt,
            ..
        }
    )));
}

#[test]
fn fabs_call_is_an_intrinsic() {
    // fabs at global scope lowers straight to FABS.
    let mut f = fx();
    let fabs_ty = f.func_ty(f.double, &[("x", f.double)], false);
    let target = f.var("fabs", ScopeId::GLOBAL, fabs_ty);
    let x = f.var("x", ScopeId::PARAMS, f.double);
    let call = f.expr(
        ExprKind::Call {
            target,
            args: vec![x],
        },
        f.double,
    );
    let call_stmt = f.expr_stmt(call);
    let body = f.compound(vec![call_stmt]);
    let def = f.fn_def("f", f.void, &[("x", f.double)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(op_kinds(func).iter().any(|kind| matches!(
        kind,
        OpKind::UnaryOp {
            op: UnaryOpKind::FAbs,
            ..
        }
    )));
    assert!(!op_kinds(func)
        .iter()
        .any(|kind| matches!(kind, OpKind::Call { .. })));
}

#[test]
fn bitfield_member_reads_use_bitfield_load() {
    let mut f = fx();
    let flags_name = f.name("Flags");
    let field_name = f.name("mode");
    let s_ty = f.tree.alloc_ty(cinder_tree::TyKind::Aggregate {
        kind: cinder_tree::AggregateKind::Struct,
        name: flags_name,
        fields: vec![cinder_tree::Field {
            name: field_name,
            ty: f.int,
            bitfield_width: Some(3),
        }],
    });
    let decl_b = f.decl(cinder_tree::StorageClass::None, "b", BODY, s_ty, None);
    let b = f.var("b", BODY, s_ty);
    let access = f.expr(
        ExprKind::MemberAccess {
            lhs: b,
            member: field_name,
        },
        f.int,
    );
    let use_stmt = f.expr_stmt(access);
    let body = f.compound(vec![decl_b, use_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let bitfield = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::LoadBitfield { bitfield, .. } => Some(*bitfield),
            _ => None,
        })
        .expect("bitfield member read uses a bitfield load");
    assert_eq!(bitfield.width, 3);
}

#[test]
fn string_literal_interns_a_global() {
    // const char *s = "hi";
    let mut f = fx();
    let const_char_ptr = f.const_ptr(f.char_ty);
    let lit = f.expr(
        ExprKind::Cnst(Cnst::Str(StrCnst::Ascii(b"hi".to_vec()))),
        const_char_ptr,
    );
    let decl_s = f.decl(
        cinder_tree::StorageClass::None,
        "s",
        BODY,
        const_char_ptr,
        Some(Init::Expr(lit)),
    );
    let body = f.compound(vec![decl_s]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);

    let literal = unit
        .globals()
        .find(|g| {
            g.var
                .as_ref()
                .is_some_and(|var| var.category == DataCategory::StringLiteral)
        })
        .expect("string literal interned as a global");
    assert_eq!(
        literal.var.as_ref().unwrap().value.kind,
        VarValueKind::Str(StrValue::Bytes(b"hi".to_vec()))
    );
    assert_eq!(
        literal.ty,
        IrTy::Array {
            elem: Box::new(IrTy::I8),
            len: 3
        }
    );
}

#[test]
fn va_start_flags_the_function() {
    // __builtin_va_start(ap); with va_list modelled as a pointer.
    let mut f = fx();
    let va_list_ty = f.ptr(f.char_ty);
    let decl_ap = f.decl(cinder_tree::StorageClass::None, "ap", BODY, va_list_ty, None);
    let builtin = f.name("__builtin_va_start");
    let target = f.expr(ExprKind::Builtin(builtin), f.void);
    let ap = f.var("ap", BODY, va_list_ty);
    let call = f.expr(
        ExprKind::Call {
            target,
            args: vec![ap],
        },
        f.void,
    );
    let call_stmt = f.expr_stmt(call);
    let body = f.compound(vec![decl_ap, call_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(func.flags.contains(cinder_ir::FuncFlags::USES_VA_ARGS));
    assert!(op_kinds(func)
        .iter()
        .any(|kind| matches!(kind, OpKind::VaStart { .. })));
}

#[test]
fn scalar_compound_literal_skips_memory() {
    // (int){5} consumed as a value is just the expression.
    let mut f = fx();
    let five = f.int_cnst(5);
    let lit = f.expr(
        ExprKind::CompoundLiteral {
            init_list: InitList {
                ty: f.int,
                inits: vec![InitEntry::positional(Init::Expr(five))],
            },
        },
        f.int,
    );
    let use_stmt = f.expr_stmt(lit);
    let body = f.compound(vec![use_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(op_kinds(func)
        .iter()
        .any(|kind| *kind == OpKind::Cnst(OpCnst::Int(5))));
    assert!(!op_kinds(func)
        .iter()
        .any(|kind| matches!(kind, OpKind::MemSet { .. } | OpKind::Store { .. })));
}

#[test]
fn aggregate_compound_literal_materialises_a_local() {
    // (struct S){1, 2} used as a value: local + init stores + load.
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("x", f.int), ("y", f.int)]);
    let one = f.int_cnst(1);
    let two = f.int_cnst(2);
    let lit = f.expr(
        ExprKind::CompoundLiteral {
            init_list: InitList {
                ty: s_ty,
                inits: vec![
                    InitEntry::positional(Init::Expr(one)),
                    InitEntry::positional(Init::Expr(two)),
                ],
            },
        },
        s_ty,
    );
    let use_stmt = f.expr_stmt(lit);
    let body = f.compound(vec![use_stmt]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert_eq!(func.lcl_count(), 1);
    let kinds = op_kinds(func);
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::Addr { target: AddrTarget::Lcl(_) })));
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::MemSet { len: 8, .. })));
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::Load { src: MemLoc::Addr(_) })));
}
