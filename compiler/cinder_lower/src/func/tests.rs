use cinder_ir::{IrTy, LclFlags, MemLoc, OpCnst, OpKind, Term};
use cinder_tree::{ExprKind, Init, ScopeId, SelectStmt, StmtKind, StorageClass};
use pretty_assertions::assert_eq;

use crate::testing::{func_named, fx, op_kinds, BODY};
use crate::BuildFlags;

#[test]
fn empty_body_lowers_to_a_single_ret() {
    let mut f = fx();
    let body = f.compound(vec![]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert_eq!(func.block_ids().len(), 1);
    assert_eq!(op_kinds(func), vec![OpKind::Ret { value: None }]);
    assert!(matches!(func.block(func.entry()).term, Term::Ret));
}

#[test]
fn main_returns_an_implicit_zero() {
    let mut f = fx();
    let body = f.compound(vec![]);
    let def = f.fn_def("main", f.int, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "main");

    let kinds = op_kinds(func);
    assert_eq!(kinds.len(), 2);
    assert_eq!(kinds[0], OpKind::Cnst(OpCnst::Int(0)));
    let OpKind::Ret { value: Some(value) } = &kinds[1] else {
        panic!("main must return a value");
    };
    let value = *value;
    assert_eq!(func.op(value).kind, OpKind::Cnst(OpCnst::Int(0)));
}

#[test]
fn aggregate_params_become_flagged_locals() {
    // void f(int a, struct S s)
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("x", f.int), ("y", f.int)]);
    let body = f.compound(vec![]);
    let def = f.fn_def("f", f.void, &[("a", f.int), ("s", s_ty)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    // The IR signature decays the aggregate to a pointer.
    assert_eq!(func.func_ty.params, vec![IrTy::I32, IrTy::Pointer]);

    // One param mov for the scalar, one param address for the struct.
    let kinds = op_kinds(func);
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::Mov { value: None })));
    assert!(kinds.iter().any(|kind| matches!(kind, OpKind::Addr { .. })));

    let param_lcl = func
        .lcls()
        .find(|lcl| lcl.flags.contains(LclFlags::PARAM))
        .expect("aggregate param gets a flagged slot");
    assert!(param_lcl.ty.is_aggregate());
}

#[test]
fn ssa_completion_joins_branch_definitions() {
    // int x; if (c) x = 1; else x = 2; return x;
    let mut f = fx();
    let decl_x = f.decl(StorageClass::None, "x", BODY, f.int, None);
    let c = f.var("c", ScopeId::PARAMS, f.int);

    let x1 = f.var("x", BODY, f.int);
    let one = f.int_cnst(1);
    let assign1 = f.assign(x1, one, f.int);
    let then_stmt = f.expr_stmt(assign1);

    let x2 = f.var("x", BODY, f.int);
    let two = f.int_cnst(2);
    let assign2 = f.assign(x2, two, f.int);
    let else_stmt = f.expr_stmt(assign2);

    let if_else = f.stmt(StmtKind::Select(SelectStmt::IfElse {
        cond: c,
        body: then_stmt,
        else_body: else_stmt,
    }));
    let x3 = f.var("x", BODY, f.int);
    let ret = f.ret(Some(x3));
    let body = f.compound(vec![decl_x, if_else, ret]);
    let def = f.fn_def("f", f.int, &[("c", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let values: Vec<u64> = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Phi { entries } => Some(
                entries
                    .iter()
                    .map(|e| match &func.op(e.value).kind {
                        OpKind::Cnst(OpCnst::Int(v)) => *v,
                        other => panic!("unexpected phi input {other:?}"),
                    })
                    .collect(),
            ),
            _ => None,
        })
        .expect("the joined read becomes a phi");

    let mut sorted = values.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2]);

    // The declaration's undefined value is still there for the phi-free
    // entry path.
    assert!(op_kinds(func).iter().any(|kind| *kind == OpKind::Undf));
}

#[test]
fn trivial_phis_are_simplified_away() {
    // int x = 1; if (c) ; return x;
    let mut f = fx();
    let one = f.int_cnst(1);
    let decl_x = f.decl(StorageClass::None, "x", BODY, f.int, Some(Init::Expr(one)));
    let c = f.var("c", ScopeId::PARAMS, f.int);
    let null_body = f.stmt(StmtKind::Null);
    let if_stmt = f.stmt(StmtKind::Select(SelectStmt::If {
        cond: c,
        body: null_body,
    }));
    let x = f.var("x", BODY, f.int);
    let ret = f.ret(Some(x));
    let body = f.compound(vec![decl_x, if_stmt, ret]);
    let def = f.fn_def("f", f.int, &[("c", f.int)], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(
        !op_kinds(func)
            .iter()
            .any(|kind| matches!(kind, OpKind::Phi { .. })),
        "a single reaching definition leaves no phi behind"
    );

    // The return value is the constant itself.
    let ret_value = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Ret { value: Some(value) } => Some(*value),
            _ => None,
        })
        .expect("function returns a value");
    assert_eq!(func.op(ret_value).kind, OpKind::Cnst(OpCnst::Int(1)));
}

#[test]
fn spill_all_keeps_variables_in_memory() {
    // int x = 1; return x;
    let mut f = fx();
    let one = f.int_cnst(1);
    let decl_x = f.decl(StorageClass::None, "x", BODY, f.int, Some(Init::Expr(one)));
    let x = f.var("x", BODY, f.int);
    let ret = f.ret(Some(x));
    let body = f.compound(vec![decl_x, ret]);
    let def = f.fn_def("f", f.int, &[], body);

    let unit = f.build_tu_flags(vec![def], BuildFlags::SPILL_ALL);
    let func = func_named(&unit, "f");

    let kinds = op_kinds(func);
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::Store { dest: MemLoc::Lcl(_), .. })));
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::Load { src: MemLoc::Lcl(_) })));
}

#[test]
fn lowering_is_deterministic() {
    let mut f = fx();
    let c = f.var("c", ScopeId::PARAMS, f.int);
    let one = f.int_cnst(1);
    let two = f.int_cnst(2);
    let ternary = f.expr(
        ExprKind::Ternary {
            cond: c,
            then_expr: Some(one),
            else_expr: two,
        },
        f.int,
    );
    let ret = f.ret(Some(ternary));
    let body = f.compound(vec![ret]);
    let def = f.fn_def("f", f.int, &[("c", f.int)], body);

    let unit_a = f.build_tu(vec![def.clone()]);
    let unit_b = f.build_tu(vec![def]);

    assert_eq!(func_named(&unit_a, "f"), func_named(&unit_b, "f"));
}

#[test]
fn void_return_has_no_value() {
    let mut f = fx();
    let ret = f.ret(None);
    let body = f.compound(vec![ret]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    assert!(op_kinds(func)
        .iter()
        .any(|kind| *kind == OpKind::Ret { value: None }));
}
