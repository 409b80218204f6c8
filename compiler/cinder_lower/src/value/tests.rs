use cinder_ir::{DefKind, VarValueKind};
use cinder_tree::{
    Cnst, Designator, ExprKind, ExternalDecl, Init, InitEntry, InitList, ScopeId, StorageClass,
    UnaryOp,
};
use pretty_assertions::assert_eq;

use crate::testing::fx;

#[test]
fn global_designated_initialiser_builds_a_value_list() {
    // struct { int x; int y; } v = { .y = 7 };
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("x", f.int), ("y", f.int)]);
    let y = f.name("y");
    let seven = f.int_cnst(7);
    let init = Init::List(InitList {
        ty: s_ty,
        inits: vec![InitEntry::designated(
            vec![Designator::Field(y)],
            Init::Expr(seven),
        )],
    });
    let decl = f.declaration(StorageClass::None, "v", ScopeId::GLOBAL, s_ty, Some(init));

    let unit = f.build_tu(vec![ExternalDecl::Declaration(decl)]);
    let global = unit.global_by_name("v").unwrap();

    let VarValueKind::List { offsets, values } = &global.var.as_ref().unwrap().value.kind
    else {
        panic!("aggregate initialiser evaluates to a value list");
    };
    assert_eq!(offsets, &vec![4]);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, VarValueKind::Int(7));
}

#[test]
fn address_of_global_with_constant_index() {
    // int a[4]; int *p = &a[1];
    let mut f = fx();
    let arr_ty = f.array(f.int, 4);
    let int_ptr = f.ptr(f.int);
    let decl_a = f.declaration(StorageClass::None, "a", ScopeId::GLOBAL, arr_ty, None);

    let a = f.var("a", ScopeId::GLOBAL, arr_ty);
    let one = f.int_cnst(1);
    let access = f.expr(ExprKind::ArrayAccess { lhs: a, rhs: one }, f.int);
    let addr = f.expr(
        ExprKind::Unary {
            op: UnaryOp::AddressOf,
            expr: access,
        },
        int_ptr,
    );
    let decl_p = f.declaration(
        StorageClass::None,
        "p",
        ScopeId::GLOBAL,
        int_ptr,
        Some(Init::Expr(addr)),
    );

    let unit = f.build_tu(vec![
        ExternalDecl::Declaration(decl_a),
        ExternalDecl::Declaration(decl_p),
    ]);

    let a_glb = unit.global_by_name("a").unwrap().id;
    let p = unit.global_by_name("p").unwrap();
    assert_eq!(
        p.var.as_ref().unwrap().value.kind,
        VarValueKind::Addr {
            glb: a_glb,
            offset: 4
        }
    );
}

#[test]
fn offsetof_pattern_folds_to_a_constant() {
    // long o = (long)&(((struct S *)0)->y); distilled to the address
    // expression the checker hands over.
    let mut f = fx();
    let s_ty = f.struct_ty("S", &[("x", f.int), ("y", f.int)]);
    let s_ptr = f.ptr(s_ty);
    let y = f.name("y");

    let zero = f.cnst(0, f.int);
    let null = f.expr(ExprKind::Cast { expr: zero }, s_ptr);
    let access = f.expr(
        ExprKind::PointerAccess {
            lhs: null,
            member: y,
        },
        f.int,
    );
    let int_ptr = f.ptr(f.int);
    let addr = f.expr(
        ExprKind::Unary {
            op: UnaryOp::AddressOf,
            expr: access,
        },
        int_ptr,
    );
    let decl_o = f.declaration(
        StorageClass::None,
        "o",
        ScopeId::GLOBAL,
        f.long,
        Some(Init::Expr(addr)),
    );

    let unit = f.build_tu(vec![ExternalDecl::Declaration(decl_o)]);
    let global = unit.global_by_name("o").unwrap();
    assert_eq!(global.var.as_ref().unwrap().value.kind, VarValueKind::Int(4));
}

#[test]
fn constant_compound_literal_address_creates_an_anonymous_global() {
    // static int *p = &(int){10}; (the checker folds the scalar literal
    // to its constant)
    let mut f = fx();
    let int_ptr = f.ptr(f.int);
    let ten = f.int_cnst(10);
    let addr = f.expr(
        ExprKind::Unary {
            op: UnaryOp::AddressOf,
            expr: ten,
        },
        int_ptr,
    );
    let decl_p = f.declaration(
        StorageClass::Static,
        "p",
        ScopeId::GLOBAL,
        int_ptr,
        Some(Init::Expr(addr)),
    );

    let unit = f.build_tu(vec![ExternalDecl::Declaration(decl_p)]);
    let p = unit.global_by_name(".p").unwrap();

    let &VarValueKind::Addr { glb, offset: 0 } = &p.var.as_ref().unwrap().value.kind else {
        panic!("pointer initialiser must be a relocatable address");
    };
    let anon = unit.global(glb);
    assert_eq!(anon.name, None);
    assert_eq!(anon.def, DefKind::Defined);
    assert_eq!(anon.var.as_ref().unwrap().value.kind, VarValueKind::Int(10));
}

#[test]
fn integer_to_float_constant_conversion() {
    // double d = (double)3;
    let mut f = fx();
    let three = f.int_cnst(3);
    let cast = f.expr(ExprKind::Cast { expr: three }, f.double);
    let decl_d = f.declaration(
        StorageClass::None,
        "d",
        ScopeId::GLOBAL,
        f.double,
        Some(Init::Expr(cast)),
    );

    let unit = f.build_tu(vec![ExternalDecl::Declaration(decl_d)]);
    let global = unit.global_by_name("d").unwrap();
    assert_eq!(
        global.var.as_ref().unwrap().value.kind,
        VarValueKind::Flt(3.0)
    );
}

#[test]
fn string_array_global_stores_bytes_in_place() {
    // char s[6] = "hello";
    let mut f = fx();
    let arr_ty = f.array(f.char_ty, 6);
    let lit = f.expr(
        ExprKind::Cnst(Cnst::Str(cinder_tree::StrCnst::Ascii(b"hello".to_vec()))),
        arr_ty,
    );
    let decl_s = f.declaration(
        StorageClass::None,
        "s",
        ScopeId::GLOBAL,
        arr_ty,
        Some(Init::Expr(lit)),
    );

    let unit = f.build_tu(vec![ExternalDecl::Declaration(decl_s)]);
    let global = unit.global_by_name("s").unwrap();
    assert_eq!(
        global.var.as_ref().unwrap().value.kind,
        VarValueKind::Str(cinder_ir::StrValue::Bytes(b"hello".to_vec()))
    );
}
