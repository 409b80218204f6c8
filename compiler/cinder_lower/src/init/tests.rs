use cinder_ir::{IrTy, MemLoc, OpCnst, OpKind};
use cinder_tree::{Designator, Init, InitEntry, InitList, StorageClass, StrCnst};
use pretty_assertions::assert_eq;

use crate::testing::{func_named, fx, op_kinds, BODY};

#[test]
fn designated_init_zeroes_then_stores() {
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
    let decl_v = f.decl(StorageClass::None, "v", BODY, s_ty, Some(init));
    let body = f.compound(vec![decl_v]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");
    let kinds = op_kinds(func);

    let memset_pos = kinds
        .iter()
        .position(|kind| matches!(kind, OpKind::MemSet { len: 8, value: 0, .. }))
        .expect("whole-struct zero fill");
    let store_pos = kinds
        .iter()
        .position(|kind| matches!(kind, OpKind::Store { dest: MemLoc::Addr(_), .. }))
        .expect("store for the designated member");
    assert!(
        memset_pos < store_pos,
        "the zero fill precedes the member store"
    );

    // The store lands at offset 4 within the struct.
    assert!(kinds.iter().any(|kind| matches!(
        kind,
        OpKind::AddrOffset {
            index: None,
            offset: 4,
            ..
        }
    )));
    assert!(kinds.iter().any(|kind| *kind == OpKind::Cnst(OpCnst::Int(7))));
}

#[test]
fn index_designators_reposition_the_running_index() {
    // int a[4] = { 1, [2] = 3, 4 };
    let mut f = fx();
    let arr_ty = f.array(f.int, 4);
    let one = f.int_cnst(1);
    let three = f.int_cnst(3);
    let four = f.int_cnst(4);
    let init = Init::List(InitList {
        ty: arr_ty,
        inits: vec![
            InitEntry::positional(Init::Expr(one)),
            InitEntry::designated(vec![Designator::Index(2)], Init::Expr(three)),
            InitEntry::positional(Init::Expr(four)),
        ],
    });
    let decl_a = f.decl(StorageClass::None, "a", BODY, arr_ty, Some(init));
    let body = f.compound(vec![decl_a]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let mut offsets: Vec<u64> = op_kinds(func)
        .iter()
        .filter_map(|kind| match kind {
            OpKind::AddrOffset {
                index: None,
                offset,
                ..
            } => Some(*offset),
            _ => None,
        })
        .collect();
    offsets.sort_unstable();
    // Element 0 stores through the base address; [2] and the following
    // positional element land at 8 and 12.
    assert_eq!(offsets, vec![8, 12]);
}

#[test]
fn nested_lists_flatten_with_accumulated_offsets() {
    // struct { struct { int a; int b; } in; int c; } v = { { 1, 2 }, 3 };
    let mut f = fx();
    let inner = f.struct_ty("In", &[("a", f.int), ("b", f.int)]);
    let outer = f.struct_ty("Out", &[("in", inner), ("c", f.int)]);
    let one = f.int_cnst(1);
    let two = f.int_cnst(2);
    let three = f.int_cnst(3);
    let init = Init::List(InitList {
        ty: outer,
        inits: vec![
            InitEntry::positional(Init::List(InitList {
                ty: inner,
                inits: vec![
                    InitEntry::positional(Init::Expr(one)),
                    InitEntry::positional(Init::Expr(two)),
                ],
            })),
            InitEntry::positional(Init::Expr(three)),
        ],
    });
    let decl_v = f.decl(StorageClass::None, "v", BODY, outer, Some(init));
    let body = f.compound(vec![decl_v]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");
    let kinds = op_kinds(func);

    let mut offsets: Vec<u64> = kinds
        .iter()
        .filter_map(|kind| match kind {
            OpKind::AddrOffset {
                index: None,
                offset,
                ..
            } => Some(*offset),
            _ => None,
        })
        .collect();
    offsets.sort_unstable();
    assert_eq!(offsets, vec![4, 8]);

    let stores = kinds
        .iter()
        .filter(|kind| matches!(kind, OpKind::Store { dest: MemLoc::Addr(_), .. }))
        .count();
    assert_eq!(stores, 3);
    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, OpKind::MemSet { len: 12, .. })));
}

#[test]
fn bitfield_entries_store_through_bitfield_ops() {
    // struct { int mode : 3; } v = { 5 };
    let mut f = fx();
    let name = f.name("Flags");
    let mode = f.name("mode");
    let s_ty = f.tree.alloc_ty(cinder_tree::TyKind::Aggregate {
        kind: cinder_tree::AggregateKind::Struct,
        name,
        fields: vec![cinder_tree::Field {
            name: mode,
            ty: f.int,
            bitfield_width: Some(3),
        }],
    });
    let five = f.int_cnst(5);
    let init = Init::List(InitList {
        ty: s_ty,
        inits: vec![InitEntry::positional(Init::Expr(five))],
    });
    let decl_v = f.decl(StorageClass::None, "v", BODY, s_ty, Some(init));
    let body = f.compound(vec![decl_v]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    let bitfield = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::StoreBitfield { bitfield, .. } => Some(*bitfield),
            _ => None,
        })
        .expect("bitfield member stores through a bitfield op");
    assert_eq!(bitfield.width, 3);
}

#[test]
fn char_array_copies_the_literal_by_value() {
    // char s[3] = "hi";
    let mut f = fx();
    let arr_ty = f.array(f.char_ty, 3);
    let lit = f.expr(
        cinder_tree::ExprKind::Cnst(cinder_tree::Cnst::Str(StrCnst::Ascii(b"hi".to_vec()))),
        arr_ty,
    );
    let decl_s = f.decl(StorageClass::None, "s", BODY, arr_ty, Some(Init::Expr(lit)));
    let body = f.compound(vec![decl_s]);
    let def = f.fn_def("f", f.void, &[], body);

    let unit = f.build_tu(vec![def]);
    let func = func_named(&unit, "f");

    // The literal's address is rewritten into a load of the global, so
    // the array is copied into the local.
    let load_ty = func
        .op_ids_in_order()
        .into_iter()
        .find_map(|id| match &func.op(id).kind {
            OpKind::Load { src: MemLoc::Glb(_) } => Some(func.op(id).ty.clone()),
            _ => None,
        })
        .expect("array initialiser loads the literal global");
    assert_eq!(
        load_ty,
        IrTy::Array {
            elem: Box::new(IrTy::I8),
            len: 3
        }
    );
    assert!(op_kinds(func)
        .iter()
        .any(|kind| matches!(kind, OpKind::Store { dest: MemLoc::Lcl(_), .. })));
}
