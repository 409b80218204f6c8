//! Source type to IR type lowering, and cast classification.

use cinder_ir::{FuncTy, FuncTyFlags, IrTy, Primitive, TyInfo};
use cinder_target::{LpSize, Target};
use cinder_tree::{AggregateKind, TyId, TyKind, Tree, WellKnown};

/// The IR primitive a well-known arithmetic type lowers to.
///
/// `long` follows the target's LP mode; `long double` collapses to F64.
pub(crate) fn primitive_for_well_known(target: &Target, wk: WellKnown) -> Primitive {
    match wk {
        WellKnown::Bool => Primitive::I1,
        WellKnown::Char | WellKnown::SignedChar | WellKnown::UnsignedChar => Primitive::I8,
        WellKnown::SignedShort | WellKnown::UnsignedShort => Primitive::I16,
        WellKnown::SignedInt | WellKnown::UnsignedInt => Primitive::I32,
        WellKnown::SignedLong | WellKnown::UnsignedLong => match target.lp_size {
            LpSize::Lp32 => Primitive::I32,
            LpSize::Lp64 => Primitive::I64,
        },
        WellKnown::SignedLongLong | WellKnown::UnsignedLongLong => Primitive::I64,
        WellKnown::Half => Primitive::F16,
        WellKnown::Float => Primitive::F32,
        WellKnown::Double | WellKnown::LongDouble => Primitive::F64,
        WellKnown::Int128 | WellKnown::UInt128 => Primitive::I128,
    }
}

fn lower_ty_impl(tree: &Tree, target: &Target, ty: TyId, allow_incomplete: bool) -> IrTy {
    match tree.ty(ty) {
        TyKind::Void => IrTy::None,
        TyKind::Variadic => IrTy::Variadic,
        TyKind::WellKnown(wk) => IrTy::Primitive(primitive_for_well_known(target, *wk)),
        TyKind::Pointer { .. } => IrTy::Pointer,
        TyKind::Array { elem, len } => IrTy::Array {
            elem: Box::new(lower_ty_impl(tree, target, *elem, allow_incomplete)),
            len: *len,
        },
        TyKind::Func {
            ret,
            params,
            variadic,
        } => {
            let mut flags = FuncTyFlags::empty();
            if *variadic {
                flags |= FuncTyFlags::VARIADIC;
            }
            // From IR onwards variadic-ness is a flag, not a parameter;
            // the `...` sentinel is dropped from the list.
            let param_tys = params
                .iter()
                .filter(|p| !matches!(tree.ty(p.ty), TyKind::Variadic))
                .map(|p| lower_ty_impl(tree, target, p.ty, allow_incomplete))
                .collect();
            IrTy::Func(FuncTy {
                ret: Box::new(lower_ty_impl(tree, target, *ret, allow_incomplete)),
                params: param_tys,
                flags,
            })
        }
        TyKind::Aggregate { kind, fields, .. } => {
            let field_tys = fields
                .iter()
                .map(|f| lower_ty_impl(tree, target, f.ty, allow_incomplete))
                .collect();
            match kind {
                AggregateKind::Struct => IrTy::Struct { fields: field_tys },
                AggregateKind::Union => IrTy::Union { fields: field_tys },
            }
        }
        TyKind::IncompleteAggregate { name, .. } => {
            if allow_incomplete {
                IrTy::Pointer
            } else {
                panic!(
                    "incomplete aggregate '{}' reached IR lowering outside a declaration",
                    tree.lookup(*name)
                );
            }
        }
    }
}

/// Lower a source type to an IR type.
///
/// # Panics
/// Panics on incomplete aggregates; those are only legal in declaration
/// types (use [`lower_decl_ty`]).
pub fn lower_ty(tree: &Tree, target: &Target, ty: TyId) -> IrTy {
    lower_ty_impl(tree, target, ty, false)
}

/// Lower a declaration type to an IR type. Incomplete aggregates are
/// lowered to `Pointer` (`extern struct X e;` is legal).
pub fn lower_decl_ty(tree: &Tree, target: &Target, ty: TyId) -> IrTy {
    lower_ty_impl(tree, target, ty, true)
}

/// Layout of a source type on a target.
pub(crate) fn ty_info(tree: &Tree, target: &Target, ty: TyId) -> TyInfo {
    TyInfo::of(&lower_ty(tree, target, ty), target)
}

/// The cast op kinds a classified cast can require.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CastKind {
    Trunc,
    Sext,
    Zext,
    Conv,
    Sconv,
    Uconv,
}

impl CastKind {
    pub(crate) fn op(self) -> cinder_ir::CastOpKind {
        use cinder_ir::CastOpKind;
        match self {
            CastKind::Trunc => CastOpKind::Trunc,
            CastKind::Sext => CastOpKind::Sext,
            CastKind::Zext => CastOpKind::Zext,
            CastKind::Conv => CastOpKind::Conv,
            CastKind::Sconv => CastOpKind::Sconv,
            CastKind::Uconv => CastOpKind::Uconv,
        }
    }
}

/// Classification of a `from → to` conversion that needs a real op.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CastInfo {
    /// Lower as `value != 0` (conversions to `_Bool`).
    CmpNonZero,
    /// Lower as a cast op.
    Cast(CastKind),
}

/// Whether converting `from` to `to` requires an op at all.
///
/// Pointer↔pointer, function↔pointer, pointer↔same-width integer and
/// `I1 → I8` conversions are representation no-ops.
pub(crate) fn needs_cast_op(target: &Target, to: &IrTy, from: &IrTy) -> bool {
    if *to == IrTy::None {
        // Casts to void are no-ops.
        return false;
    }

    if to.is_aggregate() && from.is_aggregate() {
        // Aggregate conversion never takes a cast op.
        return false;
    }

    if to == from {
        return false;
    }

    if matches!(
        (to, from),
        (IrTy::Func(_), IrTy::Pointer) | (IrTy::Pointer, IrTy::Func(_))
    ) {
        return false;
    }

    let ptr_like = |ty: &IrTy| matches!(ty, IrTy::Pointer | IrTy::Array { .. });
    if ptr_like(to) && ptr_like(from) {
        return false;
    }

    if *to == IrTy::I1 {
        return true;
    }

    if *to == IrTy::I8 && *from == IrTy::I1 {
        // I1 is canonically {0, 1}.
        return false;
    }

    let ptr_width_int = |ty: &IrTy| match ty {
        IrTy::Pointer => true,
        IrTy::Primitive(p) => !p.is_fp() && p.size() == target.ptr_size,
        _ => false,
    };
    if ptr_width_int(to) && ptr_width_int(from) {
        return false;
    }

    true
}

/// Classify a conversion that [`needs_cast_op`] said requires an op.
///
/// # Panics
/// Panics on conversions that can never require an op (pointer↔pointer,
/// pointer↔same-width integer) and on aggregate conversions.
pub(crate) fn cast_info(tree: &Tree, target: &Target, from: TyId, to: TyId) -> CastInfo {
    let from_ir = lower_ty(tree, target, from);
    let to_ir = lower_ty(tree, target, to);

    if from_ir == IrTy::Pointer && to_ir == IrTy::Pointer {
        panic!("cast between pointer types is implicit");
    }

    if to_ir == IrTy::I1 {
        return CastInfo::CmpNonZero;
    }

    if let (IrTy::Primitive(from_prim), IrTy::Pointer) = (&from_ir, &to_ir) {
        // Integer -> pointer.
        let pointer = IrTy::pointer_sized_int(target);
        if *from_prim == pointer {
            panic!("cast between pointer and same-width integer is implicit");
        }
        return if pointer < *from_prim {
            CastInfo::Cast(CastKind::Trunc)
        } else if tree.well_known(from).is_some_and(WellKnown::is_signed) {
            CastInfo::Cast(CastKind::Sext)
        } else {
            CastInfo::Cast(CastKind::Zext)
        };
    }

    if from_ir == IrTy::Pointer && matches!(to_ir, IrTy::Primitive(_)) {
        return CastInfo::Cast(CastKind::Trunc);
    }

    let (IrTy::Primitive(from_prim), IrTy::Primitive(to_prim)) = (&from_ir, &to_ir) else {
        panic!("cast classification for non-primitive types ({from_ir:?} -> {to_ir:?})");
    };

    let from_fp = tree.is_fp(from);
    let to_fp = tree.is_fp(to);

    if from_fp && to_fp {
        return CastInfo::Cast(CastKind::Conv);
    }

    if from_fp || to_fp {
        // Exactly one side is floating; signedness comes from the integer
        // side.
        let int_side = if from_fp { to } else { from };
        let signed = tree
            .well_known(int_side)
            .unwrap_or_else(|| panic!("int/float conversion with non-arithmetic integer side"))
            .is_signed();
        return if signed {
            CastInfo::Cast(CastKind::Sconv)
        } else {
            CastInfo::Cast(CastKind::Uconv)
        };
    }

    if to_prim < from_prim {
        CastInfo::Cast(CastKind::Trunc)
    } else {
        debug_assert!(
            from_prim != to_prim,
            "cast not needed between same-size types"
        );
        if tree.well_known(from).is_some_and(WellKnown::is_signed) {
            CastInfo::Cast(CastKind::Sext)
        } else {
            CastInfo::Cast(CastKind::Zext)
        }
    }
}

/// A resolved aggregate member: its byte offset, source type and bitfield
/// slice (if it is a bitfield).
#[derive(Clone, Debug)]
pub(crate) struct MemberInfo {
    pub offset: u64,
    pub ty: TyId,
    pub bitfield: Option<cinder_ir::Bitfield>,
}

/// Find a member by name, recursing into anonymous embedded aggregates
/// and accumulating their offsets. Union members are all at offset 0.
pub(crate) fn find_member(
    tree: &Tree,
    target: &Target,
    aggregate: TyId,
    member: cinder_tree::Name,
) -> Option<MemberInfo> {
    let TyKind::Aggregate { fields, .. } = tree.ty(aggregate) else {
        panic!("member lookup on non-aggregate type");
    };
    let info = ty_info(tree, target, aggregate);
    let offset_of = |idx: usize| info.offsets.as_ref().map_or(0, |offsets| offsets[idx]);

    for (idx, field) in fields.iter().enumerate() {
        if !field.name.is_present() {
            if let Some(mut inner) = find_member(tree, target, field.ty, member) {
                inner.offset += offset_of(idx);
                return Some(inner);
            }
        } else if field.name == member {
            let bitfield = field.bitfield_width.map(|width| cinder_ir::Bitfield {
                // Bitfields are currently laid out as their own fields.
                offset: 0,
                width,
            });
            return Some(MemberInfo {
                offset: offset_of(idx),
                ty: field.ty,
                bitfield,
            });
        }
    }
    None
}

/// Find a member by name, panicking when it does not exist (the type
/// checker guarantees it does).
pub(crate) fn member_by_name(
    tree: &Tree,
    target: &Target,
    aggregate: TyId,
    member: cinder_tree::Name,
) -> MemberInfo {
    find_member(tree, target, aggregate, member).unwrap_or_else(|| {
        panic!(
            "aggregate has no member named '{}'",
            tree.lookup(member)
        )
    })
}

/// Offset and type of a positional initialiser member: the `idx`-th array
/// element or declared field.
pub(crate) fn member_index_offset(
    tree: &Tree,
    target: &Target,
    ty: TyId,
    idx: usize,
) -> MemberInfo {
    match tree.ty(ty) {
        TyKind::Array { elem, .. } => {
            let el_size = ty_info(tree, target, *elem).size;
            MemberInfo {
                offset: el_size * idx as u64,
                ty: *elem,
                bitfield: None,
            }
        }
        TyKind::Aggregate { fields, .. } => {
            let field = &fields[idx];
            let info = ty_info(tree, target, ty);
            let offset = info.offsets.as_ref().map_or(0, |offsets| offsets[idx]);
            let bitfield = field.bitfield_width.map(|width| cinder_ir::Bitfield {
                offset: 0,
                width,
            });
            MemberInfo {
                offset,
                ty: field.ty,
                bitfield,
            }
        }
        other => panic!("positional initialiser into non-aggregate type {other:?}"),
    }
}
