//! Initialiser flattening and local emission.
//!
//! Initialiser lists — nested, designated, with bitfields — are first
//! flattened into `(offset, bitfield?, expr)` entries relative to the
//! whole initialised object. Locals then get a whole-object `MEM_SET` to
//! zero followed by one store per entry; globals turn the same layout
//! into a constant value tree (see `value`).

use cinder_ir::{Bitfield, IrTy, MemLoc, OpId, OpKind, StmtId};
use cinder_target::Target;
use cinder_tree::{Designator, ExprId, ExprKind, Init, InitList, TyId, TyKind, Tree};

use crate::expr::ClMode;
use crate::func::FuncBuilder;
use crate::ty::{member_by_name, member_index_offset, ty_info};

/// One flattened initialiser entry.
#[derive(Clone, Debug)]
pub(crate) struct FlatInit {
    pub offset: u64,
    pub bitfield: Option<Bitfield>,
    pub expr: ExprId,
}

/// Flatten an initialiser list into offset-annotated entries.
pub(crate) fn init_list_layout(
    tree: &Tree,
    target: &Target,
    init_list: &InitList,
) -> Vec<FlatInit> {
    let mut entries = Vec::new();
    layout_entry(tree, target, init_list, init_list.ty, 0, &mut entries);
    entries
}

/// Resolve a designator chain against the current aggregate type.
///
/// Returns the accumulated offset, the designated member's type, its
/// bitfield slice and the member index the next positional entry
/// continues from.
fn designator_offset(
    tree: &Tree,
    target: &Target,
    var_ty: TyId,
    designators: &[Designator],
) -> (u64, TyId, Option<Bitfield>, usize) {
    debug_assert!(!designators.is_empty(), "empty designator chain");

    let mut offset = 0;
    let mut cur_ty = var_ty;
    let mut bitfield = None;
    let mut member_idx = 0;

    for designator in designators {
        match designator {
            Designator::Field(name) => {
                let TyKind::Aggregate { fields, .. } = tree.ty(cur_ty) else {
                    panic!("field designator into non-aggregate type");
                };
                member_idx = fields
                    .iter()
                    .position(|f| f.name == *name)
                    .unwrap_or_else(|| {
                        // The field may live in an anonymous member.
                        fields
                            .iter()
                            .position(|f| {
                                !f.name.is_present()
                                    && crate::ty::find_member(tree, target, f.ty, *name)
                                        .is_some()
                            })
                            .unwrap_or_else(|| {
                                panic!("no member named '{}'", tree.lookup(*name))
                            })
                    });
                let info = member_by_name(tree, target, cur_ty, *name);
                offset += info.offset;
                bitfield = info.bitfield;
                cur_ty = info.ty;
            }
            Designator::Index(index) => {
                let TyKind::Array { elem, .. } = tree.ty(cur_ty) else {
                    panic!("index designator into non-array type");
                };
                let elem = *elem;
                let el_size = ty_info(tree, target, elem).size;
                offset += el_size * index;
                bitfield = None;
                member_idx = usize::try_from(*index).expect("array index fits usize");
                cur_ty = elem;
            }
        }
    }

    (offset, cur_ty, bitfield, member_idx)
}

fn layout_entry(
    tree: &Tree,
    target: &Target,
    init_list: &InitList,
    var_ty: TyId,
    offset: u64,
    out: &mut Vec<FlatInit>,
) {
    // The running member index advances through the aggregate's declared
    // order; designators reposition it.
    let mut member_idx = 0usize;

    for entry in &init_list.inits {
        let (entry_offset, member_ty, bitfield) = if entry.designators.is_empty() {
            let info = member_index_offset(tree, target, var_ty, member_idx);
            (offset + info.offset, info.ty, info.bitfield)
        } else {
            let (designated, ty, bitfield, idx) =
                designator_offset(tree, target, var_ty, &entry.designators);
            member_idx = idx;
            (offset + designated, ty, bitfield)
        };

        member_idx += 1;

        match &*entry.init {
            Init::Expr(e) => {
                let is_aggregate_literal = matches!(
                    &tree.expr(*e).kind,
                    ExprKind::CompoundLiteral { .. }
                ) && !tree.is_scalar(member_ty);

                if is_aggregate_literal {
                    // Aggregate compound literals flatten into the parent.
                    let ExprKind::CompoundLiteral { init_list: nested } = &tree.expr(*e).kind
                    else {
                        unreachable!();
                    };
                    layout_entry(tree, target, nested, member_ty, entry_offset, out);
                } else {
                    out.push(FlatInit {
                        offset: entry_offset,
                        bitfield,
                        expr: *e,
                    });
                }
            }
            Init::List(nested) => {
                layout_entry(tree, target, nested, member_ty, entry_offset, out);
            }
        }
    }
}

impl FuncBuilder<'_> {
    /// Lower a declarator initialiser. Returns the value to store when
    /// the caller owns the store, `None` when the initialiser already
    /// wrote through `address`.
    pub(crate) fn lower_init(
        &mut self,
        stmt: &mut StmtId,
        address: Option<OpId>,
        init: &Init,
    ) -> Option<OpId> {
        let tree = self.tree;
        match init {
            Init::Expr(e) => {
                if matches!(tree.expr(*e).kind, ExprKind::CompoundLiteral { .. }) {
                    let mode = if tree.is_scalar(tree.expr_ty(*e)) {
                        ClMode::Load
                    } else {
                        ClMode::Addr
                    };
                    let value = self.lower_compound_literal(stmt, address, mode, *e);
                    // In address mode the literal wrote in place.
                    return (mode == ClMode::Load).then_some(value);
                }
                Some(self.lower_value_expr(stmt, *e))
            }
            Init::List(list) => {
                let address =
                    address.expect("initialiser lists need an address to write through");
                self.lower_init_list(stmt, address, list);
                None
            }
        }
    }

    /// Emit an initialiser list into memory at `address`.
    ///
    /// The whole object is zeroed with a leading `MEM_SET` before the
    /// per-entry stores, so any byte not covered by the list reads as
    /// zero. The zero fill is unconditional; dropping it when every byte
    /// is covered is left to later optimisation.
    pub(crate) fn lower_init_list(
        &mut self,
        stmt: &mut StmtId,
        address: OpId,
        init_list: &InitList,
    ) {
        let tree = self.tree;

        if tree.is_scalar(init_list.ty) {
            debug_assert_eq!(init_list.inits.len(), 1, "scalar init list with several inits");
            let entry = &init_list.inits[0];
            debug_assert!(entry.designators.is_empty(), "designator on a scalar init");
            let Init::Expr(e) = &*entry.init else {
                panic!("scalar initialised by a nested list");
            };

            let value = self.lower_value_expr(stmt, *e);
            self.func.append_op(
                *stmt,
                OpKind::Store {
                    dest: MemLoc::Addr(address),
                    value,
                },
                IrTy::None,
            );
            return;
        }

        let target = self.unit.target;
        let layout = init_list_layout(tree, &target, init_list);

        let mut first_store = None;

        for entry in &layout {
            let value = self.lower_value_expr(stmt, entry.expr);

            let entry_address = if entry.offset != 0 {
                self.func.append_op(
                    *stmt,
                    OpKind::AddrOffset {
                        base: address,
                        index: None,
                        scale: 0,
                        offset: entry.offset,
                    },
                    IrTy::POINTER,
                )
            } else {
                address
            };

            let store = match entry.bitfield {
                Some(bitfield) => self.func.append_op(
                    *stmt,
                    OpKind::StoreBitfield {
                        addr: entry_address,
                        value,
                        bitfield,
                    },
                    IrTy::None,
                ),
                None => self.func.append_op(
                    *stmt,
                    OpKind::Store {
                        dest: MemLoc::Addr(entry_address),
                        value,
                    },
                    IrTy::None,
                ),
            };

            if first_store.is_none() {
                first_store = Some(store);
            }
        }

        let total = ty_info(tree, &target, init_list.ty).size;
        self.zero_range(*stmt, first_store, address, total);
    }

    /// Fill `len` bytes at `address` with zero, before `insert_before`
    /// when given.
    fn zero_range(
        &mut self,
        stmt: StmtId,
        insert_before: Option<OpId>,
        address: OpId,
        len: u64,
    ) {
        if len == 0 {
            return;
        }

        let kind = OpKind::MemSet {
            addr: address,
            value: 0,
            len,
        };
        match insert_before {
            Some(before) => {
                self.func.insert_op_before(before, kind, IrTy::None);
            }
            None => {
                self.func.append_op(stmt, kind, IrTy::None);
            }
        }
    }
}

#[cfg(test)]
mod tests;
