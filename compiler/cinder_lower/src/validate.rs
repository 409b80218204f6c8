//! Operand typing validation.
//!
//! After a function is built, every operand's IR type must be compatible
//! with its consumer, modulo the context-dependent exceptions: loads and
//! `va_arg` read through opaque pointers, casts change representation by
//! definition (their operand is exempt, explicitly), `LOGICAL_NOT` and
//! the bit-counting ops accept any integral type, `ADDR` yields a
//! pointer, and comparisons produce a boolean-ish result that differs
//! from their operand type. A violation is a bug in lowering, not a user
//! error.

use cinder_ir::{Func, IrTy, OpId, OpKind, UnaryOpKind};
use cinder_target::Target;

use crate::func::FuncBuilder;
use crate::ty::needs_cast_op;

impl FuncBuilder<'_> {
    pub(crate) fn validate(&self) {
        validate_op_tys(&self.func, &self.unit.target);
    }
}

/// Check every operand's IR type against its consumer.
///
/// # Panics
/// Panics on the first incompatible use.
pub(crate) fn validate_op_tys(func: &Func, target: &Target) {
    for consumer_id in func.op_ids_in_order() {
        let consumer = func.op(consumer_id);

        // Loads and `va_arg` read through opaque pointers; casts convert
        // between types by definition. None of them constrain their
        // operand's type.
        if matches!(
            consumer.kind,
            OpKind::Load { .. }
                | OpKind::LoadBitfield { .. }
                | OpKind::VaArg { .. }
                | OpKind::CastOp { .. }
        ) {
            continue;
        }

        if let OpKind::BinaryOp { op, lhs, rhs } = &consumer.kind {
            validate_binary_op(func, target, consumer_id, *op, *lhs, *rhs);
            continue;
        }

        if !consumer.produces_value() {
            continue;
        }

        for operand in consumer.kind.operands() {
            let mut res_ty = func.op(operand).ty.clone();

            match &consumer.kind {
                OpKind::Call { func_ty, .. } => {
                    res_ty = func_ty.ret.as_ref().clone();
                }
                OpKind::UnaryOp {
                    op:
                        UnaryOpKind::LogicalNot
                        | UnaryOpKind::Popcnt
                        | UnaryOpKind::Clz
                        | UnaryOpKind::Ctz,
                    ..
                } if consumer.ty.is_integral() && res_ty.is_integral() => {
                    // Logical not and the bit-counting ops accept any
                    // integral width.
                    res_ty = consumer.ty.clone();
                }
                OpKind::Addr { .. } => {
                    res_ty = IrTy::POINTER;
                }
                _ => {}
            }

            if needs_cast_op(target, &res_ty, &consumer.ty) {
                panic!(
                    "op {consumer_id:?} uses op {operand:?} with an incompatible type \
                     ({res_ty:?} into {:?})",
                    consumer.ty
                );
            }
        }
    }
}

/// Binary ops are checked against their actual operands: both sides must
/// agree with each other, and for the non-comparison variants the result
/// type must agree with the operands too. Comparisons yield `I1`-like
/// values whatever their operands are.
fn validate_binary_op(
    func: &Func,
    target: &Target,
    consumer_id: OpId,
    op: cinder_ir::BinaryOpKind,
    lhs: OpId,
    rhs: OpId,
) {
    let lhs_ty = &func.op(lhs).ty;
    let rhs_ty = &func.op(rhs).ty;

    if needs_cast_op(target, lhs_ty, rhs_ty) {
        panic!(
            "binary op {consumer_id:?} mixes operand types ({lhs_ty:?} vs {rhs_ty:?})"
        );
    }

    if !op.is_comparison() && needs_cast_op(target, &func.op(consumer_id).ty, lhs_ty) {
        panic!(
            "binary op {consumer_id:?} produces {:?} from {lhs_ty:?} operands",
            func.op(consumer_id).ty
        );
    }
}
