//! SSA completion for variables, and trivial-phi simplification.
//!
//! Variable reads that found no definition in their own block left an
//! empty phi behind, with the variable recorded against the op. This
//! pass fills those phis by asking each predecessor for its definition,
//! inserting (and memoising) further phis where a predecessor has none.
//! The walk terminates because every block receives at most one phi per
//! variable.

use cinder_ir::{MemLoc, OpId, OpKind, PhiEntry};
use smallvec::SmallVec;

use crate::func::{FuncBuilder, PendingPhi};
use crate::refs::{SlotRef, VarKey};

impl FuncBuilder<'_> {
    /// Fill every pending phi left behind by variable reads.
    pub(crate) fn resolve_pending_phis(&mut self) {
        let pending = std::mem::take(&mut self.pending_phis);
        for PendingPhi { op, key } in pending {
            let block = self.func.stmt(self.func.op(op).stmt).block;
            if self.func.block(block).detached {
                continue;
            }
            self.fill_phi(op, key);
        }
    }

    fn fill_phi(&mut self, phi: OpId, key: VarKey) {
        let ty = self.func.op(phi).ty.clone();
        let mut work = vec![phi];

        while let Some(phi) = work.pop() {
            let block = self.func.stmt(self.func.op(phi).stmt).block;
            let preds = self.func.block(block).preds.clone();
            if preds.is_empty() {
                panic!(
                    "read of '{}' reaches the entry block without a definition",
                    self.tree.lookup(key.name)
                );
            }

            let mut entries: SmallVec<[PhiEntry; 2]> = SmallVec::with_capacity(preds.len());
            for pred in preds {
                let value = match self.refs.def_in(key, pred) {
                    Some(op) => op,
                    None => match self.refs.slot_exact(key) {
                        // The variable was demoted to memory after this
                        // phi was created; read the slot at the end of
                        // the predecessor.
                        Some(SlotRef::Lcl(lcl)) => {
                            let term = self
                                .last_op(pred)
                                .expect("predecessor block has a terminator");
                            let load = self.func.insert_op_before(
                                term,
                                OpKind::Load {
                                    src: MemLoc::Lcl(lcl),
                                },
                                ty.clone(),
                            );
                            self.refs.set_def(key, pred, load);
                            load
                        }
                        _ => {
                            let new_phi = self.func.insert_phi(pred, ty.clone());
                            self.refs.set_def(key, pred, new_phi);
                            work.push(new_phi);
                            new_phi
                        }
                    },
                };
                entries.push(PhiEntry { block: pred, value });
            }

            self.func.op_mut(phi).kind = OpKind::Phi { entries };
        }
    }

    /// Remove trivial phis (every incoming value is the phi itself or a
    /// single other op) by rewriting their users. Runs to a fixed point,
    /// since removing one phi can make another trivial.
    pub(crate) fn simplify_phis(&mut self) {
        loop {
            let mut changed = false;

            for op_id in self.func.op_ids_in_order() {
                let OpKind::Phi { entries } = &self.func.op(op_id).kind else {
                    continue;
                };

                let mut unique = None;
                let mut trivial = true;
                for entry in entries {
                    if entry.value == op_id {
                        continue;
                    }
                    match unique {
                        None => unique = Some(entry.value),
                        Some(seen) if seen == entry.value => {}
                        Some(_) => {
                            trivial = false;
                            break;
                        }
                    }
                }

                if !trivial {
                    continue;
                }
                // A phi of only itself can only feed unreachable code;
                // leave it alone rather than invent a value.
                let Some(replacement) = unique else {
                    continue;
                };

                self.replace_op_uses(op_id, replacement);
                self.func.detach_op(op_id);
                changed = true;
            }

            if !changed {
                break;
            }
        }
    }

    fn replace_op_uses(&mut self, from: OpId, to: OpId) {
        for id in self.func.op_ids_in_order() {
            self.func
                .op_mut(id)
                .kind
                .for_each_operand_mut(|operand| {
                    if *operand == from {
                        *operand = to;
                    }
                });
        }
    }
}
