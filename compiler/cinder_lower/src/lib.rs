//! Lowering from the type-checked tree to Cinder's SSA CFG IR.
//!
//! The entry point is [`build_unit`]: it walks a translation unit's
//! external declarations, creates globals (with linkage and definition
//! status resolved), lowers every function body, completes SSA form for
//! variables whose writes span blocks, simplifies trivial phis and
//! validates operand typing.
//!
//! The input is assumed well-typed. Violations of that contract are
//! compiler bugs: this crate panics with diagnostic context rather than
//! surfacing user-facing errors.

mod expr;
mod func;
mod init;
mod refs;
mod ssa;
mod stmt;
mod ty;
mod unit;
mod validate;
mod value;

#[cfg(test)]
pub(crate) mod testing;

use bitflags::bitflags;
use cinder_ir::Unit;
use cinder_target::Target;
use cinder_tree::{TranslationUnit, Tree};

pub use ty::{lower_decl_ty, lower_ty, CastInfo, CastKind};

bitflags! {
    /// Flags altering how a unit is built.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct BuildFlags: u32 {
        /// Lower every automatic non-aggregate variable to a stack slot
        /// instead of an SSA value. Used by debug builds.
        const SPILL_ALL = 1 << 0;
    }
}

/// Build the IR unit for a translation unit.
pub fn build_unit(
    tree: &Tree,
    translation_unit: &TranslationUnit,
    target: &Target,
    flags: BuildFlags,
) -> Unit {
    unit::UnitBuilder::new(tree, *target, flags).build(translation_unit)
}
