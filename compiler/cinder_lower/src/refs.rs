//! Variable reference maps.
//!
//! Every variable is keyed by `(identifier, scope)`. Within a function a
//! variable is either backed by memory (a stack slot or a global — a
//! [`SlotRef`]) or tracked as SSA values per basic block. The per-block
//! definition map is what incremental SSA completion walks.

use cinder_ir::{BlockId, GlbId, LclId, OpId};
use cinder_tree::{Name, ScopeId, Var};
use rustc_hash::FxHashMap;

/// Identifier + scope, the unit of variable identity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct VarKey {
    pub name: Name,
    pub scope: ScopeId,
}

impl VarKey {
    pub fn of(var: &Var) -> VarKey {
        VarKey {
            name: var.name,
            scope: var.scope,
        }
    }

    pub fn global(name: Name) -> VarKey {
        VarKey {
            name,
            scope: ScopeId::GLOBAL,
        }
    }
}

/// Memory backing for a variable that is not an SSA value.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum SlotRef {
    Lcl(LclId),
    Glb(GlbId),
}

/// Per-function variable references.
#[derive(Default)]
pub(crate) struct VarRefs {
    slots: FxHashMap<VarKey, SlotRef>,
    ssa: FxHashMap<(VarKey, BlockId), OpId>,
}

impl VarRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable as memory-backed. Replaces any prior slot
    /// (taking the address of an SSA variable demotes it).
    pub fn add_slot(&mut self, key: VarKey, slot: SlotRef) {
        self.slots.insert(key, slot);
    }

    /// The memory backing for a variable, if it has one. Falls back to
    /// global scope, since function identifiers always resolve there.
    pub fn slot(&self, key: VarKey) -> Option<SlotRef> {
        self.slots
            .get(&key)
            .or_else(|| self.slots.get(&VarKey::global(key.name)))
            .copied()
    }

    /// The memory backing under an exact key, with no scope fallback.
    pub fn slot_exact(&self, key: VarKey) -> Option<SlotRef> {
        self.slots.get(&key).copied()
    }

    /// Record the SSA definition of a variable at the end of a block.
    pub fn set_def(&mut self, key: VarKey, block: BlockId, op: OpId) {
        self.ssa.insert((key, block), op);
    }

    /// The SSA definition reaching the end of a block, if any.
    pub fn def_in(&self, key: VarKey, block: BlockId) -> Option<OpId> {
        self.ssa.get(&(key, block)).copied()
    }
}

/// Unit-level references from `(identifier, scope)` to globals.
#[derive(Default)]
pub(crate) struct GlobalRefs {
    map: FxHashMap<VarKey, GlbId>,
}

impl GlobalRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: VarKey, glb: GlbId) {
        self.map.insert(key, glb);
    }

    /// Look a variable up, falling back to global scope (function
    /// identifiers always have global scope regardless of where they were
    /// declared).
    pub fn get(&self, key: VarKey) -> Option<GlbId> {
        self.map
            .get(&key)
            .or_else(|| self.map.get(&VarKey::global(key.name)))
            .copied()
    }

    /// Look a variable up under its exact key only.
    pub fn get_exact(&self, key: VarKey) -> Option<GlbId> {
        self.map.get(&key).copied()
    }
}
