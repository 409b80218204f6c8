//! The translation-unit container.

use cinder_target::Target;

use crate::global::{DefKind, GlbFlags, GlbId, GlbKind, Global, Linkage};
use crate::ty::IrTy;

/// An IR unit: the ordered globals of one translation unit plus the target
/// they were lowered for.
pub struct Unit {
    pub target: Target,
    globals: Vec<Global>,
}

impl Unit {
    /// Create an empty unit for a target.
    pub fn new(target: Target) -> Self {
        Unit {
            target,
            globals: Vec::new(),
        }
    }

    /// Append a global. Linkage defaults to `None` and is set by the unit
    /// builder once storage/scope are known.
    pub fn add_global(
        &mut self,
        kind: GlbKind,
        ty: IrTy,
        def: DefKind,
        name: Option<String>,
    ) -> GlbId {
        let id = GlbId::new(u32::try_from(self.globals.len()).expect("global count fits u32"));
        self.globals.push(Global {
            id,
            name,
            ty,
            kind,
            def,
            linkage: Linkage::None,
            flags: GlbFlags::empty(),
            var: None,
            func: None,
        });
        id
    }

    #[inline]
    #[track_caller]
    pub fn global(&self, id: GlbId) -> &Global {
        &self.globals[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn global_mut(&mut self, id: GlbId) -> &mut Global {
        &mut self.globals[id.index()]
    }

    /// Iterate globals in creation order.
    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.iter()
    }

    /// Iterate globals mutably.
    pub fn globals_mut(&mut self) -> impl Iterator<Item = &mut Global> {
        self.globals.iter_mut()
    }

    /// Number of globals.
    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Find a global by symbol name.
    pub fn global_by_name(&self, name: &str) -> Option<&Global> {
        self.globals
            .iter()
            .find(|g| g.name.as_deref() == Some(name))
    }
}
