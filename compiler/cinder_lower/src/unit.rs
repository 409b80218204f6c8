//! Translation-unit lowering: globals, linkage, definition status.

use cinder_ir::{
    DataCategory, DefKind, GlbFlags, GlbKind, GlbVar, Linkage, Unit, VarValue, VarValueKind,
};
use cinder_target::Target;
use cinder_tree::{
    ExternalDecl, FuncSpecifiers, ScopeId, StorageClass, TranslationUnit, TyKind, Tree,
    VarDeclaration,
};
use tracing::debug;

use crate::func::FuncBuilder;
use crate::refs::{GlobalRefs, SlotRef, VarKey, VarRefs};
use crate::ty::lower_decl_ty;
use crate::value::ValueLowerer;
use crate::BuildFlags;

/// Mangle the symbol name of a static.
///
/// File-scope statics become `.name`; function-local statics become
/// `.function.name`. The leading `.` cannot collide with C identifiers.
pub(crate) fn mangle_static_name(func: Option<&str>, name: &str) -> String {
    match func {
        Some(func) => format!(".{func}.{name}"),
        None => format!(".{name}"),
    }
}

/// State for lowering one translation unit.
pub(crate) struct UnitBuilder<'a> {
    tree: &'a Tree,
    unit: Unit,
    global_refs: GlobalRefs,
    flags: BuildFlags,
}

impl<'a> UnitBuilder<'a> {
    pub fn new(tree: &'a Tree, target: Target, flags: BuildFlags) -> Self {
        UnitBuilder {
            tree,
            unit: Unit::new(target),
            global_refs: GlobalRefs::new(),
            flags,
        }
    }

    pub fn build(mut self, translation_unit: &TranslationUnit) -> Unit {
        for external in &translation_unit.decls {
            match external {
                ExternalDecl::Declaration(decl) => {
                    if decl.storage == StorageClass::Typedef {
                        continue;
                    }
                    for declarator in &decl.declarators {
                        lower_global_var(
                            self.tree,
                            &mut self.unit,
                            &mut self.global_refs,
                            None,
                            None,
                            decl.storage,
                            decl.func_specifiers,
                            declarator,
                        );
                    }
                }
                ExternalDecl::FuncDef(def) => {
                    // Upsert the function's global first so recursive and
                    // forward references inside the body resolve.
                    lower_global_var(
                        self.tree,
                        &mut self.unit,
                        &mut self.global_refs,
                        None,
                        None,
                        def.storage,
                        def.func_specifiers,
                        &def.decl,
                    );

                    let func = FuncBuilder::new(
                        self.tree,
                        &mut self.unit,
                        &mut self.global_refs,
                        self.flags,
                        def,
                    )
                    .build(def);

                    let key = VarKey::global(def.decl.var.name);
                    let glb = self
                        .global_refs
                        .get(key)
                        .expect("function global exists after upsert");
                    let global = self.unit.global_mut(glb);
                    global.def = DefKind::Defined;
                    global.func = Some(func);
                }
            }
        }

        self.promote_tentative();
        self.unit
    }

    /// Any global still tentative after the whole unit is processed
    /// becomes a zero-initialised definition.
    fn promote_tentative(&mut self) {
        for global in self.unit.globals_mut() {
            if global.def != DefKind::Tentative {
                continue;
            }
            assert!(
                global.kind == GlbKind::Data,
                "tentative function definition"
            );
            debug!(
                name = global.name.as_deref().unwrap_or("<anon>"),
                "promoting tentative definition"
            );
            global.def = DefKind::Defined;
            global.var = Some(GlbVar {
                category: DataCategory::Data,
                ty: global.ty.clone(),
                value: VarValue {
                    ty: global.ty.clone(),
                    kind: VarValueKind::Zero,
                },
            });
        }
    }
}

/// Create or update the global for one declarator.
///
/// Used both for file-scope declarations (`local_refs == None`) and for
/// the `static`/`extern`/function declarators of block-scope declarations
/// (which register into the enclosing function's reference map, with the
/// function's name participating in static mangling).
pub(crate) fn lower_global_var(
    tree: &Tree,
    unit: &mut Unit,
    global_refs: &mut GlobalRefs,
    mut local_refs: Option<&mut VarRefs>,
    func_name: Option<&str>,
    storage: StorageClass,
    func_specifiers: FuncSpecifiers,
    decl: &VarDeclaration,
) {
    let target = unit.target;
    // `extern struct X e;` is legal for an incomplete aggregate.
    let var_ty = lower_decl_ty(tree, &target, decl.ty);
    let is_func_ty = matches!(tree.ty(decl.ty), TyKind::Func { .. });

    let name_str = tree.lookup(decl.var.name);
    let symbol_name = if storage == StorageClass::Static && !is_func_ty {
        mangle_static_name(func_name, name_str)
    } else {
        name_str.to_owned()
    };

    // Function identifiers always resolve at global scope.
    let key = if is_func_ty {
        VarKey::global(decl.var.name)
    } else {
        VarKey::of(&decl.var)
    };

    let existing = match local_refs.as_deref() {
        Some(refs) => match refs.slot_exact(key) {
            Some(SlotRef::Glb(glb)) => Some(glb),
            Some(SlotRef::Lcl(_)) => panic!(
                "redeclaration of local '{name_str}' with static or extern storage"
            ),
            None => global_refs.get_exact(key),
        },
        None => global_refs.get_exact(key),
    };

    let is_extern = storage == StorageClass::Extern;
    let is_static = storage == StorageClass::Static;
    let is_inline = func_specifiers.contains(FuncSpecifiers::INLINE);
    let is_file_scope = key.scope == ScopeId::GLOBAL;
    let is_unspecified = storage == StorageClass::None;

    let mut linkage = if (is_func_ty && !is_static && !is_inline)
        || is_extern
        || (is_file_scope && !is_inline && !is_static)
    {
        Linkage::External
    } else if is_file_scope && is_static {
        Linkage::Internal
    } else {
        Linkage::None
    };

    let prev_defined = existing.is_some_and(|glb| unit.global(glb).def == DefKind::Defined);
    let def = if decl.init.is_some() || !is_file_scope || prev_defined {
        DefKind::Defined
    } else if is_file_scope && !is_func_ty && (is_unspecified || is_static) {
        DefKind::Tentative
    } else {
        DefKind::Undefined
    };

    // An `extern` redeclaration of a static keeps internal linkage.
    if let Some(glb) = existing {
        if linkage == Linkage::External && unit.global(glb).linkage == Linkage::Internal {
            linkage = Linkage::Internal;
        }
    }

    let glb = match existing {
        Some(glb) => glb,
        None => {
            let kind = if is_func_ty { GlbKind::Func } else { GlbKind::Data };
            let glb = unit.add_global(kind, var_ty.clone(), def, Some(symbol_name));
            match local_refs.as_mut() {
                Some(refs) => refs.add_slot(key, SlotRef::Glb(glb)),
                None => global_refs.insert(key, glb),
            }
            glb
        }
    };

    {
        let global = unit.global_mut(glb);
        if decl.weak {
            global.flags |= GlbFlags::WEAK;
        }
        global.def = def;
        global.linkage = linkage;
    }

    if def == DefKind::Tentative || is_func_ty {
        return;
    }

    let value = match &decl.init {
        Some(init) => ValueLowerer {
            tree,
            unit: &mut *unit,
            global_refs,
        }
        .lower_var_value(init, decl.ty),
        None => VarValue {
            ty: var_ty.clone(),
            kind: VarValueKind::Zero,
        },
    };

    let global = unit.global_mut(glb);
    global.var = Some(GlbVar {
        category: DataCategory::Data,
        ty: var_ty,
        value,
    });
}
