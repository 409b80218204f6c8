//! IR types and target-dependent layout queries.

use bitflags::bitflags;
use cinder_target::Target;

/// Primitive IR types.
///
/// The declaration order is the widening order for integers and (separately)
/// floats; cast classification compares primitives with `<`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Primitive {
    I1,
    I8,
    I16,
    I32,
    I64,
    I128,
    F16,
    F32,
    F64,
}

impl Primitive {
    /// Size in bytes.
    pub fn size(self) -> u64 {
        match self {
            Primitive::I1 | Primitive::I8 => 1,
            Primitive::I16 | Primitive::F16 => 2,
            Primitive::I32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::F64 => 8,
            Primitive::I128 => 16,
        }
    }

    /// Whether this is a floating-point primitive.
    pub fn is_fp(self) -> bool {
        matches!(self, Primitive::F16 | Primitive::F32 | Primitive::F64)
    }
}

bitflags! {
    /// Flags on a function type.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FuncTyFlags: u32 {
        const VARIADIC = 1 << 0;
    }
}

/// A function type: return type, parameter types and flags.
///
/// Variadic functions carry the `VARIADIC` flag; the `...` sentinel is
/// never part of `params`.
#[derive(Clone, PartialEq, Debug)]
pub struct FuncTy {
    pub ret: Box<IrTy>,
    pub params: Vec<IrTy>,
    pub flags: FuncTyFlags,
}

impl FuncTy {
    /// Whether the function is variadic.
    #[inline]
    pub fn is_variadic(&self) -> bool {
        self.flags.contains(FuncTyFlags::VARIADIC)
    }
}

/// An IR type.
///
/// Pointers are opaque: no pointee type is carried at the IR level.
#[derive(Clone, PartialEq, Debug)]
pub enum IrTy {
    /// `void`, and the type of ops that produce no value.
    None,
    Primitive(Primitive),
    Pointer,
    Array { elem: Box<IrTy>, len: u64 },
    Func(FuncTy),
    Struct { fields: Vec<IrTy> },
    Union { fields: Vec<IrTy> },
    /// The `...` sentinel. Only appears transiently in lowering; never in
    /// finished IR.
    Variadic,
}

impl IrTy {
    pub const NONE: IrTy = IrTy::None;
    pub const POINTER: IrTy = IrTy::Pointer;
    pub const I1: IrTy = IrTy::Primitive(Primitive::I1);
    pub const I8: IrTy = IrTy::Primitive(Primitive::I8);
    pub const I16: IrTy = IrTy::Primitive(Primitive::I16);
    pub const I32: IrTy = IrTy::Primitive(Primitive::I32);
    pub const I64: IrTy = IrTy::Primitive(Primitive::I64);
    pub const F32: IrTy = IrTy::Primitive(Primitive::F32);
    pub const F64: IrTy = IrTy::Primitive(Primitive::F64);

    /// Whether this is a struct or union.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, IrTy::Struct { .. } | IrTy::Union { .. })
    }

    /// Whether this is a floating-point primitive.
    #[inline]
    pub fn is_fp(&self) -> bool {
        matches!(self, IrTy::Primitive(p) if p.is_fp())
    }

    /// Whether this is an integer primitive.
    #[inline]
    pub fn is_integral(&self) -> bool {
        matches!(self, IrTy::Primitive(p) if !p.is_fp())
    }

    /// The primitive an integer of pointer width lowers to.
    pub fn pointer_sized_int(target: &Target) -> Primitive {
        match target.ptr_size {
            4 => Primitive::I32,
            8 => Primitive::I64,
            other => panic!("unsupported pointer size {other}"),
        }
    }
}

/// Size, alignment and field offsets of an IR type on a target.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TyInfo {
    pub size: u64,
    pub align: u64,
    /// Byte offset of each field, for structs. `None` for every other
    /// type; unions have no per-field offsets (all fields start at 0).
    pub offsets: Option<Vec<u64>>,
}

fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two(), "alignment {align} not a power of two");
    (value + align - 1) & !(align - 1)
}

impl TyInfo {
    /// Compute layout for a type on a target.
    ///
    /// # Panics
    /// Panics on `Variadic` — the sentinel has no layout.
    pub fn of(ty: &IrTy, target: &Target) -> TyInfo {
        match ty {
            IrTy::None => TyInfo {
                size: 0,
                align: 1,
                offsets: None,
            },
            IrTy::Primitive(p) => TyInfo {
                size: p.size(),
                align: p.size(),
                offsets: None,
            },
            // Function values only exist through pointers.
            IrTy::Pointer | IrTy::Func(_) => TyInfo {
                size: target.ptr_size,
                align: target.ptr_size,
                offsets: None,
            },
            IrTy::Array { elem, len } => {
                let elem_info = TyInfo::of(elem, target);
                TyInfo {
                    size: elem_info.size * len,
                    align: elem_info.align,
                    offsets: None,
                }
            }
            IrTy::Struct { fields } => {
                let mut offsets = Vec::with_capacity(fields.len());
                let mut size = 0u64;
                let mut align = 1u64;
                for field in fields {
                    let info = TyInfo::of(field, target);
                    size = align_up(size, info.align);
                    offsets.push(size);
                    size += info.size;
                    align = align.max(info.align);
                }
                TyInfo {
                    size: align_up(size, align),
                    align,
                    offsets: Some(offsets),
                }
            }
            IrTy::Union { fields } => {
                let mut size = 0u64;
                let mut align = 1u64;
                for field in fields {
                    let info = TyInfo::of(field, target);
                    size = size.max(info.size);
                    align = align.max(info.align);
                }
                TyInfo {
                    size: align_up(size, align),
                    align,
                    offsets: None,
                }
            }
            IrTy::Variadic => panic!("variadic sentinel has no layout"),
        }
    }
}
