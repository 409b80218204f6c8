//! Target descriptors for the Cinder C compiler.
//!
//! The IR builder needs very little from a target: how wide a pointer is,
//! whether `long` is 32 or 64 bits, and a couple of variadic-ABI quirks.
//! Everything else (register sets, calling conventions, relocations) lives
//! in the per-target codegen crates.

use bitflags::bitflags;

/// Width of `long`/`unsigned long` on the target.
///
/// `size_t` and pointer-sized integers follow the same split.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum LpSize {
    /// 32-bit `long` (ILP32/LP32 targets such as RV32I).
    Lp32,
    /// 64-bit `long` (LP64 targets).
    Lp64,
}

bitflags! {
    /// Variadic-ABI properties the IR builder must know about.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct VariadicFlags: u32 {
        /// `va_list` is passed by reference; copying a `va_list` value
        /// requires an extra load through the reference.
        const VA_LIST_BYREF = 1 << 0;
    }
}

/// Everything the IR construction core needs to know about a target.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Target {
    /// Pointer size in bytes.
    pub ptr_size: u64,
    /// Width of `long` on this target.
    pub lp_size: LpSize,
    /// Variadic-ABI flags.
    pub variadic: VariadicFlags,
}

impl Target {
    /// x86-64 Linux (System V).
    pub const X86_64_LINUX: Target = Target {
        ptr_size: 8,
        lp_size: LpSize::Lp64,
        variadic: VariadicFlags::VA_LIST_BYREF,
    };

    /// x86-64 macOS.
    pub const X86_64_MACOS: Target = Target {
        ptr_size: 8,
        lp_size: LpSize::Lp64,
        variadic: VariadicFlags::VA_LIST_BYREF,
    };

    /// AArch64 Linux (AAPCS64).
    pub const AARCH64_LINUX: Target = Target {
        ptr_size: 8,
        lp_size: LpSize::Lp64,
        variadic: VariadicFlags::VA_LIST_BYREF,
    };

    /// AArch64 macOS. Darwin passes `va_list` as a plain pointer.
    pub const AARCH64_MACOS: Target = Target {
        ptr_size: 8,
        lp_size: LpSize::Lp64,
        variadic: VariadicFlags::empty(),
    };

    /// RV32I Linux.
    pub const RV32I_LINUX: Target = Target {
        ptr_size: 4,
        lp_size: LpSize::Lp32,
        variadic: VariadicFlags::empty(),
    };

    /// Whether `va_list` values are copied through a reference.
    #[inline]
    pub fn va_list_byref(&self) -> bool {
        self.variadic.contains(VariadicFlags::VA_LIST_BYREF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_split_matches_pointer_size() {
        assert_eq!(Target::X86_64_LINUX.ptr_size, 8);
        assert_eq!(Target::X86_64_LINUX.lp_size, LpSize::Lp64);
        assert_eq!(Target::RV32I_LINUX.ptr_size, 4);
        assert_eq!(Target::RV32I_LINUX.lp_size, LpSize::Lp32);
    }

    #[test]
    fn darwin_va_list_is_by_value() {
        assert!(Target::AARCH64_LINUX.va_list_byref());
        assert!(!Target::AARCH64_MACOS.va_list_byref());
    }
}
