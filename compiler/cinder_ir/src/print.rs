//! Human-readable IR dumps for debugging and tests.

use std::fmt;

use crate::func::{Func, Term};
use crate::global::{DefKind, GlbKind};
use crate::op::{MemLoc, OpCnst, OpKind};
use crate::unit::Unit;

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {}:", self.name)?;
        for block in self.blocks() {
            write!(f, "  @{}", block.id.raw())?;
            write!(f, " preds=[")?;
            for (i, pred) in block.preds.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "@{}", pred.raw())?;
            }
            write!(f, "] ")?;
            match &block.term {
                Term::None => writeln!(f, "(unterminated)")?,
                Term::Ret => writeln!(f, "ret")?,
                Term::Merge { target } => writeln!(f, "-> @{}", target.raw())?,
                Term::Split {
                    true_target,
                    false_target,
                } => writeln!(f, "-> @{} | @{}", true_target.raw(), false_target.raw())?,
                Term::Switch {
                    cases,
                    default_target,
                } => {
                    write!(f, "switch [")?;
                    for (i, case) in cases.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} -> @{}", case.value, case.target.raw())?;
                    }
                    writeln!(f, "] default @{}", default_target.raw())?;
                }
            }
            for &stmt in &block.stmts {
                for &op_id in &self.stmt(stmt).ops {
                    let op = self.op(op_id);
                    write!(f, "    %{}: {:?} = ", op_id.raw(), op.ty)?;
                    write_op_kind(f, &op.kind)?;
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

fn write_op_kind(f: &mut fmt::Formatter<'_>, kind: &OpKind) -> fmt::Result {
    match kind {
        OpKind::Undf => write!(f, "undf"),
        OpKind::Cnst(OpCnst::Int(v)) => write!(f, "cnst {v}"),
        OpKind::Cnst(OpCnst::Flt(v)) => write!(f, "cnst {v}"),
        OpKind::UnaryOp { op, value } => write!(f, "{op:?} %{}", value.raw()),
        OpKind::BinaryOp { op, lhs, rhs } => {
            write!(f, "{op:?} %{}, %{}", lhs.raw(), rhs.raw())
        }
        OpKind::CastOp { op, value } => write!(f, "{op:?} %{}", value.raw()),
        OpKind::Load { src } => {
            write!(f, "load ")?;
            write_mem_loc(f, src)
        }
        OpKind::Store { dest, value } => {
            write!(f, "store %{} -> ", value.raw())?;
            write_mem_loc(f, dest)
        }
        OpKind::LoadBitfield { addr, bitfield } => write!(
            f,
            "load.bf %{} ({}:{})",
            addr.raw(),
            bitfield.offset,
            bitfield.width
        ),
        OpKind::StoreBitfield {
            addr,
            value,
            bitfield,
        } => write!(
            f,
            "store.bf %{} -> %{} ({}:{})",
            value.raw(),
            addr.raw(),
            bitfield.offset,
            bitfield.width
        ),
        OpKind::Addr { target } => write!(f, "addr {target:?}"),
        OpKind::AddrOffset {
            base,
            index,
            scale,
            offset,
        } => {
            write!(f, "addr.off %{}", base.raw())?;
            if let Some(index) = index {
                write!(f, " + %{} * {scale}", index.raw())?;
            }
            if *offset != 0 {
                write!(f, " + {offset}")?;
            }
            Ok(())
        }
        OpKind::Br => write!(f, "br"),
        OpKind::BrCond { cond } => write!(f, "br.cond %{}", cond.raw()),
        OpKind::BrSwitch { value } => write!(f, "br.switch %{}", value.raw()),
        OpKind::Ret { value: Some(v) } => write!(f, "ret %{}", v.raw()),
        OpKind::Ret { value: None } => write!(f, "ret"),
        OpKind::Call { target, args, .. } => {
            write!(f, "call %{} (", target.raw())?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "%{}", arg.raw())?;
            }
            write!(f, ")")
        }
        OpKind::Mov { value: Some(v) } => write!(f, "mov %{}", v.raw()),
        OpKind::Mov { value: None } => write!(f, "mov <param>"),
        OpKind::MemSet { addr, value, len } => {
            write!(f, "memset %{}, {value}, {len}", addr.raw())
        }
        OpKind::VaStart { list_addr } => write!(f, "va.start %{}", list_addr.raw()),
        OpKind::VaArg { list_addr, .. } => write!(f, "va.arg %{}", list_addr.raw()),
        OpKind::Phi { entries } => {
            write!(f, "phi [")?;
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "@{}: %{}", entry.block.raw(), entry.value.raw())?;
            }
            write!(f, "]")
        }
    }
}

fn write_mem_loc(f: &mut fmt::Formatter<'_>, loc: &MemLoc) -> fmt::Result {
    match loc {
        MemLoc::Lcl(lcl) => write!(f, "lcl{}", lcl.raw()),
        MemLoc::Glb(glb) => write!(f, "glb{}", glb.raw()),
        MemLoc::Addr(addr) => write!(f, "[%{}]", addr.raw()),
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in self.globals() {
            let name = global.name.as_deref().unwrap_or("<anon>");
            let kind = match global.kind {
                GlbKind::Func => "func",
                GlbKind::Data => "data",
            };
            let def = match global.def {
                DefKind::Undefined => "undefined",
                DefKind::Tentative => "tentative",
                DefKind::Defined => "defined",
            };
            writeln!(
                f,
                "glb{} {kind} {name} [{def}, {:?}]",
                global.id.raw(),
                global.linkage
            )?;
            if let Some(func) = &global.func {
                write!(f, "{func}")?;
            }
        }
        Ok(())
    }
}
