//! Functions, basic blocks, statements and locals.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::op::{AddrTarget, MemLoc, Op, OpFlags, OpId, OpKind};
use crate::ty::{FuncTy, IrTy};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const INVALID: $name = $name(u32::MAX);

            #[inline]
            pub const fn new(index: u32) -> Self {
                $name(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                } else {
                    write!(f, concat!(stringify!($name), "::INVALID"))
                }
            }
        }
    };
}

define_id! {
    /// Index into a function's basic-block arena.
    BlockId
}
define_id! {
    /// Index into a function's statement arena.
    StmtId
}
define_id! {
    /// Index into a function's local arena.
    LclId
}

bitflags! {
    /// Function-level flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FuncFlags: u32 {
        const MAKES_CALL = 1 << 0;
        const USES_VA_ARGS = 1 << 1;
    }
}

bitflags! {
    /// Statement flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct StmtFlags: u32 {
        /// Reserved for parameter materialisation ops (entry block only).
        const PARAM = 1 << 0;
        /// Holds the phis at a block's head.
        const PHI = 1 << 1;
    }
}

bitflags! {
    /// Local flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct LclFlags: u32 {
        /// An aggregate parameter materialised through memory; the backend
        /// fills the slot from the ABI location.
        const PARAM = 1 << 0;
    }
}

/// One case of a `Switch` terminator.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SwitchCase {
    pub value: u64,
    pub target: BlockId,
}

/// A basic block's successor shape.
///
/// `Term::None` only exists while a block is being built; finished
/// functions have a terminator on every non-detached block.
#[derive(Clone, PartialEq, Debug, Default)]
pub enum Term {
    #[default]
    None,
    Ret,
    Merge {
        target: BlockId,
    },
    Split {
        true_target: BlockId,
        false_target: BlockId,
    },
    Switch {
        cases: Vec<SwitchCase>,
        default_target: BlockId,
    },
}

impl Term {
    /// Successor blocks, in branch order.
    pub fn succs(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Term::None | Term::Ret => SmallVec::new(),
            Term::Merge { target } => SmallVec::from_slice(&[*target]),
            Term::Split {
                true_target,
                false_target,
            } => SmallVec::from_slice(&[*true_target, *false_target]),
            Term::Switch {
                cases,
                default_target,
            } => {
                let mut out: SmallVec<[BlockId; 2]> =
                    cases.iter().map(|case| case.target).collect();
                out.push(*default_target);
                out
            }
        }
    }
}

/// A basic block: ordered statements, predecessor list, terminator shape.
#[derive(Clone, PartialEq, Debug)]
pub struct Block {
    pub id: BlockId,
    pub stmts: Vec<StmtId>,
    pub preds: Vec<BlockId>,
    pub term: Term,
    /// Detached blocks were pruned; they stay in the arena (ids are
    /// stable) but no longer belong to the function.
    pub detached: bool,
}

/// A statement: an ordered run of ops within a block. Sequence points in
/// the source correspond to fresh statements.
#[derive(Clone, PartialEq, Debug)]
pub struct Stmt {
    pub id: StmtId,
    pub block: BlockId,
    pub ops: Vec<OpId>,
    pub flags: StmtFlags,
}

/// A stack-allocated slot owned by a function.
#[derive(Clone, PartialEq, Debug)]
pub struct Lcl {
    pub id: LclId,
    pub ty: IrTy,
    pub flags: LclFlags,
}

/// A function under construction or finished: blocks, statements, ops and
/// locals in flat arenas, plus the IR signature.
#[derive(Clone, PartialEq, Debug)]
pub struct Func {
    pub name: String,
    pub func_ty: FuncTy,
    pub flags: FuncFlags,
    blocks: Vec<Block>,
    stmts: Vec<Stmt>,
    ops: Vec<Op>,
    lcls: Vec<Lcl>,
}

impl Func {
    /// Create an empty function with the given IR signature.
    pub fn new(name: impl Into<String>, func_ty: FuncTy) -> Self {
        Func {
            name: name.into(),
            func_ty,
            flags: FuncFlags::empty(),
            blocks: Vec::new(),
            stmts: Vec::new(),
            ops: Vec::new(),
            lcls: Vec::new(),
        }
    }

    /// The entry block.
    ///
    /// # Panics
    /// Panics if no block has been allocated yet.
    pub fn entry(&self) -> BlockId {
        assert!(!self.blocks.is_empty(), "function has no entry block");
        BlockId::new(0)
    }

    // -- Accessors --

    #[inline]
    #[track_caller]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn op(&self, id: OpId) -> &Op {
        &self.ops[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn op_mut(&mut self, id: OpId) -> &mut Op {
        &mut self.ops[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn lcl(&self, id: LclId) -> &Lcl {
        &self.lcls[id.index()]
    }

    #[inline]
    #[track_caller]
    pub fn lcl_mut(&mut self, id: LclId) -> &mut Lcl {
        &mut self.lcls[id.index()]
    }

    /// Number of ops allocated (including ops in detached blocks).
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of locals.
    pub fn lcl_count(&self) -> usize {
        self.lcls.len()
    }

    /// Ids of all non-detached blocks, in allocation order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| !b.detached)
            .map(|b| b.id)
            .collect()
    }

    /// Iterate non-detached blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| !b.detached)
    }

    /// Iterate locals.
    pub fn lcls(&self) -> impl Iterator<Item = &Lcl> {
        self.lcls.iter()
    }

    /// All op ids in program order (block order, then statement order).
    pub fn op_ids_in_order(&self) -> Vec<OpId> {
        let mut out = Vec::with_capacity(self.ops.len());
        for block in self.blocks() {
            for &stmt in &block.stmts {
                out.extend_from_slice(&self.stmt(stmt).ops);
            }
        }
        out
    }

    // -- Allocation --

    /// Allocate a new (empty, unterminated) basic block.
    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId::new(u32::try_from(self.blocks.len()).expect("block count fits u32"));
        self.blocks.push(Block {
            id,
            stmts: Vec::new(),
            preds: Vec::new(),
            term: Term::None,
            detached: false,
        });
        id
    }

    /// Allocate a statement at the end of a block.
    pub fn alloc_stmt(&mut self, block: BlockId) -> StmtId {
        let id = self.push_stmt(block, StmtFlags::empty());
        self.blocks[block.index()].stmts.push(id);
        id
    }

    /// Allocate a statement at a given position within a block.
    pub fn insert_stmt_at(&mut self, block: BlockId, at: usize, flags: StmtFlags) -> StmtId {
        let id = self.push_stmt(block, flags);
        self.blocks[block.index()].stmts.insert(at, id);
        id
    }

    fn push_stmt(&mut self, block: BlockId, flags: StmtFlags) -> StmtId {
        let id = StmtId::new(u32::try_from(self.stmts.len()).expect("stmt count fits u32"));
        self.stmts.push(Stmt {
            id,
            block,
            ops: Vec::new(),
            flags,
        });
        id
    }

    /// Append an op to the end of a statement.
    pub fn append_op(&mut self, stmt: StmtId, kind: OpKind, ty: IrTy) -> OpId {
        let id = self.push_op(stmt, kind, ty);
        self.stmts[stmt.index()].ops.push(id);
        id
    }

    /// Insert an op immediately before another op in its statement.
    pub fn insert_op_before(&mut self, before: OpId, kind: OpKind, ty: IrTy) -> OpId {
        let stmt = self.op(before).stmt;
        let at = self.op_position(stmt, before);
        let id = self.push_op(stmt, kind, ty);
        self.stmts[stmt.index()].ops.insert(at, id);
        id
    }

    /// Insert an op immediately after another op in its statement.
    pub fn insert_op_after(&mut self, after: OpId, kind: OpKind, ty: IrTy) -> OpId {
        let stmt = self.op(after).stmt;
        let at = self.op_position(stmt, after);
        let id = self.push_op(stmt, kind, ty);
        self.stmts[stmt.index()].ops.insert(at + 1, id);
        id
    }

    #[track_caller]
    fn op_position(&self, stmt: StmtId, op: OpId) -> usize {
        self.stmt(stmt)
            .ops
            .iter()
            .position(|&o| o == op)
            .unwrap_or_else(|| panic!("op {op:?} not in stmt {stmt:?}"))
    }

    fn push_op(&mut self, stmt: StmtId, kind: OpKind, ty: IrTy) -> OpId {
        let id = OpId::new(u32::try_from(self.ops.len()).expect("op count fits u32"));
        self.ops.push(Op {
            id,
            kind,
            ty,
            stmt,
            flags: OpFlags::empty(),
            lcl: None,
        });
        id
    }

    /// Insert an empty phi at the head of a block.
    ///
    /// Phis live in a dedicated `PHI`-flagged statement that is always the
    /// block's first statement.
    pub fn insert_phi(&mut self, block: BlockId, ty: IrTy) -> OpId {
        let phi_stmt = match self.blocks[block.index()].stmts.first() {
            Some(&first) if self.stmt(first).flags.contains(StmtFlags::PHI) => first,
            _ => self.insert_stmt_at(block, 0, StmtFlags::PHI),
        };
        self.append_op(
            phi_stmt,
            OpKind::Phi {
                entries: SmallVec::new(),
            },
            ty,
        )
    }

    /// Allocate a stack slot.
    pub fn add_local(&mut self, ty: IrTy) -> LclId {
        let id = LclId::new(u32::try_from(self.lcls.len()).expect("lcl count fits u32"));
        self.lcls.push(Lcl {
            id,
            ty,
            flags: LclFlags::empty(),
        });
        id
    }

    /// Spill an op's value to a fresh stack slot, inserting the store
    /// right after it. Idempotent; returns the slot.
    pub fn spill_op(&mut self, op: OpId) -> LclId {
        if let Some(lcl) = self.op(op).lcl {
            return lcl;
        }
        let ty = self.op(op).ty.clone();
        let lcl = self.add_local(ty);
        self.insert_op_after(
            op,
            OpKind::Store {
                dest: MemLoc::Lcl(lcl),
                value: op,
            },
            IrTy::None,
        );
        let op = self.op_mut(op);
        op.flags |= OpFlags::SPILLED;
        op.lcl = Some(lcl);
        lcl
    }

    /// Produce an op holding the address of `op`'s value.
    ///
    /// `op` must be addressable: a load (the address is reused or formed
    /// from the loaded slot) or a previously spilled op.
    ///
    /// # Panics
    /// Panics if the op has no memory backing.
    pub fn op_addr(&mut self, stmt: StmtId, op: OpId) -> OpId {
        match self.op(op).kind.clone() {
            OpKind::Load { src: MemLoc::Addr(addr) } => addr,
            OpKind::Load { src: MemLoc::Lcl(lcl) } => self.append_op(
                stmt,
                OpKind::Addr {
                    target: AddrTarget::Lcl(lcl),
                },
                IrTy::POINTER,
            ),
            OpKind::Load { src: MemLoc::Glb(glb) } => self.append_op(
                stmt,
                OpKind::Addr {
                    target: AddrTarget::Glb(glb),
                },
                IrTy::POINTER,
            ),
            _ => {
                let lcl = self
                    .op(op)
                    .lcl
                    .unwrap_or_else(|| panic!("op {op:?} has no memory backing to address"));
                self.append_op(
                    stmt,
                    OpKind::Addr {
                        target: AddrTarget::Lcl(lcl),
                    },
                    IrTy::POINTER,
                )
            }
        }
    }

    /// Remove an op from its statement. The op stays in the arena (ids
    /// are stable) but no longer executes; used when the phi simplifier
    /// rewrites a trivial phi away.
    pub fn detach_op(&mut self, op: OpId) {
        let stmt = self.op(op).stmt;
        self.stmts[stmt.index()].ops.retain(|&o| o != op);
    }

    // -- CFG edges --

    /// Set a block's terminator shape, maintaining predecessor lists on
    /// both the old and new successors.
    pub fn set_term(&mut self, block: BlockId, term: Term) {
        let old = std::mem::replace(&mut self.blocks[block.index()].term, Term::None);
        for succ in old.succs() {
            self.blocks[succ.index()].preds.retain(|&p| p != block);
        }
        for succ in term.succs() {
            let preds = &mut self.blocks[succ.index()].preds;
            if !preds.contains(&block) {
                preds.push(block);
            }
        }
        self.blocks[block.index()].term = term;
    }

    /// Wire `from` to unconditionally continue at `to`.
    pub fn make_merge(&mut self, from: BlockId, to: BlockId) {
        self.set_term(from, Term::Merge { target: to });
    }

    /// Wire `from` to branch to `true_target` / `false_target`.
    pub fn make_split(&mut self, from: BlockId, true_target: BlockId, false_target: BlockId) {
        self.set_term(
            from,
            Term::Split {
                true_target,
                false_target,
            },
        );
    }

    /// Wire `from` to dispatch over `cases` with a default.
    pub fn make_switch(&mut self, from: BlockId, cases: Vec<SwitchCase>, default_target: BlockId) {
        self.set_term(
            from,
            Term::Switch {
                cases,
                default_target,
            },
        );
    }

    /// Mark a block as a return terminator.
    pub fn make_ret(&mut self, block: BlockId) {
        self.set_term(block, Term::Ret);
    }

    /// Whether a block contains any ops at all.
    pub fn block_is_empty(&self, block: BlockId) -> bool {
        self.block(block)
            .stmts
            .iter()
            .all(|&s| self.stmt(s).ops.is_empty())
    }

    /// Drop blocks that cannot be reached from the entry block.
    ///
    /// Detached blocks keep their ids but disappear from iteration and
    /// from the predecessor lists of surviving blocks.
    pub fn prune_blocks(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        let mut reachable = vec![false; self.blocks.len()];
        let mut worklist = vec![self.entry()];
        reachable[self.entry().index()] = true;
        while let Some(block) = worklist.pop() {
            for succ in self.block(block).term.succs() {
                if !reachable[succ.index()] {
                    reachable[succ.index()] = true;
                    worklist.push(succ);
                }
            }
        }

        for i in 0..self.blocks.len() {
            if !reachable[i] && !self.blocks[i].detached {
                let id = self.blocks[i].id;
                // Unlink outgoing edges so successor pred lists stay exact.
                self.set_term(id, Term::None);
                self.blocks[i].detached = true;
            }
        }
        for block in &mut self.blocks {
            if !block.detached {
                block.preds.retain(|p| reachable[p.index()]);
            }
        }
    }
}
