//! Functions, blocks, instructions and the module inventory (§6's "function
//! inventory with per-function basic-block list, per-block instruction
//! list, SSA operand indices, loop nesting tree... and an integer byte
//! size for every type").

use alloc::vec::Vec;

use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

use crate::entities::{BlockId, FuncId, GlobalId, InstId};
use crate::ir::types::Type;
use crate::value::ScalarBits;

/// A reference to one natural loop in a function's loop nesting tree.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u32);
entity_impl!(LoopId, "loop");

/// One natural loop: header/preheader/latch blocks plus its parent in the
/// nesting tree, if any (§6).
#[derive(Clone, Debug)]
pub struct LoopInfo {
    /// The loop's single entry block.
    pub header: BlockId,
    /// The block outside the loop that branches into `header`, if the
    /// loader materialised one.
    pub preheader: Option<BlockId>,
    /// Blocks that branch back to `header`.
    pub latches: SmallVec<[BlockId; 2]>,
    /// The loop this one is nested inside, if any.
    pub parent: Option<LoopId>,
}

/// A function's loop nesting tree.
#[derive(Clone, Debug, Default)]
pub struct LoopTree {
    loops: PrimaryMap<LoopId, LoopInfo>,
}

impl LoopTree {
    /// An empty loop tree, for functions with no loops.
    pub fn new() -> Self {
        LoopTree::default()
    }

    /// Register a loop, returning its id.
    pub fn push(&mut self, info: LoopInfo) -> LoopId {
        self.loops.push(info)
    }

    /// Look up a loop by id.
    pub fn get(&self, id: LoopId) -> &LoopInfo {
        &self.loops[id]
    }

    /// Innermost-to-outermost chain of loops containing `block`, if any
    /// loop headers are known to contain it. The loader is responsible
    /// for having recorded membership; this crate only walks the parent
    /// chain it was given.
    pub fn chain(&self, innermost: LoopId) -> impl Iterator<Item = LoopId> + '_ {
        core::iter::successors(Some(innermost), move |&id| self.loops[id].parent)
    }
}

/// An SSA operand: a reference to a value produced somewhere else, a
/// function argument, a literal constant, or the address of a global or
/// function (§3, §6).
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// The `index`-th argument of the enclosing function.
    Arg(u32),
    /// The result of another instruction in the same function.
    Value(InstId),
    /// A literal constant, already resolved by the loader.
    Const(ScalarBits),
    /// The address of a module-level global.
    Global(GlobalId),
    /// The address of a function (for indirect-call targets and
    /// function-pointer comparisons).
    FuncAddr(FuncId),
    /// The literal null pointer.
    Null,
}

/// One instruction's operation and its operands.
///
/// Deliberately flat rather than a generic opcode + operand-list pair:
/// each variant names exactly the operands its transfer function in
/// [`crate::exec`] needs, the same way `cranelift_codegen::ir::InstructionData`
/// enumerates opcodes by shape rather than by a single generic `Vec<Value>`.
#[derive(Clone, Debug)]
pub enum InstKind {
    /// A stack allocation of `size` bytes (may be type-derived or, for a
    /// variable-length array, unknown).
    Alloca {
        /// The static type ascribed to the allocation, for initial value.
        ty: Type,
        /// Byte size, if statically known.
        size: Option<u32>,
    },
    /// A heap allocation of `size` bytes.
    Malloc {
        /// Requested byte count.
        size: Operand,
    },
    /// Resize the allocation `ptr` points to `new_size` bytes, copying
    /// the old contents (§4.6).
    Realloc {
        /// The existing allocation.
        ptr: Operand,
        /// The new requested byte count.
        new_size: Operand,
    },
    /// Release the allocation `ptr` points to.
    Free {
        /// The allocation being released.
        ptr: Operand,
    },
    /// Write `value` (of type `ty`) through `ptr`.
    Store {
        /// The pointer written through.
        ptr: Operand,
        /// The value written.
        value: Operand,
        /// The static type of the write.
        ty: Type,
    },
    /// Read a value of type `ty` through `ptr`.
    Load {
        /// The pointer read through.
        ptr: Operand,
        /// The static type of the read.
        ty: Type,
    },
    /// Copy `len` (non-overlapping) bytes from `src` to `dst`.
    Memcpy {
        /// Destination pointer.
        dst: Operand,
        /// Source pointer.
        src: Operand,
        /// Byte count, if statically known (unbounded ⇒ clobber, §4.6).
        len: Operand,
    },
    /// Copy `len` (possibly overlapping) bytes from `src` to `dst`.
    Memmove {
        /// Destination pointer.
        dst: Operand,
        /// Source pointer.
        src: Operand,
        /// Byte count.
        len: Operand,
    },
    /// Fill `len` bytes at `dst` with the low byte of `byte`.
    Memset {
        /// Destination pointer.
        dst: Operand,
        /// The fill byte (only its low 8 bits are used).
        byte: Operand,
        /// Byte count.
        len: Operand,
    },
    /// A direct or indirect call.
    Call {
        /// The callee, a `FuncAddr` for a direct call or any pointer
        /// operand for an indirect one.
        callee: Operand,
        /// Argument operands in declaration order.
        args: SmallVec<[Operand; 4]>,
    },
    /// A PHI node: one incoming operand per live predecessor edge.
    Phi {
        /// `(predecessor block, incoming value)` pairs.
        incoming: SmallVec<[(BlockId, Operand); 4]>,
    },
    /// A bit-reinterpret cast to `to`.
    Cast {
        /// The value being cast.
        value: Operand,
        /// The target type.
        to: Type,
    },
    /// Pointer arithmetic: `base` offset by a (possibly dynamic) byte
    /// count.
    Gep {
        /// The base pointer.
        base: Operand,
        /// The byte displacement; non-constant operands force the
        /// result offset to `UNKNOWN` (§4.6: "forward-propagate pointer
        /// base + offset").
        offset: Operand,
    },
    /// A literal integer/function-address constant (redundant with
    /// `Operand::Const`/`Operand::FuncAddr` for operands, but needed so
    /// a constant can itself be the *result* of an instruction, e.g. one
    /// produced by constant folding upstream of this crate).
    IConst {
        /// The constant value.
        value: ScalarBits,
    },
    /// Initialise a `va_list` at `va_list`.
    VaStart {
        /// The `va_list` allocation.
        va_list: Operand,
    },
    /// Copy a `va_list`'s cursor state from `src` to `dst`.
    VaCopy {
        /// Destination `va_list`.
        dst: Operand,
        /// Source `va_list`.
        src: Operand,
    },
    /// A modelled system call, dispatched by name through the special
    /// function table (§6).
    Syscall {
        /// The syscall's library name (e.g. `"read"`).
        name: alloc::string::String,
        /// Argument operands.
        args: SmallVec<[Operand; 4]>,
    },
}

/// One instruction: its operation plus the block it lives in.
#[derive(Clone, Debug)]
pub struct Inst {
    /// The instruction's operation and operands.
    pub kind: InstKind,
    /// The block this instruction belongs to.
    pub block: BlockId,
}

/// One basic block: its instruction list in execution order, plus CFG
/// edges.
#[derive(Clone, Debug, Default)]
pub struct Block {
    /// Instructions, in order; the last is the block's terminator in the
    /// loader's own encoding (this crate has no opinion on terminator
    /// shape beyond reading `preds`/`succs`).
    pub insts: Vec<InstId>,
    /// Predecessor blocks.
    pub preds: SmallVec<[BlockId; 4]>,
    /// Successor blocks.
    pub succs: SmallVec<[BlockId; 4]>,
}

/// One function: its blocks, instructions, argument types, and loop
/// nesting tree (§6).
#[derive(Clone, Debug, Default)]
pub struct Function {
    /// This function's basic blocks.
    pub blocks: PrimaryMap<BlockId, Block>,
    /// This function's instructions, addressable independent of block.
    pub insts: PrimaryMap<InstId, Inst>,
    /// Declared argument types, in order.
    pub arg_types: Vec<Type>,
    /// The entry block.
    pub entry: Option<BlockId>,
    /// The loop nesting tree.
    pub loops: LoopTree,
}

impl Function {
    /// A function with no blocks yet (the loader populates it).
    pub fn new() -> Self {
        Function::default()
    }

    /// Append a new, empty block and return its id.
    pub fn push_block(&mut self) -> BlockId {
        self.blocks.push(Block::default())
    }

    /// Append an instruction to `block`'s instruction list and to the
    /// instruction table, returning its id.
    pub fn push_inst(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let id = self.insts.push(Inst { kind, block });
        self.blocks[block].insts.push(id);
        id
    }
}

/// One module-level global's declared type, byte size, and (if the
/// loader resolved one) constant initializer bytes, used by the load
/// transfer function's constant-global folding path (§4.6).
#[derive(Clone, Debug, Default)]
pub struct GlobalData {
    /// The global's static type.
    pub ty: Option<Type>,
    /// Byte size, if known.
    pub size: Option<u32>,
    /// Raw initializer bytes, if the global is a compile-time constant.
    pub initializer: Option<Vec<u8>>,
}

/// The whole-program inventory: every function and global the loader
/// knows about (§6).
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Functions, keyed by [`FuncId`].
    pub functions: PrimaryMap<FuncId, Function>,
    /// Globals, keyed by [`GlobalId`].
    pub globals: PrimaryMap<GlobalId, GlobalData>,
}

impl Module {
    /// An empty module.
    pub fn new() -> Self {
        Module::default()
    }
}
