//! Entity references used throughout the symbolic executor.
//!
//! Instructions, blocks, functions, and allocation identities are never
//! passed around as Rust references: ownership of the underlying data
//! lives in [`crate::context::EngineContext`] and
//! [`crate::ir::Function`], and code elsewhere refers to them by a
//! compact, `Copy`, totally-ordered 32-bit index. This mirrors
//! `cranelift_codegen::ir::entities` (`Block`, `Inst`, `Value`) rather
//! than handing out `&`/`Rc` handles, for the same reasons: a separate
//! index type per entity kind buys back at compile time the type safety
//! that a bare `u32` would lose, and the representation stays small
//! enough to pack into bounded value sets cheaply.

use cranelift_entity::entity_impl;

/// A stable token identifying one call or loop-peel context.
///
/// Every stack allocation and every heap allocation instance is scoped
/// to the [`CallContextId`] in which its defining instruction executed,
/// so that two peels of the same loop (or two inlined copies of the
/// same callee) produce distinct [`AId`]s for "the same" source-level
/// allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallContextId(u32);
entity_impl!(CallContextId, "ctx");

/// A stable token identifying one function in the program inventory.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");

/// A stable token identifying one basic block within a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// A stable token identifying one instruction within a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);
entity_impl!(InstId, "inst");

/// A stable token identifying one global value declared by the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(u32);
entity_impl!(GlobalId, "g");

/// An opaque file-descriptor token, distinguishing one symbolic open
/// file handle from another without modelling the underlying resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FdId(u32);
entity_impl!(FdId, "fd");

/// Allocation identity (`AId`): a stable token identifying one symbolic
/// allocation site, equality-comparable and totally ordered (§3).
///
/// The token itself carries no data; [`AIdKind`] (looked up through
/// [`crate::context::EngineContext`]) records what kind of allocation it
/// names and in which call/peel context it was created.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AId(u32);
entity_impl!(AId, "alloc");

/// What an [`AId`] names: a function argument, a global, a specific
/// stack-allocation instance in a specific call context, or a specific
/// heap-allocation instance, or the single reserved null allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AIdKind {
    /// The `index`-th argument of `func`.
    Argument {
        /// The function the argument belongs to.
        func: FuncId,
        /// Zero-based argument index.
        index: u32,
    },
    /// A module-level global value.
    Global(GlobalId),
    /// One instance of a stack allocation (`alloca`), scoped to the
    /// call/peel context in which the defining instruction ran.
    Stack {
        /// The `alloca` (or equivalent) instruction that defines this.
        site: InstId,
        /// The call/peel context the allocation lives in.
        context: CallContextId,
    },
    /// One instance of a heap allocation (`malloc`/`realloc`), scoped to
    /// the call/peel context in which the defining instruction ran.
    Heap {
        /// The allocating instruction.
        site: InstId,
        /// The call/peel context the allocation lives in.
        context: CallContextId,
    },
    /// The single reserved allocation that null pointers are based on.
    /// `Ptr(null_alloc, 0)` is how §3 represents a null pointer.
    Null,
}
