//! The typed SSA IR this crate executes over.
//!
//! Loading IR text, building this structure from a frontend, and walking
//! a real call graph are all the loader's job (§6); this module only
//! defines the shape the loader hands the executor and the driver reads
//! back from.

pub mod function;
pub mod special;
pub mod types;

pub use function::{
    Block, Function, GlobalData, Inst, InstKind, LoopId, LoopInfo, LoopTree, Module, Operand,
};
pub use special::{ArgEffect, LibraryCallModel, SpecialFunction, SpecialFunctionTable};
pub use types::{IntWidth, Type, UNKNOWN_SIZE};
