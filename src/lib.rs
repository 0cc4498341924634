//! Symbolic execution and layered copy-on-write memory-state core for a
//! whole-program partial evaluator.
//!
//! This crate implements the three tightly coupled subsystems that form
//! the hard engineering of a whole-program specialiser operating over a
//! typed SSA IR: a symbolic abstract value domain ([`value`]), a
//! layered copy-on-write symbolic heap ([`heap`]), and a dead-store
//! elimination tracker running over the same symbolic flow ([`dse`]).
//! [`exec`] threads all three together into one transfer function per
//! instruction; [`alias`] answers pointer-disjointness queries over the
//! same abstract values.
//!
//! The IR loader, the driver's inline/peel policy, the residual-code
//! emitter, and virtual-filesystem syscall modelling are external
//! collaborators; [`driver`] defines only the trait boundary they must
//! satisfy.
#![no_std]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod alias;
pub mod context;
pub mod driver;
pub mod dse;
mod entities;
pub mod errors;
pub mod exec;
mod fx;
pub mod heap;
pub mod ir;
pub mod value;

pub use entities::{AId, AIdKind, BlockId, CallContextId, FdId, FuncId, GlobalId, InstId};
