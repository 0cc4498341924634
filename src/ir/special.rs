//! The special-function table (§6): per-name models for allocator
//! primitives, varargs intrinsics, and an extensible library-call
//! mod/ref summary table, plus the blacklist the driver consults before
//! ever attempting to inline a callee (SPEC_FULL.md §B).

use alloc::string::String;
use smallvec::SmallVec;

use crate::fx::FxHashMap;

/// One argument or return-value effect a library call model declares.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgEffect {
    /// The call reads `size` bytes (or, if `size` is `None`, an unknown
    /// extent) through the `index`-th argument.
    ReadArg {
        /// Zero-based argument index.
        index: u32,
        /// Byte extent read, if statically known.
        size: Option<u32>,
    },
    /// The call writes `size` bytes through the `index`-th argument.
    WriteArg {
        /// Zero-based argument index.
        index: u32,
        /// Byte extent written, if statically known.
        size: Option<u32>,
    },
    /// The call's effect on this location cannot be summarised; treat
    /// it as a full clobber.
    Opaque,
}

/// A library call's declared mod/ref summary: one [`ArgEffect`] per
/// location it touches.
#[derive(Clone, Debug, Default)]
pub struct LibraryCallModel {
    /// The declared per-argument effects.
    pub effects: SmallVec<[ArgEffect; 4]>,
}

impl LibraryCallModel {
    /// A model with no declared effects (every argument opaque).
    pub fn new() -> Self {
        LibraryCallModel::default()
    }

    /// Declare one more effect.
    pub fn with_effect(mut self, effect: ArgEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// What the executor and DSE (§4.6, §4.8) do when they encounter a call
/// to a given function name.
#[derive(Clone, Debug)]
pub enum SpecialFunction {
    /// `malloc`-shaped: allocates a new heap object.
    Malloc,
    /// `realloc`-shaped: resizes an existing allocation, preserving
    /// contents.
    Realloc,
    /// `free`-shaped: releases an allocation.
    Free,
    /// `va_start`-shaped: initialises a `va_list`.
    VaStart,
    /// `va_copy`-shaped: copies a `va_list`'s cursor state.
    VaCopy,
    /// An annotated library call with a known mod/ref summary.
    Library(LibraryCallModel),
    /// No model is known: treat as a full clobber of the world, but the
    /// driver is still permitted to inline a body for it if one turns
    /// up and its policy allows.
    Opaque,
    /// Must never be inlined or specialised even if a body is
    /// available, because it has side effects this crate does not (and
    /// never will) model precisely (SPEC_FULL.md §B). Still clobbers
    /// the world like `Opaque` when called.
    Blacklisted,
}

/// The whole-program table of function-name → model, keyed by the
/// function's link name the way the loader names it (§6).
#[derive(Clone, Debug, Default)]
pub struct SpecialFunctionTable {
    table: FxHashMap<String, SpecialFunction>,
}

impl SpecialFunctionTable {
    /// An empty table (every call is treated as opaque).
    pub fn new() -> Self {
        SpecialFunctionTable::default()
    }

    /// Declare a model for `name`, replacing any prior entry.
    pub fn insert(&mut self, name: impl Into<String>, model: SpecialFunction) {
        self.table.insert(name.into(), model);
    }

    /// Look up `name`'s model, if any was declared.
    pub fn lookup(&self, name: &str) -> Option<&SpecialFunction> {
        self.table.get(name)
    }

    /// True if `name` is explicitly blacklisted from inlining.
    pub fn is_blacklisted(&self, name: &str) -> bool {
        matches!(self.lookup(name), Some(SpecialFunction::Blacklisted))
    }
}
