//! The explicit engine context (§9: "encapsulate [global state] in an
//! explicit *engine context* passed by reference; forbid module-level
//! mutable singletons").
//!
//! Everything that would otherwise be a module-level static — the
//! allocation registry, the module base store, the special-function
//! table, and the tunable bounds (`K_MAX`-equivalent, loop peel bound,
//! call-depth bound) — lives here instead, mirroring
//! `cranelift_codegen`'s pattern of threading an explicit
//! `&TargetIsa`/`Context` rather than relying on statics.

use alloc::rc::Rc;
use alloc::vec::Vec;

use cranelift_entity::PrimaryMap;

use crate::entities::{AId, AIdKind, FuncId};
use crate::fx::FxHashMap;
use crate::heap::store::HStore;
use crate::ir::special::{SpecialFunction, SpecialFunctionTable};
use crate::ir::types::Type;
use crate::value::Val;

/// What `EngineContext` knows about one allocation identity: its kind
/// (for diagnostics and alias queries), byte size (possibly unknown,
/// §3), and a type hint used to build its initial value.
#[derive(Clone, Debug)]
pub struct AllocInfo {
    /// What this `AId` names.
    pub kind: AIdKind,
    /// Byte size, if statically known.
    pub size: Option<u32>,
    /// The static type ascribed at the defining instruction.
    pub ty: Type,
}

/// Tunable bounds the core observes but never hardcodes (§9's "driver
/// may bound iterations/peels, which the core observes").
#[derive(Copy, Clone, Debug)]
pub struct Bounds {
    /// Maximum members a bounded value set may hold (`K_MAX`, §3).
    pub k_max: usize,
    /// Maximum number of times a loop may be peeled.
    pub peel_bound: u32,
    /// Maximum inlined call-stack depth.
    pub call_depth_bound: u32,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            k_max: crate::value::K_MAX,
            peel_bound: 8,
            call_depth_bound: 64,
        }
    }
}

/// The explicit, passed-by-reference engine context.
pub struct EngineContext {
    allocs: PrimaryMap<AId, AllocInfo>,
    null_alloc: AId,
    base_store: FxHashMap<AId, Rc<HStore>>,
    /// Raw initializer bytes for globals the loader resolved as
    /// compile-time constants, keyed by the global's `AId` (§4.6's
    /// "rooted on a constant global" load-transfer branch; §6's
    /// "constant initializer bytes" on `GlobalData`).
    global_consts: FxHashMap<AId, Vec<u8>>,
    specials: SpecialFunctionTable,
    /// Per-`FuncId` resolution of [`SpecialFunctionTable`]'s by-name
    /// entries, built once by the loader so the executor never repeats
    /// a string lookup per call site (§6).
    func_models: FxHashMap<FuncId, SpecialFunction>,
    bounds: Bounds,
    /// Set by the non-returning-call transfer function (§5): the
    /// driver observes this to stop walking a block's successors.
    must_bail: bool,
}

impl EngineContext {
    /// A fresh context with the given special-function table and
    /// default bounds. The reserved null allocation is created first
    /// so `null_alloc()` is stable across the context's lifetime.
    pub fn new(specials: SpecialFunctionTable) -> Self {
        Self::with_bounds(specials, Bounds::default())
    }

    /// As [`EngineContext::new`], with explicit tunable bounds.
    pub fn with_bounds(specials: SpecialFunctionTable, bounds: Bounds) -> Self {
        let mut allocs = PrimaryMap::new();
        let null_alloc = allocs.push(AllocInfo {
            kind: AIdKind::Null,
            size: Some(0),
            ty: Type::Ptr { width: 8 },
        });
        EngineContext {
            allocs,
            null_alloc,
            base_store: FxHashMap::default(),
            global_consts: FxHashMap::default(),
            specials,
            func_models: FxHashMap::default(),
            bounds,
            must_bail: false,
        }
    }

    /// Record that `fid` names a special function, resolved once from
    /// [`EngineContext::specials`] by the loader after it has matched
    /// link names to `FuncId`s.
    pub fn set_func_model(&mut self, fid: FuncId, model: SpecialFunction) {
        self.func_models.insert(fid, model);
    }

    /// The special-function model for `fid`, if the loader resolved
    /// one.
    pub fn func_model(&self, fid: FuncId) -> Option<&SpecialFunction> {
        self.func_models.get(&fid)
    }

    /// The reserved allocation null pointers are based on (§3).
    pub fn null_alloc(&self) -> AId {
        self.null_alloc
    }

    /// Register a new allocation identity and return its token.
    pub fn new_alloc(&mut self, kind: AIdKind, size: Option<u32>, ty: Type) -> AId {
        self.allocs.push(AllocInfo { kind, size, ty })
    }

    /// Look up what an `AId` names.
    pub fn alloc_info(&self, id: AId) -> &AllocInfo {
        &self.allocs[id]
    }

    /// The byte size of `id`'s allocation, if statically known.
    pub fn alloc_size(&self, id: AId) -> Option<u32> {
        self.allocs[id].size
    }

    /// The special-function table (§6).
    pub fn specials(&self) -> &SpecialFunctionTable {
        &self.specials
    }

    /// The tunable bounds in effect.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Raise the `mustBail` flag (§5): the current block provably has
    /// no successors this step (a non-returning call).
    pub fn set_must_bail(&mut self) {
        self.must_bail = true;
    }

    /// True if `mustBail` was raised since the last [`EngineContext::clear_must_bail`].
    pub fn must_bail(&self) -> bool {
        self.must_bail
    }

    /// Reset `mustBail`, called by the driver after observing it.
    pub fn clear_must_bail(&mut self) {
        self.must_bail = false;
    }

    /// The base store's entry for `id`, if one has ever been
    /// committed.
    pub fn base_store_entry(&self, id: AId) -> Option<&Rc<HStore>> {
        self.base_store.get(&id)
    }

    /// A writable base-store entry for `id`, creating one (a `Single`
    /// or a baseline-less `Multi`, matching
    /// [`crate::heap::block_store::BStore::get_writable_store_for`]'s
    /// no-entry branches) if none exists yet.
    pub fn base_store_writable(&mut self, id: AId, will_cover_whole: bool) -> &mut HStore {
        use crate::heap::store::MultiStore;
        if !self.base_store.contains_key(&id) {
            let fresh = if will_cover_whole {
                HStore::new_single(Val::Bottom)
            } else {
                HStore::Multi(MultiStore::with_baseline(None))
            };
            self.base_store.insert(id, Rc::new(fresh));
        } else {
            let needs_promotion = matches!(
                self.base_store.get(&id).map(|rc| rc.as_ref()),
                Some(HStore::Single(_))
            ) && !will_cover_whole;
            if needs_promotion {
                let old = self.base_store.remove(&id).unwrap();
                let HStore::Single(v) = old.as_ref().clone() else {
                    unreachable!()
                };
                let promoted = HStore::Multi(MultiStore::with_baseline(Some(Rc::new(
                    HStore::Single(v),
                ))));
                self.base_store.insert(id, Rc::new(promoted));
            }
        }
        let entry = self.base_store.get_mut(&id).unwrap();
        if Rc::strong_count(entry) > 1 {
            let cloned = entry.as_ref().clone();
            *entry = Rc::new(cloned);
        }
        Rc::get_mut(entry).expect("single owner after COW-break")
    }

    /// Directly install a base-store entry, used by merge (§4.5 step
    /// 4: "commit its contents into the base store").
    pub fn commit_base_store(&mut self, id: AId, store: Rc<HStore>) {
        self.base_store.insert(id, store);
    }

    /// Record `bytes` as `id`'s compile-time-constant initializer,
    /// resolved by the loader from its `GlobalData` (§6). Loads through
    /// a precise offset into `id` try this before consulting the heap
    /// store.
    pub fn set_global_initializer(&mut self, id: AId, bytes: Vec<u8>) {
        self.global_consts.insert(id, bytes);
    }

    /// `id`'s constant initializer bytes, if the loader resolved one.
    pub fn global_initializer(&self, id: AId) -> Option<&[u8]> {
        self.global_consts.get(&id).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GlobalId;
    use cranelift_entity::EntityRef;

    #[test]
    fn null_alloc_is_stable_and_first() {
        let ctx = EngineContext::new(SpecialFunctionTable::new());
        assert_eq!(ctx.null_alloc(), AId::new(0));
    }

    #[test]
    fn new_allocs_get_distinct_ids() {
        let mut ctx = EngineContext::new(SpecialFunctionTable::new());
        let a = ctx.new_alloc(AIdKind::Global(GlobalId::new(0)), Some(4), Type::Int(crate::ir::types::IntWidth::I32));
        let b = ctx.new_alloc(AIdKind::Global(GlobalId::new(1)), Some(4), Type::Int(crate::ir::types::IntWidth::I32));
        assert_ne!(a, b);
    }

    #[test]
    fn global_initializer_round_trips() {
        let mut ctx = EngineContext::new(SpecialFunctionTable::new());
        let id = ctx.new_alloc(AIdKind::Global(GlobalId::new(0)), Some(4), Type::Int(crate::ir::types::IntWidth::I32));
        assert!(ctx.global_initializer(id).is_none());
        ctx.set_global_initializer(id, alloc::vec![1, 2, 3, 4]);
        assert_eq!(ctx.global_initializer(id), Some([1, 2, 3, 4].as_slice()));
    }

    #[test]
    fn must_bail_round_trips() {
        let mut ctx = EngineContext::new(SpecialFunctionTable::new());
        assert!(!ctx.must_bail());
        ctx.set_must_bail();
        assert!(ctx.must_bail());
        ctx.clear_must_bail();
        assert!(!ctx.must_bail());
    }
}
