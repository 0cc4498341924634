//! BS — Block Store Map: per-basic-block `AId -> HStore`, with
//! copy-on-write mutation and the `allOthersClobbered` escape hatch
//! (§3, §4.4).

use alloc::rc::Rc;

use crate::context::EngineContext;
use crate::entities::AId;
use crate::fx::FxHashMap;
use crate::heap::store::{HStore, MultiStore};
use crate::value::Val;

/// Whether a block is known to execute unconditionally on the current
/// specialisation frontier (§4.5's "certain block"), ported from
/// LLPE's `BBSTATUS_CERTAIN`/`BBSTATUS_ASSUMED`/`BBSTATUS_UNKNOWN`
/// vocabulary (`ShadowInlines.h`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// Known to run on every concrete execution reaching this point in
    /// the specialisation. Writes here may commit to the base store.
    Certain,
    /// Assumed likely but not proven certain (e.g. under a peeled loop
    /// whose trip count wasn't proven exact).
    Assumed,
    /// No specialisation-time guarantee this block runs at all.
    Unknown,
}

/// `shouldCommit` (§9): whether a merged block-store's contents may be
/// folded into the module base store. Named as its own function so
/// every call site shares one decision instead of re-deriving it (the
/// open question flags the original's `mergeToBase` sometimes
/// committing even when not strictly certain; this crate does not
/// replicate that).
pub fn should_commit(status: BlockStatus, all_others_clobbered: bool) -> bool {
    status == BlockStatus::Certain && !all_others_clobbered
}

/// The per-block store: authoritative for the `AId`s it lists;
/// unlisted `AId`s defer to the base store unless `all_others_clobbered`
/// (§3).
#[derive(Clone, Debug, Default)]
pub struct BStore {
    map: FxHashMap<AId, Rc<HStore>>,
    all_others_clobbered: bool,
}

impl BStore {
    /// An empty block store (defers everything to the base store).
    pub fn new() -> Self {
        BStore::default()
    }

    /// True if every `AId` not explicitly listed here is overdefined.
    pub fn all_others_clobbered(&self) -> bool {
        self.all_others_clobbered
    }

    /// Clobber the world: drop every local entry and raise the flag
    /// (§4.6, call to an opaque function or a write through an unknown
    /// pointer).
    pub fn clobber_all(&mut self) {
        self.map.clear();
        self.all_others_clobbered = true;
    }

    /// The locally-listed store for `id`, if any (does not consult the
    /// base store or `all_others_clobbered`; see
    /// [`BStore::read_range`] for the full read path).
    pub fn local(&self, id: AId) -> Option<&HStore> {
        self.map.get(&id).map(|rc| rc.as_ref())
    }

    /// As [`BStore::local`], but returns the shared handle itself so a
    /// caller (merge's carry-over case, §4.5) can clone the `Rc`
    /// instead of the pointed-to store.
    pub fn local_rc(&self, id: AId) -> Option<&Rc<HStore>> {
        self.map.get(&id)
    }

    /// Directly install `store` for `id` (used by merge, §4.5, to
    /// splice in a freshly-built result without going through the COW
    /// decision table).
    pub fn install(&mut self, id: AId, store: Rc<HStore>) {
        self.map.insert(id, store);
    }

    /// Remove `id`'s local entry, reverting it to deferring to the base
    /// store (used when merge commits a `Certain` block's contents).
    pub fn clear_local(&mut self, id: AId) {
        self.map.remove(&id);
    }

    /// Every locally-listed `(AId, HStore)` pair.
    pub fn entries(&self) -> impl Iterator<Item = (AId, &Rc<HStore>)> {
        self.map.iter().map(|(id, v)| (*id, v))
    }

    /// Read `[off, off+len)` of `id`'s store, deferring to the base
    /// store (or declaring overdefined under `all_others_clobbered`)
    /// when `id` has no local entry.
    pub fn read_range(&self, ctx: &EngineContext, id: AId, off: u32, len: u32) -> Val {
        let size = ctx.alloc_size(id);
        if let Some(store) = self.map.get(&id) {
            return store.read_range(off, len, size);
        }
        if self.all_others_clobbered {
            return Val::Overdefined;
        }
        match ctx.base_store_entry(id) {
            Some(store) => store.read_range(off, len, size),
            None => Val::Overdefined,
        }
    }

    /// The sole entry point for mutation (§4.4's `getWritableStoreFor`).
    /// Implements the decision table verbatim:
    ///
    /// | current | covers whole? | action |
    /// |---|---|---|
    /// | none, `Certain` & `!all_others_clobbered` | any | write through to base store |
    /// | none | yes | new `Single` |
    /// | none | no | new `Multi` baselined on the base store |
    /// | `Single` | yes | keep `Single` |
    /// | `Single` | no | promote to `Multi`, old `Single` as baseline |
    /// | `Multi` shared | either | COW-break: new `Multi`, same baseline |
    /// | `Multi` private | either | mutate in place |
    pub fn get_writable_store_for(
        &mut self,
        ctx: &mut EngineContext,
        id: AId,
        will_cover_whole: bool,
        status: BlockStatus,
    ) -> &mut HStore {
        if !self.map.contains_key(&id) {
            if should_commit(status, self.all_others_clobbered) && !self.all_others_clobbered {
                return ctx.base_store_writable(id, will_cover_whole);
            }
            let fresh = if will_cover_whole {
                HStore::new_single(Val::Bottom)
            } else {
                let baseline = ctx.base_store_entry(id).cloned();
                HStore::Multi(MultiStore::with_baseline(baseline))
            };
            self.map.insert(id, Rc::new(fresh));
            return Rc::get_mut(self.map.get_mut(&id).unwrap()).expect("just inserted, unshared");
        }

        let needs_promotion = matches!(
            self.map.get(&id).map(|rc| rc.as_ref()),
            Some(HStore::Single(_))
        ) && !will_cover_whole;
        if needs_promotion {
            let old = self.map.remove(&id).unwrap();
            let HStore::Single(v) = old.as_ref().clone() else {
                unreachable!()
            };
            let promoted = HStore::Multi(MultiStore::with_baseline(Some(Rc::new(
                HStore::Single(v),
            ))));
            self.map.insert(id, Rc::new(promoted));
            return Rc::get_mut(self.map.get_mut(&id).unwrap()).expect("just inserted, unshared");
        }

        let entry = self.map.get_mut(&id).unwrap();
        if Rc::strong_count(entry) > 1 {
            let cloned = entry.as_ref().clone();
            *entry = Rc::new(cloned);
        }
        Rc::get_mut(entry).expect("single owner after COW-break")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::special::SpecialFunctionTable;
    use crate::ir::types::{IntWidth, Type};
    use cranelift_entity::EntityRef;

    fn test_ctx() -> EngineContext {
        EngineContext::new(SpecialFunctionTable::new())
    }

    #[test]
    fn fresh_entry_creates_single_when_covering_whole() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(4),
            Type::Int(IntWidth::I32),
        );
        let mut bs = BStore::new();
        let store = bs.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown);
        assert!(!store.is_multi());
    }

    #[test]
    fn partial_write_promotes_single_to_multi() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(4),
            Type::Int(IntWidth::I32),
        );
        let mut bs = BStore::new();
        {
            let store = bs.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown);
            store.write_pb(0, 4, Val::scalar_int(Type::Int(IntWidth::I32), 7), Some(4));
        }
        {
            let store = bs.get_writable_store_for(&mut ctx, id, false, BlockStatus::Unknown);
            assert!(store.is_multi());
        }
    }

    #[test]
    fn cow_break_on_shared_multi() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(8),
            Type::Int(IntWidth::I64),
        );
        let mut bs_a = BStore::new();
        bs_a.get_writable_store_for(&mut ctx, id, false, BlockStatus::Unknown);
        let shared = bs_a.map.get(&id).unwrap().clone();
        let mut bs_b = BStore::new();
        bs_b.install(id, shared.clone());
        assert_eq!(Rc::strong_count(&shared), 3); // bs_a, bs_b, local `shared`
        bs_b.get_writable_store_for(&mut ctx, id, false, BlockStatus::Unknown);
        assert!(!Rc::ptr_eq(bs_a.map.get(&id).unwrap(), bs_b.map.get(&id).unwrap()));
    }

    #[test]
    fn write_through_to_base_when_certain_and_not_clobbered() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(4),
            Type::Int(IntWidth::I32),
        );
        let mut bs = BStore::new();
        bs.get_writable_store_for(&mut ctx, id, true, BlockStatus::Certain)
            .write_pb(0, 4, Val::scalar_int(Type::Int(IntWidth::I32), 9), Some(4));
        assert!(bs.local(id).is_none());
        assert!(ctx.base_store_entry(id).is_some());
    }
}
