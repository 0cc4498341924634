//! The DSE map (§3, §4.8): per-allocation byte intervals whose values
//! are *sets* of tracked stores, plus the per-allocation tracked-alloc
//! handle. Reuses [`crate::heap::interval::IntervalMap`] the same way
//! `HStore` does, with `T = FxHashSet<TsRef>` instead of `T = Val`.

use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::dse::ta::TaRef;
use crate::dse::ts::TsRef;
use crate::entities::AId;
use crate::fx::{FxHashMap, FxHashSet};
use crate::heap::interval::IntervalMap;

/// One allocation's DSE bookkeeping: which tracked stores still cover
/// which bytes, and (once created) its tracked-alloc handle.
#[derive(Clone, Debug, Default)]
pub struct DseAlloc {
    intervals: IntervalMap<FxHashSet<TsRef>>,
    ta: Option<TaRef>,
}

impl DseAlloc {
    fn new() -> Self {
        DseAlloc::default()
    }

    /// The tracked-alloc handle, creating one for `site` if this is
    /// the first time this allocation was written/allocated.
    pub fn ta_or_insert(&mut self, site: crate::entities::InstId) -> TaRef {
        self.ta.get_or_insert_with(|| TaRef::new(site)).clone()
    }

    /// The tracked-alloc handle, if one exists yet.
    pub fn ta(&self) -> Option<&TaRef> {
        self.ta.as_ref()
    }
}

/// The whole-program-reachable-at-this-point DSE state: one
/// [`DseAlloc`] per allocation that has been written or read so far on
/// this control-flow path (§3).
#[derive(Clone, Debug, Default)]
pub struct DseStore {
    map: FxHashMap<AId, DseAlloc>,
}

impl DseStore {
    /// An empty state (the entry state of a function with no prior
    /// writes observed).
    pub fn new() -> Self {
        DseStore::default()
    }

    /// Every tracked store reachable from any allocation in this
    /// state, for the post-pass and for tests.
    pub fn all_tracked_stores(&self) -> FxHashSet<TsRef> {
        let mut out = FxHashSet::default();
        for alloc in self.map.values() {
            for (_, _, set) in alloc.intervals.entries() {
                for ts in set {
                    out.insert(ts.clone());
                }
            }
        }
        out
    }

    /// **Store** transfer function (§4.8): punch `[off, off+len)` for
    /// `id`, dereferencing every tracked store that loses bytes, then
    /// install a fresh tracked store covering the whole written range.
    pub fn on_store(
        &mut self,
        id: AId,
        off: u32,
        len: u32,
        owner: crate::entities::InstId,
    ) -> TsRef {
        let alloc = self.map.entry(id).or_insert_with(DseAlloc::new);
        let removed = alloc.intervals.punch(off, off + len);
        for (lo, hi, set) in removed {
            for ts in set {
                ts.dec_outstanding(hi - lo);
            }
        }
        let ts = TsRef::new(owner, off, len);
        let mut set = FxHashSet::default();
        set.insert(ts.clone());
        alloc.intervals.write(off, off + len, set);
        ts
    }

    /// **Read** transfer function: every tracked store overlapping
    /// `[off, off+len)` for `id` has exactly that overlap marked
    /// needed (not its whole range — a store read only in part can
    /// still have its untouched part proven dead, §8 scenario 4), then
    /// that coverage is erased from the map (the bytes are no longer
    /// "pending"; a future overwrite of them starts a fresh tracked
    /// store).
    pub fn on_read(&mut self, id: AId, off: u32, len: u32) {
        let Some(alloc) = self.map.get_mut(&id) else {
            return;
        };
        let removed = alloc.intervals.punch(off, off + len);
        for (lo, hi, set) in removed {
            for ts in set {
                ts.mark_needed_range(lo, hi);
                ts.dec_outstanding(hi - lo);
            }
        }
    }

    /// A read through an imprecise pointer (§4.8): mark every tracked
    /// store in the whole state needed, then reset to empty — none of
    /// it is "pending" with respect to a known allocation any more.
    pub fn on_imprecise_read(&mut self) {
        for ts in self.all_tracked_stores() {
            ts.mark_needed();
        }
        for alloc in self.map.values_mut() {
            alloc.intervals = IntervalMap::new();
        }
    }

    /// A program point requiring a runtime fallback check (§4.8):
    /// treated identically to a read of everything live.
    pub fn on_runtime_check_point(&mut self) {
        self.on_imprecise_read();
    }

    /// **Free** transfer function: release the tracked coverage for
    /// `id` (as an overwrite, not a read — nothing here was proven
    /// needed just because the allocation died) and drop one
    /// reference from its tracked-alloc handle.
    pub fn on_free(&mut self, id: AId) {
        if let Some(alloc) = self.map.get_mut(&id) {
            let all = core::mem::take(&mut alloc.intervals);
            for (lo, hi, set) in all.entries() {
                for ts in set {
                    ts.dec_outstanding(hi - lo);
                }
            }
            if let Some(ta) = &alloc.ta {
                ta.dec_ref();
            }
        }
    }

    /// A library call's declared write effect on `id` (§4.8's "Call"
    /// rule, annotated-syscall branch): behaves like an overwrite —
    /// the bytes are retired, not marked needed, since the call's own
    /// effect is opaque but known to be a write rather than a read.
    pub fn on_annotated_write(&mut self, id: AId, off: u32, len: u32) {
        let Some(alloc) = self.map.get_mut(&id) else {
            return;
        };
        let removed = alloc.intervals.punch(off, off + len);
        for (lo, hi, set) in removed {
            for ts in set {
                ts.dec_outstanding(hi - lo);
            }
        }
    }

    /// A library call's declared read effect on `id`.
    pub fn on_annotated_read(&mut self, id: AId, off: u32, len: u32) {
        self.on_read(id, off, len);
    }

    /// The tracked-alloc handle for `id`, creating it if this is the
    /// first write/allocation observed for it.
    pub fn ta_or_insert(&mut self, id: AId, site: crate::entities::InstId) -> TaRef {
        self.map.entry(id).or_insert_with(DseAlloc::new).ta_or_insert(site)
    }

    /// Garbage-collect entries whose every tracked store is already
    /// `is_needed` (§4.8's GC pass at merge points — they can never
    /// become eliminable, so there's no reason to keep walking them).
    pub fn gc(&mut self) {
        for alloc in self.map.values_mut() {
            let mut kept: SmallVec<[(u32, u32, FxHashSet<TsRef>); 4]> = SmallVec::new();
            for (lo, hi, set) in alloc.intervals.entries() {
                if !set.iter().all(|ts| ts.borrow().is_needed()) {
                    kept.push((*lo, *hi, set.clone()));
                }
            }
            let mut fresh = IntervalMap::new();
            for (lo, hi, set) in kept {
                fresh.write(lo, hi, set);
            }
            alloc.intervals = fresh;
        }
    }
}

/// **Join** (§4.8): union two states byte-wise. A tracked store
/// referenced from the *same byte range* on both incoming sides has
/// its `outstanding_bytes` bumped by that range's width — the merged
/// map now represents two control-flow paths that will each eventually
/// drop their own reference to it, so both must be counted.
pub fn join(a: &DseStore, b: &DseStore) -> DseStore {
    let mut ids: FxHashSet<AId> = FxHashSet::default();
    ids.extend(a.map.keys().copied());
    ids.extend(b.map.keys().copied());
    let mut out = DseStore::new();
    for id in ids {
        let alloc = join_alloc(a.map.get(&id), b.map.get(&id));
        out.map.insert(id, alloc);
    }
    out
}

fn join_alloc(a: Option<&DseAlloc>, b: Option<&DseAlloc>) -> DseAlloc {
    let ta = a
        .and_then(|x| x.ta.clone())
        .or_else(|| b.and_then(|x| x.ta.clone()));
    let entries_a: Vec<_> = a
        .map(|x| x.intervals.entries().cloned().collect())
        .unwrap_or_default();
    let entries_b: Vec<_> = b
        .map(|x| x.intervals.entries().cloned().collect())
        .unwrap_or_default();

    let mut boundaries: SmallVec<[u32; 8]> = SmallVec::new();
    for (lo, hi, _) in entries_a.iter().chain(entries_b.iter()) {
        boundaries.push(*lo);
        boundaries.push(*hi);
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut merged = IntervalMap::new();
    for w in boundaries.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        if lo >= hi {
            continue;
        }
        let set_a = find_set(&entries_a, lo, hi);
        let set_b = find_set(&entries_b, lo, hi);
        if set_a.is_none() && set_b.is_none() {
            continue;
        }
        let mut union: FxHashSet<TsRef> = FxHashSet::default();
        if let Some(s) = set_a {
            union.extend(s.iter().cloned());
        }
        if let Some(s) = set_b {
            union.extend(s.iter().cloned());
        }
        if let (Some(sa), Some(sb)) = (set_a, set_b) {
            for ts in sa.intersection(sb) {
                ts.inc_outstanding(hi - lo);
            }
        }
        merged.write(lo, hi, union);
    }
    DseAlloc {
        intervals: merged,
        ta,
    }
}

fn find_set<'a>(
    entries: &'a [(u32, u32, FxHashSet<TsRef>)],
    lo: u32,
    hi: u32,
) -> Option<&'a FxHashSet<TsRef>> {
    entries
        .iter()
        .find(|(elo, ehi, _)| *elo <= lo && hi <= *ehi)
        .map(|(_, _, s)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn aid(n: u32) -> AId {
        AId::new(n as usize)
    }
    fn inst(n: u32) -> crate::entities::InstId {
        crate::entities::InstId::new(n as usize)
    }

    #[test]
    fn store_then_full_overwrite_kills_first_store() {
        let mut dse = DseStore::new();
        let first = dse.on_store(aid(0), 0, 8, inst(1));
        let _second = dse.on_store(aid(0), 0, 8, inst(2));
        assert!(first.can_kill());
    }

    #[test]
    fn partial_overwrite_leaves_head_needed_tail_dead() {
        // Scenario 4 from §8: an 8-byte store, later read of [4,8) only,
        // then the allocation goes out of scope (retiring the untouched
        // [0,4) without ever reading it).
        let mut dse = DseStore::new();
        let store = dse.on_store(aid(0), 0, 8, inst(1));
        dse.on_read(aid(0), 4, 4);
        dse.on_free(aid(0));
        // The whole instruction can't be killed outright (part of it was
        // read), but [0,4) was never observed by any read and has
        // drained to zero outstanding bytes, so it's independently dead.
        assert!(!store.can_kill());
        assert!(store.borrow().can_kill_range(0, 4));
        assert!(!store.borrow().can_kill_range(4, 8));
        assert_eq!(store.borrow().dead_ranges().as_slice(), &[(0, 4)]);
    }

    #[test]
    fn opaque_clobber_marks_everything_needed() {
        let mut dse = DseStore::new();
        let ts = dse.on_store(aid(0), 0, 4, inst(1));
        dse.on_imprecise_read();
        assert!(ts.is_needed());
    }

    #[test]
    fn join_of_shared_ts_doubles_outstanding_bytes() {
        let mut left = DseStore::new();
        let ts = left.on_store(aid(0), 0, 4, inst(1));
        let mut right = DseStore::new();
        right
            .map
            .entry(aid(0))
            .or_insert_with(DseAlloc::new)
            .intervals
            .write(0, 4, {
                let mut s = FxHashSet::default();
                s.insert(ts.clone());
                s
            });
        assert_eq!(ts.borrow().outstanding_bytes, 4);
        let _joined = join(&left, &right);
        assert_eq!(ts.borrow().outstanding_bytes, 8);
    }

    #[test]
    fn free_releases_coverage_without_marking_needed() {
        let mut dse = DseStore::new();
        let ts = dse.on_store(aid(0), 0, 4, inst(1));
        dse.on_free(aid(0));
        assert!(ts.can_kill());
        assert!(!ts.is_needed());
    }
}
