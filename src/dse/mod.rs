//! DSE — Dead Store Elimination tracking (§3, §4.8): per-store and
//! per-allocation reference-counted liveness records (`ts`, `ta`), the
//! byte-interval map that owns them (`map`), and the tracker that
//! drives the whole-program post-pass.

pub mod map;
pub mod ta;
pub mod ts;

use alloc::vec::Vec;

pub use map::{join, DseAlloc, DseStore};
pub use ta::TaRef;
pub use ts::TsRef;

use crate::entities::{AId, InstId};

/// How often the post-pass logs a progress line (SPEC_FULL.md §B,
/// grounded in LLPE's periodic `errs() << "..."` progress prints during
/// its store/alloc sweep).
const DSE_PROGRESS_STRIDE: usize = 1024;

/// Owns every `TsRef`/`TaRef` ever created during a run, so the
/// post-pass can sweep all of them regardless of which `DseStore`
/// still references them at the point the pass runs.
#[derive(Default)]
pub struct DseTracker {
    all_stores: Vec<TsRef>,
    all_allocs: Vec<TaRef>,
}

/// What the post-pass decided: instructions and allocation sites that
/// may be deleted from the residual program.
#[derive(Debug, Default, Clone)]
pub struct DseResult {
    /// Store instructions proven dead.
    pub dead_stores: Vec<InstId>,
    /// Allocation sites proven unreferenced.
    pub dead_allocs: Vec<InstId>,
}

impl DseTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        DseTracker::default()
    }

    /// Register a freshly created tracked store so the post-pass can
    /// see it even after it's been punched out of every live map.
    pub fn record_store(&mut self, ts: TsRef) {
        self.all_stores.push(ts);
    }

    /// Register a freshly created tracked allocation.
    pub fn record_alloc(&mut self, ta: TaRef) {
        self.all_allocs.push(ta);
    }

    /// Run a store through [`DseStore::on_store`], recording the
    /// resulting handle for the post-pass.
    pub fn on_store(&mut self, state: &mut DseStore, id: AId, off: u32, len: u32, owner: InstId) -> TsRef {
        let ts = state.on_store(id, off, len, owner);
        self.record_store(ts.clone());
        ts
    }

    /// Run an allocation through [`DseStore::ta_or_insert`], recording
    /// the resulting handle on first creation only (subsequent calls
    /// return the same handle and do not re-register it).
    pub fn on_alloc(&mut self, state: &mut DseStore, id: AId, site: InstId) -> TaRef {
        let ta = state.ta_or_insert(id, site);
        if self.all_allocs.iter().all(|existing| existing != &ta) {
            self.record_alloc(ta.clone());
        }
        ta
    }

    /// The whole-program post-pass (§4.8's final sweep): walk every
    /// tracked store and allocation ever created and collect the ones
    /// that can still be killed/removed, logging progress every
    /// [`DSE_PROGRESS_STRIDE`] records per SPEC_FULL.md §B.
    pub fn finalize(&self) -> DseResult {
        let mut result = DseResult::default();
        let total = self.all_stores.len() + self.all_allocs.len();
        let mut walked = 0usize;

        for ts in &self.all_stores {
            if ts.can_kill() {
                result.dead_stores.push(ts.owner());
            }
            walked += 1;
            if walked % DSE_PROGRESS_STRIDE == 0 {
                log::trace!("dse post-pass: {walked}/{total} records swept");
            }
        }
        for ta in &self.all_allocs {
            if ta.can_remove() {
                result.dead_allocs.push(ta.site());
            }
            walked += 1;
            if walked % DSE_PROGRESS_STRIDE == 0 {
                log::trace!("dse post-pass: {walked}/{total} records swept");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn aid(n: u32) -> AId {
        AId::new(n as usize)
    }
    fn inst(n: u32) -> InstId {
        InstId::new(n as usize)
    }

    #[test]
    fn finalize_reports_stores_that_drained_to_zero_and_were_never_read() {
        let mut tracker = DseTracker::new();
        let mut state = DseStore::new();
        let first = tracker.on_store(&mut state, aid(0), 0, 4, inst(1));
        let _second = tracker.on_store(&mut state, aid(0), 0, 4, inst(2));
        assert!(first.can_kill());
        let result = tracker.finalize();
        assert_eq!(result.dead_stores, alloc::vec![inst(1)]);
    }

    #[test]
    fn finalize_skips_stores_marked_needed() {
        let mut tracker = DseTracker::new();
        let mut state = DseStore::new();
        let ts = tracker.on_store(&mut state, aid(0), 0, 4, inst(1));
        ts.mark_needed();
        let result = tracker.finalize();
        assert!(result.dead_stores.is_empty());
    }

    #[test]
    fn finalize_reports_allocations_with_no_remaining_references() {
        let mut tracker = DseTracker::new();
        let mut state = DseStore::new();
        let ta = tracker.on_alloc(&mut state, aid(0), inst(1));
        ta.dec_ref();
        let result = tracker.finalize();
        assert_eq!(result.dead_allocs, alloc::vec![inst(1)]);
    }

    #[test]
    fn on_alloc_does_not_double_register_the_same_handle() {
        let mut tracker = DseTracker::new();
        let mut state = DseStore::new();
        let _ = tracker.on_alloc(&mut state, aid(0), inst(1));
        let _ = tracker.on_alloc(&mut state, aid(0), inst(1));
        assert_eq!(tracker.all_allocs.len(), 1);
    }
}
