//! A single tracked store (`TS`, §3, §4.8): the per-store-instruction
//! bookkeeping record DSE maintains to decide whether that store can
//! be eliminated.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::entities::InstId;

/// The record itself. Reached only through [`TsRef`], never owned
/// directly, since the same store is referenced from every DSE map
/// entry that still covers one of its bytes.
#[derive(Debug)]
pub struct TrackedStore {
    /// The store instruction this record tracks.
    pub owner: InstId,
    /// Absolute byte offset this store wrote at.
    offset: u32,
    /// Total bytes this store wrote.
    len: u32,
    /// Bytes of this store still referenced by some live DSE map entry
    /// (§3: "§8 invariant — `outstandingBytes(TS)` equals the sum over
    /// all DSE maps of bytes where `TS` appears").
    pub outstanding_bytes: u32,
    /// Sub-ranges of `[offset, offset+len)` a read has observed, kept
    /// distinct from bytes merely retired by an overwrite/free so a
    /// store that is read only in part can still report the untouched
    /// part as eliminable (§8 scenario 4: "tail-half store eliminated;
    /// head-half retained").
    needed_ranges: SmallVec<[(u32, u32); 2]>,
    /// Whether this store has already been committed to the residual
    /// program, and if so, which replacement instructions took its
    /// place (SPEC_FULL.md §B, grounded in LLPE's `TrackedStore`:
    /// `canKill` returns false once committed without a dead-instruction
    /// list, since killing the original now requires proving every
    /// replacement dead too).
    pub committed: Option<SmallVec<[InstId; 2]>>,
}

impl TrackedStore {
    fn new(owner: InstId, offset: u32, len: u32) -> Self {
        TrackedStore {
            owner,
            offset,
            len,
            outstanding_bytes: len,
            needed_ranges: SmallVec::new(),
            committed: None,
        }
    }

    /// True if any byte of this store has ever been observed by a
    /// read (whole-store granularity; see [`TrackedStore::dead_ranges`]
    /// for the per-byte picture).
    pub fn is_needed(&self) -> bool {
        !self.needed_ranges.is_empty()
    }

    /// `canKill`: true if this store may still be eliminated in full —
    /// never read anywhere in its range, never committed without all
    /// replacements also proven dead, and no outstanding bytes remain.
    pub fn can_kill(&self) -> bool {
        if self.committed.is_some() {
            return false;
        }
        self.outstanding_bytes == 0 && self.needed_ranges.is_empty()
    }

    /// The sub-ranges of this store's own write range that are
    /// provably dead: every byte has been retired (by a read, an
    /// overwrite, or a free — `outstanding_bytes == 0`) and the
    /// surviving range was never part of a read (§8 scenario 4). Empty
    /// while any byte of the store is still live, or once committed.
    pub fn dead_ranges(&self) -> SmallVec<[(u32, u32); 2]> {
        if self.committed.is_some() || self.outstanding_bytes != 0 {
            return SmallVec::new();
        }
        subtract_ranges(self.offset, self.offset + self.len, &self.needed_ranges)
    }

    /// True if `[lo, hi)` of this store's own write range is provably
    /// dead on its own terms, independent of whatever the rest of the
    /// store turns out to be (§8 scenario 4's per-byte elimination).
    pub fn can_kill_range(&self, lo: u32, hi: u32) -> bool {
        if self.committed.is_some() || self.outstanding_bytes != 0 {
            return false;
        }
        !self.needed_ranges.iter().any(|&(nlo, nhi)| nlo < hi && lo < nhi)
    }
}

/// Set-difference `[start, end)` minus `ranges` (which may overlap or
/// be unsorted), returning the surviving sub-ranges in order.
fn subtract_ranges(start: u32, end: u32, ranges: &[(u32, u32)]) -> SmallVec<[(u32, u32); 2]> {
    let mut cuts: SmallVec<[(u32, u32); 4]> = ranges
        .iter()
        .copied()
        .filter(|&(lo, hi)| lo < hi && lo < end && hi > start)
        .map(|(lo, hi)| (lo.max(start), hi.min(end)))
        .collect();
    cuts.sort_unstable();

    let mut out = SmallVec::new();
    let mut cursor = start;
    for (lo, hi) in cuts {
        if lo > cursor {
            out.push((cursor, lo));
        }
        cursor = cursor.max(hi);
    }
    if cursor < end {
        out.push((cursor, end));
    }
    out
}

/// A shared handle to one [`TrackedStore`], compared and hashed by
/// pointer identity (the natural Rust substitute for LLPE's raw
/// refcounted `TrackedStore*`, per DESIGN.md).
#[derive(Clone, Debug)]
pub struct TsRef(Rc<RefCell<TrackedStore>>);

impl TsRef {
    /// Create a freshly tracked store for `owner`, covering
    /// `[offset, offset+len)` and initially referencing all `len`
    /// bytes.
    pub fn new(owner: InstId, offset: u32, len: u32) -> Self {
        TsRef(Rc::new(RefCell::new(TrackedStore::new(owner, offset, len))))
    }

    /// Borrow the tracked record immutably.
    pub fn borrow(&self) -> core::cell::Ref<'_, TrackedStore> {
        self.0.borrow()
    }

    /// Borrow the tracked record mutably.
    pub fn borrow_mut(&self) -> core::cell::RefMut<'_, TrackedStore> {
        self.0.borrow_mut()
    }

    /// Decrement `outstanding_bytes` by `n`, saturating at zero. Called
    /// whenever a DSE map entry covering `n` of this store's bytes is
    /// punched out (overwritten, freed, or dropped at scope exit).
    pub fn dec_outstanding(&self, n: u32) {
        let mut ts = self.0.borrow_mut();
        ts.outstanding_bytes = ts.outstanding_bytes.saturating_sub(n);
    }

    /// Increment `outstanding_bytes` by `n` (§4.8's join rule: "every
    /// `TS` gaining bytes increases its `outstandingBytes`
    /// accordingly").
    pub fn inc_outstanding(&self, n: u32) {
        self.0.borrow_mut().outstanding_bytes += n;
    }

    /// Mark this store's whole write range as observed by an imprecise
    /// read; it can never be eliminated, in full or in part, after
    /// this.
    pub fn mark_needed(&self) {
        let mut ts = self.0.borrow_mut();
        let (offset, len) = (ts.offset, ts.len);
        ts.needed_ranges.clear();
        ts.needed_ranges.push((offset, offset + len));
    }

    /// Mark `[lo, hi)` (clamped to this store's own write range) as
    /// observed by a read, leaving any other part of the store's range
    /// free to be proven dead on its own (§8 scenario 4).
    pub fn mark_needed_range(&self, lo: u32, hi: u32) {
        let mut ts = self.0.borrow_mut();
        let (lo, hi) = (lo.max(ts.offset), hi.min(ts.offset + ts.len));
        if lo < hi {
            ts.needed_ranges.push((lo, hi));
        }
    }

    /// True if this store may still be eliminated in full.
    pub fn can_kill(&self) -> bool {
        self.0.borrow().can_kill()
    }

    /// True if any byte of this store has ever been observed by a read.
    pub fn is_needed(&self) -> bool {
        self.0.borrow().is_needed()
    }

    /// The instruction this record tracks.
    pub fn owner(&self) -> InstId {
        self.0.borrow().owner
    }
}

impl PartialEq for TsRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for TsRef {}

impl Hash for TsRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    fn inst(n: u32) -> InstId {
        InstId::new(n as usize)
    }

    #[test]
    fn fresh_store_is_killable_when_bytes_drain_to_zero() {
        let ts = TsRef::new(inst(1), 0, 4);
        assert!(!ts.can_kill());
        ts.dec_outstanding(4);
        assert!(ts.can_kill());
    }

    #[test]
    fn needed_store_is_never_killable() {
        let ts = TsRef::new(inst(1), 0, 4);
        ts.dec_outstanding(4);
        ts.mark_needed();
        assert!(!ts.can_kill());
    }

    #[test]
    fn committed_without_replacements_proven_dead_blocks_kill() {
        let ts = TsRef::new(inst(1), 0, 0);
        ts.borrow_mut().committed = Some(SmallVec::new());
        assert!(!ts.can_kill());
    }

    #[test]
    fn clones_share_identity() {
        let a = TsRef::new(inst(1), 0, 4);
        let b = a.clone();
        assert_eq!(a, b);
        b.dec_outstanding(4);
        assert!(a.can_kill());
    }

    #[test]
    fn partial_read_leaves_the_unread_half_independently_killable() {
        // §8 scenario 4: an 8-byte store, later read of [4,8) only.
        let ts = TsRef::new(inst(1), 0, 8);
        ts.dec_outstanding(4);
        ts.mark_needed_range(4, 8);
        ts.dec_outstanding(4);
        assert!(!ts.can_kill());
        assert!(ts.borrow().can_kill_range(0, 4));
        assert!(!ts.borrow().can_kill_range(4, 8));
        assert_eq!(ts.borrow().dead_ranges().as_slice(), &[(0, 4)]);
    }

    #[test]
    fn fully_read_store_has_no_dead_ranges() {
        let ts = TsRef::new(inst(1), 0, 8);
        ts.mark_needed_range(0, 8);
        ts.dec_outstanding(8);
        assert!(ts.borrow().dead_ranges().is_empty());
    }
}
