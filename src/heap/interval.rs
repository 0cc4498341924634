//! A small sorted interval map over byte ranges of one allocation.
//!
//! Per §3/§4.3 an `HStore`'s local contribution is "a byte-interval map
//! `[lo, hi) -> Val`, intervals non-overlapping, sorted". This is the
//! shared plumbing behind that map *and* behind the DSE map of §4.8
//! (whose values are sets of tracked stores rather than `Val`s, but
//! whose split/punch edge policy is identical) — generic over the
//! value type the same way `cranelift_bforest` is generic over its
//! leaf payload, though here a sorted `SmallVec` is the teacher-
//! proportionate choice for per-allocation interval counts (see
//! DESIGN.md).

use smallvec::SmallVec;

/// One interval map entry: `[lo, hi)` with payload `val`.
pub type Entry<T> = (u32, u32, T);

/// A sorted, disjoint map of byte ranges to values of type `T`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalMap<T> {
    entries: SmallVec<[Entry<T>; 4]>,
}

impl<T> Default for IntervalMap<T> {
    fn default() -> Self {
        IntervalMap {
            entries: SmallVec::new(),
        }
    }
}

impl<T: Clone> IntervalMap<T> {
    /// An empty map.
    pub fn new() -> Self {
        IntervalMap::default()
    }

    /// True if no byte is covered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in ascending byte order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.iter()
    }

    /// True if intervals are sorted and pairwise disjoint (§8's
    /// invariant, exposed for property tests).
    pub fn is_well_formed(&self) -> bool {
        self.entries
            .iter()
            .all(|(lo, hi, _)| lo < hi)
            && self
                .entries
                .windows(2)
                .all(|w| w[0].1 <= w[1].0)
    }

    /// The single entry that exactly covers `[off, off+len)`, if one
    /// exists (§4.3: "when a whole covering interval exists, return it
    /// directly").
    pub fn covering(&self, off: u32, len: u32) -> Option<&T> {
        let hi = off.checked_add(len)?;
        self.entries
            .iter()
            .find(|(lo, ehi, _)| *lo == off && *ehi == hi)
            .map(|(_, _, v)| v)
    }

    /// All entries overlapping `[off, off+len)`, clipped to that
    /// window, together with the sub-offset into the original entry
    /// each clipped piece starts at (so callers needing to re-slice a
    /// wider value can find where the window begins within it).
    pub fn overlapping(&self, off: u32, len: u32) -> SmallVec<[(u32, u32, u32, &T); 4]> {
        let end = off.saturating_add(len);
        let mut out = SmallVec::new();
        for (lo, hi, v) in self.entries.iter() {
            if *hi <= off || *lo >= end {
                continue;
            }
            let clip_lo = (*lo).max(off);
            let clip_hi = (*hi).min(end);
            let sub_off = clip_lo - *lo;
            out.push((clip_lo, clip_hi, sub_off, v));
        }
        out
    }

    /// Remove (and return, clipped to `[lo, hi)`) every byte currently
    /// covered in that range, splitting boundary entries so that
    /// "intervals whose start < write-start have their tail trimmed
    /// and, if their tail extends past the write, are duplicated on
    /// the right" (§4.3).
    pub fn punch(&mut self, lo: u32, hi: u32) -> SmallVec<[Entry<T>; 4]> {
        let mut removed = SmallVec::new();
        let mut kept: SmallVec<[Entry<T>; 4]> = SmallVec::new();
        for (elo, ehi, val) in self.entries.drain(..) {
            if ehi <= lo || elo >= hi {
                kept.push((elo, ehi, val));
                continue;
            }
            if elo < lo {
                kept.push((elo, lo, val.clone()));
            }
            if ehi > hi {
                kept.push((hi, ehi, val.clone()));
            }
            let clip_lo = elo.max(lo);
            let clip_hi = ehi.min(hi);
            removed.push((clip_lo, clip_hi, val));
        }
        kept.sort_by_key(|(lo, _, _)| *lo);
        self.entries = kept;
        removed
    }

    /// Punch `[lo, hi)` then insert `val` covering exactly that range,
    /// returning whatever was overwritten (§4.3's `writePB`).
    pub fn write(&mut self, lo: u32, hi: u32, val: T) -> SmallVec<[Entry<T>; 4]> {
        let removed = self.punch(lo, hi);
        let idx = self.entries.partition_point(|(elo, _, _)| *elo < lo);
        self.entries.insert(idx, (lo, hi, val));
        removed
    }
}
