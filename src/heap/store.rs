//! HS — Heap Store: the per-allocation byte-interval map, Single/Multi
//! variants, and baseline delegation chains (§3, §4.3).

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::errors::Reason;
use crate::heap::interval::IntervalMap;
use crate::value::partial::PartialValue;
use crate::value::Val;

/// One allocation's heap store: either a single value standing for the
/// whole object, or a punched interval map delegating uncovered bytes
/// to a `baseline` (§3).
#[derive(Clone, Debug)]
pub enum HStore {
    /// A single `Val` for the entire allocation.
    Single(Val),
    /// An interval map plus optional baseline delegate.
    Multi(MultiStore),
}

/// The `Multi` variant's payload.
#[derive(Clone, Debug)]
pub struct MultiStore {
    intervals: IntervalMap<Val>,
    baseline: Option<Rc<HStore>>,
}

impl HStore {
    /// A fresh store for a just-created allocation, per §4.6
    /// ("initial `HStore` is `Single(Val = undef ...)`").
    pub fn new_single(initial: Val) -> Self {
        HStore::Single(initial)
    }

    /// True if this is the `Multi` variant.
    pub fn is_multi(&self) -> bool {
        matches!(self, HStore::Multi(_))
    }

    /// This store's baseline delegate, if it is a `Multi` with one.
    pub fn baseline(&self) -> Option<&Rc<HStore>> {
        match self {
            HStore::Multi(m) => m.baseline.as_ref(),
            HStore::Single(_) => None,
        }
    }

    /// Read `[off, off+len)`. `alloc_size` is the allocation's total
    /// byte size, if known, used to recognise a read of the whole
    /// object (§4.3: "when a whole covering interval exists, return it
    /// directly").
    pub fn read_range(&self, off: u32, len: u32, alloc_size: Option<u32>) -> Val {
        match self {
            HStore::Single(v) => {
                if off == 0 && alloc_size == Some(len) {
                    v.clone()
                } else {
                    v.slice(off, len)
                }
            }
            HStore::Multi(m) => m.read_range(off, len, alloc_size),
        }
    }

    /// The extent list used by memcpy-style transfer (§4.3's
    /// `readRangeMulti`). `stop_at`, when given, names a baseline this
    /// descent must not pass (used by merge to stop at a common
    /// ancestor); bytes beyond it are simply omitted from the result
    /// rather than filled in.
    pub fn read_range_multi(
        &self,
        off: u32,
        len: u32,
        alloc_size: Option<u32>,
        stop_at: Option<&Rc<HStore>>,
    ) -> Vec<(u32, u32, Val)> {
        match self {
            HStore::Single(v) => {
                let val = if off == 0 && alloc_size == Some(len) {
                    v.clone()
                } else {
                    v.slice(off, len)
                };
                if val.is_overdefined() {
                    Vec::new()
                } else {
                    alloc::vec![(off, off + len, val)]
                }
            }
            HStore::Multi(m) => m.read_range_multi(off, len, stop_at),
        }
    }

    /// Punch `[off, off+len)` and write `val` there (§4.3's `writePB`).
    /// A sub-range write on a `Single` promotes it to a `Multi` whose
    /// baseline is the old `Single`; a fully-covering write on a
    /// `Single` just replaces the scalar in place.
    pub fn write_pb(&mut self, off: u32, len: u32, val: Val, alloc_size: Option<u32>) {
        match self {
            HStore::Single(existing) => {
                if off == 0 && alloc_size == Some(len) {
                    *existing = val;
                } else {
                    let baseline = Rc::new(HStore::Single(existing.clone()));
                    let mut intervals = IntervalMap::new();
                    intervals.write(off, off + len, val);
                    *self = HStore::Multi(MultiStore {
                        intervals,
                        baseline: Some(baseline),
                    });
                }
            }
            HStore::Multi(m) => {
                m.intervals.write(off, off + len, val);
            }
        }
    }

    /// Bulk variant of `write_pb` used by memcpy and `va_start`: each
    /// `(lo, hi, val)` piece (relative to the source extent list) is
    /// written at `base_off + lo .. base_off + hi` (§4.3's
    /// `replaceRangeWithPBs`).
    pub fn replace_range_with_pbs(
        &mut self,
        pieces: &[(u32, u32, Val)],
        base_off: u32,
        alloc_size: Option<u32>,
    ) {
        for (lo, hi, val) in pieces {
            self.write_pb(base_off + lo, hi - lo, val.clone(), alloc_size);
        }
    }
}

impl MultiStore {
    fn read_range(&self, off: u32, len: u32, alloc_size: Option<u32>) -> Val {
        if let Some(v) = self.intervals.covering(off, len) {
            return v.clone();
        }
        let mut pv = PartialValue::new();
        let hits = self.intervals.overlapping(off, len);
        let mut cursor = off;
        for (lo, hi, sub_off, v) in hits {
            if lo > cursor {
                match self.fill_gap(cursor, lo - cursor, alloc_size) {
                    Some(gap) => {
                        if pv.combine(&gap, cursor - off, lo - off, len).is_err() {
                            return Val::Overdefined;
                        }
                    }
                    None => return Val::Overdefined,
                }
            }
            let piece_len = hi - lo;
            let piece_val = v.slice(sub_off, piece_len);
            if pv.combine(&piece_val, lo - off, hi - off, len).is_err() {
                return Val::Overdefined;
            }
            cursor = hi;
        }
        let end = off + len;
        if cursor < end {
            match self.fill_gap(cursor, end - cursor, alloc_size) {
                Some(gap) => {
                    if pv.combine(&gap, cursor - off, end - off, len).is_err() {
                        return Val::Overdefined;
                    }
                }
                None => return Val::Overdefined,
            }
        }
        pv.to_value(len).unwrap_or(Val::Overdefined)
    }

    fn fill_gap(&self, off: u32, len: u32, alloc_size: Option<u32>) -> Option<Val> {
        self.baseline
            .as_ref()
            .map(|b| b.read_range(off, len, alloc_size))
    }

    fn read_range_multi(
        &self,
        off: u32,
        len: u32,
        stop_at: Option<&Rc<HStore>>,
    ) -> Vec<(u32, u32, Val)> {
        let mut out = Vec::new();
        let hits = self.intervals.overlapping(off, len);
        let mut cursor = off;
        let end = off + len;
        for (lo, hi, sub_off, v) in &hits {
            if *lo > cursor {
                self.extend_from_baseline(cursor, lo - cursor, stop_at, &mut out);
            }
            let piece_len = hi - lo;
            let val = v.slice(*sub_off, piece_len);
            if !val.is_overdefined() {
                out.push((*lo, *hi, val));
            }
            cursor = *hi;
        }
        if cursor < end {
            self.extend_from_baseline(cursor, end - cursor, stop_at, &mut out);
        }
        out
    }

    fn extend_from_baseline(
        &self,
        off: u32,
        len: u32,
        stop_at: Option<&Rc<HStore>>,
        out: &mut Vec<(u32, u32, Val)>,
    ) {
        let Some(baseline) = &self.baseline else {
            return;
        };
        if let Some(stop) = stop_at {
            if Rc::ptr_eq(baseline, stop) {
                return;
            }
        }
        let sub = baseline.read_range_multi(off, len, None, stop_at);
        out.extend(sub);
    }

    /// Build a fresh `Multi` with `baseline` and no local coverage, the
    /// shape `MB`'s merge uses when both sides fully cover their window
    /// (§4.5).
    pub fn with_baseline(baseline: Option<Rc<HStore>>) -> Self {
        MultiStore {
            intervals: IntervalMap::new(),
            baseline,
        }
    }

    /// Punch-and-write directly on the interval map, bypassing
    /// `HStore::write_pb`'s `Single`-promotion branch (used when
    /// building a merged `Multi` piece by piece).
    pub fn write(&mut self, lo: u32, hi: u32, val: Val) {
        self.intervals.write(lo, hi, val);
    }

    /// This store's baseline, if any.
    pub fn baseline_ref(&self) -> Option<&Rc<HStore>> {
        self.baseline.as_ref()
    }

    /// True if the local interval map alone covers `[0, size)`.
    pub fn covers_whole_locally(&self, size: u32) -> bool {
        self.intervals.covering(0, size).is_some()
    }
}

/// Reason a `readRange` fell to overdefined, kept for diagnostics
/// (§7). Not every overdefined result carries one — many are simply
/// the honest lattice top — but gap-fill failures do.
pub fn gap_reason() -> Reason {
    Reason::LoadVague
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{IntWidth, Type};

    #[test]
    fn write_then_read_round_trips_through_coercion() {
        let mut s = HStore::new_single(Val::Bottom);
        let v = Val::scalar_int(Type::Int(IntWidth::I32), 0xDEAD_BEEF);
        s.write_pb(0, 4, v.clone(), Some(4));
        assert_eq!(s.read_range(0, 4, Some(4)), v);
    }

    #[test]
    fn sub_range_write_promotes_single_to_multi_with_baseline() {
        let original = Val::scalar_int(Type::Int(IntWidth::I32), 0x1122_3344);
        let mut s = HStore::new_single(original.clone());
        s.write_pb(0, 1, Val::scalar_int(Type::Int(IntWidth::I8), 0xFF), Some(4));
        assert!(s.is_multi());
        assert_eq!(s.baseline().unwrap().read_range(0, 4, Some(4)), original);
    }

    #[test]
    fn read_through_baseline_fills_gaps() {
        let baseline = Rc::new(HStore::new_single(Val::splat(0, 8)));
        let mut multi = MultiStore::with_baseline(Some(baseline));
        multi.write(2, 3, Val::scalar_int(Type::Int(IntWidth::I8), 0xFF));
        let store = HStore::Multi(multi);
        let result = store.read_range(0, 4, Some(8));
        // byte 2 is 0xFF, the rest come from the all-zero splat baseline.
        assert!(!result.is_overdefined());
    }

    #[test]
    fn read_range_multi_stops_at_named_baseline() {
        let base = Rc::new(HStore::new_single(Val::splat(0xAB, 4)));
        let mut multi = MultiStore::with_baseline(Some(base.clone()));
        multi.write(0, 2, Val::scalar_int(Type::Int(IntWidth::I16), 0x1234));
        let store = HStore::Multi(multi);
        let with_descent = store.read_range_multi(0, 4, Some(4), None);
        assert_eq!(with_descent.len(), 2);
        let stopped = store.read_range_multi(0, 4, Some(4), Some(&base));
        assert_eq!(stopped.len(), 1);
    }
}
