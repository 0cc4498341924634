//! AA — Alias Queries: Must/May/Partial/No-alias over symbolic
//! pointers (§4.7).

use crate::context::EngineContext;
use crate::entities::AId;
use crate::value::{Offset, Val};

/// The result of an [`alias`] query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AliasResult {
    /// The two accesses are provably to the same bytes.
    Must,
    /// The two accesses provably touch disjoint bytes.
    No,
    /// At least one base precisely overlaps but an unknown offset
    /// means the overlap can't be pinned down further.
    Partial,
    /// Neither provable disjointness nor a precise must-alias; treat
    /// conservatively as potentially overlapping.
    May,
}

/// `bases alias`: do `a` and `b` name storage that can overlap?
///
/// `AId`s are already the finest-grained identity this crate hands
/// out — two peels of the same loop, or two inlined copies of the
/// same callee, receive distinct tokens precisely so they do *not*
/// alias (§3: "two peels of the same loop... produce distinct `AId`s
/// for 'the same' source-level allocation"). So structural "call-
/// context containment" collapses to plain equality here; the one
/// remaining wrinkle the original models — an instruction-identity
/// base observed from two different, nested call contexts — doesn't
/// arise in this crate's model because every such instance already
/// gets its own `AId` at creation (see [`crate::context::EngineContext::new_alloc`]).
fn bases_alias(a: AId, b: AId) -> bool {
    a == b
}

fn intervals_overlap(off_a: i64, size_a: u32, off_b: i64, size_b: u32) -> bool {
    let a_lo = off_a;
    let a_hi = off_a + size_a as i64;
    let b_lo = off_b;
    let b_hi = off_b + size_b as i64;
    a_lo < b_hi && b_lo < a_hi
}

/// Resolve whether an access of `size1` bytes through `p1` can alias
/// an access of `size2` bytes through `p2` (§4.7).
pub fn alias(_ctx: &EngineContext, p1: &Val, size1: u32, p2: &Val, size2: u32) -> AliasResult {
    let (Val::Ptr(a), Val::Ptr(b)) = (p1, p2) else {
        return AliasResult::May;
    };
    if a.is_empty() || b.is_empty() {
        return AliasResult::May;
    }

    if a.len() == 1 && b.len() == 1 {
        let ma = a[0];
        let mb = b[0];
        if bases_alias(ma.base, mb.base) {
            if let (Offset::Precise(oa), Offset::Precise(ob)) = (ma.offset, mb.offset) {
                if oa == ob && size1 == size2 {
                    return AliasResult::Must;
                }
                return if intervals_overlap(oa, size1, ob, size2) {
                    AliasResult::May
                } else {
                    AliasResult::No
                };
            }
        }
    }

    let mut any_base_alias = false;
    let mut any_unknown_overlap = false;
    for ma in a {
        for mb in b {
            if bases_alias(ma.base, mb.base) {
                any_base_alias = true;
                if ma.offset.is_unknown() || mb.offset.is_unknown() {
                    any_unknown_overlap = true;
                }
            }
        }
    }
    if !any_base_alias {
        return AliasResult::No;
    }
    if any_unknown_overlap {
        return AliasResult::Partial;
    }
    AliasResult::May
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::special::SpecialFunctionTable;
    use cranelift_entity::EntityRef;

    fn test_ctx() -> EngineContext {
        EngineContext::new(SpecialFunctionTable::new())
    }

    fn aid(n: u32) -> AId {
        AId::new(n as usize)
    }

    #[test]
    fn identical_precise_pointers_must_alias() {
        let ctx = test_ctx();
        let p = Val::ptr(aid(1), 4);
        assert_eq!(alias(&ctx, &p, 4, &p, 4), AliasResult::Must);
    }

    #[test]
    fn disjoint_bases_never_alias() {
        let ctx = test_ctx();
        let p1 = Val::ptr(aid(1), 0);
        let p2 = Val::ptr(aid(2), 0);
        assert_eq!(alias(&ctx, &p1, 4, &p2, 4), AliasResult::No);
    }

    #[test]
    fn same_base_disjoint_offsets_no_alias() {
        let ctx = test_ctx();
        let p1 = Val::ptr(aid(1), 0);
        let p2 = Val::ptr(aid(1), 8);
        assert_eq!(alias(&ctx, &p1, 4, &p2, 4), AliasResult::No);
    }

    #[test]
    fn same_base_overlapping_offsets_may_alias() {
        let ctx = test_ctx();
        let p1 = Val::ptr(aid(1), 0);
        let p2 = Val::ptr(aid(1), 2);
        assert_eq!(alias(&ctx, &p1, 4, &p2, 4), AliasResult::May);
    }

    #[test]
    fn unknown_offset_same_base_is_partial() {
        let ctx = test_ctx();
        let p1 = Val::ptr(aid(1), 0);
        let vague = Val::Ptr(smallvec::smallvec![crate::value::PtrMember {
            base: aid(1),
            offset: Offset::Unknown,
        }]);
        assert_eq!(alias(&ctx, &p1, 4, &vague, 4), AliasResult::Partial);
    }

    #[test]
    fn non_pointer_values_are_conservative_may() {
        let ctx = test_ctx();
        let scalar = Val::scalar_int(crate::ir::types::Type::Int(crate::ir::types::IntWidth::I32), 0);
        let ptr = Val::ptr(aid(1), 0);
        assert_eq!(alias(&ctx, &scalar, 4, &ptr, 4), AliasResult::May);
    }
}
