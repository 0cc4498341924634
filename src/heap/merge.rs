//! MB — Merge at Joins: combine N predecessor block-stores into one
//! entry store, walking common-ancestor baseline chains to merge
//! `HStore`s byte-range by byte-range (§4.5).

use alloc::rc::Rc;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::context::EngineContext;
use crate::entities::AId;
use crate::heap::block_store::{should_commit, BStore, BlockStatus};
use crate::heap::store::{HStore, MultiStore};
use crate::value::Val;

/// Merge `preds`' exit stores into one entry store for a block with
/// the given [`BlockStatus`] (§4.5). Predecessors that are the exact
/// same shared handle (by `Rc` identity) are deduplicated first, since
/// "identical stores merge trivially".
pub fn merge_block_stores(
    ctx: &mut EngineContext,
    preds: &[Rc<BStore>],
    status: BlockStatus,
) -> BStore {
    let mut unique: Vec<&Rc<BStore>> = Vec::new();
    'dedup: for p in preds {
        for u in &unique {
            if Rc::ptr_eq(p, u) {
                continue 'dedup;
            }
        }
        unique.push(p);
    }
    let Some((first, rest)) = unique.split_first() else {
        return BStore::new();
    };
    let null_alloc = ctx.null_alloc();
    let mut acc: BStore = first.as_ref().clone();
    for p in rest {
        acc = merge_two(ctx, &acc, p, null_alloc);
    }
    if should_commit(status, acc.all_others_clobbered()) {
        commit_to_base(ctx, &mut acc);
    }
    acc
}

fn merge_two(ctx: &EngineContext, a: &BStore, b: &BStore, null_alloc: AId) -> BStore {
    let clobbered = a.all_others_clobbered() || b.all_others_clobbered();
    let mut result = BStore::new();
    if clobbered {
        result.clobber_all();
        for (id, a_store) in a.entries() {
            if let Some(b_store) = b.local(id) {
                let merged = merge_hstore(a_store, b_store, ctx.alloc_size(id), null_alloc);
                result.install(id, Rc::new(merged));
            }
        }
    } else {
        for (id, a_store) in a.entries() {
            match b.local_rc(id) {
                Some(b_store) => {
                    let merged = merge_hstore(a_store, b_store, ctx.alloc_size(id), null_alloc);
                    result.install(id, Rc::new(merged));
                }
                None => result.install(id, a_store.clone()),
            }
        }
        for (id, b_store) in b.entries() {
            if a.local(id).is_none() {
                result.install(id, b_store.clone());
            }
        }
    }
    result
}

fn commit_to_base(ctx: &mut EngineContext, acc: &mut BStore) {
    let ids: Vec<AId> = acc.entries().map(|(id, _)| id).collect();
    for id in ids {
        if let Some(store) = acc.local_rc(id).cloned() {
            ctx.commit_base_store(id, store);
            acc.clear_local(id);
        }
    }
}

/// Merge two `HStore`s for the same allocation (§4.5 step 3).
fn merge_hstore(a: &HStore, b: &HStore, size: Option<u32>, null_alloc: AId) -> HStore {
    match (a, b) {
        (HStore::Single(va), HStore::Single(vb)) => HStore::Single(va.merge(vb, null_alloc)),
        _ => merge_multi(a, b, size, null_alloc),
    }
}

fn baseline_chain(h: &HStore) -> SmallVec<[Rc<HStore>; 4]> {
    let mut chain = SmallVec::new();
    let mut cur = h.baseline().cloned();
    while let Some(b) = cur {
        let next = b.baseline().cloned();
        chain.push(b);
        cur = next;
    }
    chain
}

/// Walk each side's baseline chain and find the first node shared by
/// both (§4.5: "stopping descent at a common ancestor ... or 'no
/// common ancestor' if the target is a new base store"). Marking
/// visited nodes and the finite-DAG guarantee together bound this
/// search (§4.5's termination note).
fn common_ancestor(a: &HStore, b: &HStore) -> Option<Rc<HStore>> {
    let chain_a = baseline_chain(a);
    let chain_b = baseline_chain(b);
    for ca in &chain_a {
        for cb in &chain_b {
            if Rc::ptr_eq(ca, cb) {
                return Some(ca.clone());
            }
        }
    }
    None
}

fn find_covering<'a>(extents: &'a [(u32, u32, Val)], lo: u32, hi: u32) -> Option<Val> {
    extents.iter().find_map(|(elo, ehi, v)| {
        if *elo <= lo && hi <= *ehi {
            if *elo == lo && *ehi == hi {
                Some(v.clone())
            } else {
                Some(v.slice(lo - elo, hi - lo))
            }
        } else {
            None
        }
    })
}

fn merge_multi(a: &HStore, b: &HStore, size: Option<u32>, null_alloc: AId) -> HStore {
    let Some(size) = size else {
        // No statically known extent to walk byte-by-byte; an unsized
        // allocation's Multi shape can't be merged structurally.
        return HStore::Single(Val::Overdefined);
    };
    let ancestor = common_ancestor(a, b);
    let stop = ancestor.as_ref();
    let extents_a = a.read_range_multi(0, size, Some(size), stop);
    let extents_b = b.read_range_multi(0, size, Some(size), stop);

    let mut boundaries: SmallVec<[u32; 8]> = SmallVec::new();
    boundaries.push(0);
    boundaries.push(size);
    for (lo, hi, _) in extents_a.iter().chain(extents_b.iter()) {
        boundaries.push(*lo);
        boundaries.push(*hi);
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut multi = MultiStore::with_baseline(ancestor.clone());
    for w in boundaries.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        if lo >= hi {
            continue;
        }
        let a_val = find_covering(&extents_a, lo, hi);
        let b_val = find_covering(&extents_b, lo, hi);
        match (a_val, b_val) {
            (Some(va), Some(vb)) => {
                multi.write(lo, hi, va.merge(&vb, null_alloc));
            }
            (Some(va), None) => {
                let merged = match &ancestor {
                    Some(anc) => va.merge(&anc.read_range(lo, hi - lo, Some(size)), null_alloc),
                    None => Val::Overdefined,
                };
                multi.write(lo, hi, merged);
            }
            (None, Some(vb)) => {
                let merged = match &ancestor {
                    Some(anc) => vb.merge(&anc.read_range(lo, hi - lo, Some(size)), null_alloc),
                    None => Val::Overdefined,
                };
                multi.write(lo, hi, merged);
            }
            (None, None) => {
                // Neither side covers this range; defer to the new
                // baseline (the common ancestor, if any) rather than
                // writing an entry at all.
            }
        }
    }
    HStore::Multi(multi)
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
    fn merge_with_self_clone_is_identity() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(4),
            Type::Int(IntWidth::I32),
        );
        let mut a = BStore::new();
        a.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
            .write_pb(0, 4, Val::scalar_int(Type::Int(IntWidth::I32), 5), Some(4));
        let a = Rc::new(a);
        let merged = merge_block_stores(&mut ctx, &[a.clone(), a.clone()], BlockStatus::Unknown);
        assert_eq!(
            merged.read_range(&ctx, id, 0, 4),
            Val::scalar_int(Type::Int(IntWidth::I32), 5)
        );
    }

    #[test]
    fn branch_merge_at_pointer_offset_yields_bounded_set() {
        // Scenario 2 from §8: two branches write different bytes to
        // the same location; after merge the result is a bounded set,
        // not overdefined.
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(1),
            Type::Int(IntWidth::I8),
        );
        let mut a = BStore::new();
        a.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
            .write_pb(0, 1, Val::scalar_int(Type::Int(IntWidth::I8), 0xAA), Some(1));
        let mut b = BStore::new();
        b.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
            .write_pb(0, 1, Val::scalar_int(Type::Int(IntWidth::I8), 0xBB), Some(1));
        let merged = merge_block_stores(
            &mut ctx,
            &[Rc::new(a), Rc::new(b)],
            BlockStatus::Unknown,
        );
        let result = merged.read_range(&ctx, id, 0, 1);
        assert!(!result.is_overdefined());
        match result {
            Val::Scalar(members) => assert_eq!(members.len(), 2),
            other => panic!("expected bounded scalar set, got {other:?}"),
        }
    }

    #[test]
    fn merge_with_empty_store_returns_copy_of_self() {
        let mut ctx = test_ctx();
        let id = ctx.new_alloc(
            crate::entities::AIdKind::Global(crate::entities::GlobalId::new(0)),
            Some(4),
            Type::Int(IntWidth::I32),
        );
        let mut a = BStore::new();
        a.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
            .write_pb(0, 4, Val::scalar_int(Type::Int(IntWidth::I32), 9), Some(4));
        let empty = Rc::new(BStore::new());
        let a = Rc::new(a);
        let merged = merge_block_stores(&mut ctx, &[a.clone(), empty], BlockStatus::Unknown);
        assert_eq!(
            merged.read_range(&ctx, id, 0, 4),
            Val::scalar_int(Type::Int(IntWidth::I32), 9)
        );
    }
}
