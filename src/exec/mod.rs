//! SE — the symbolic executor (§4.6): one transfer function per
//! [`InstKind`](crate::ir::InstKind), threading the abstract value
//! lattice ([`crate::value`]), the layered heap
//! ([`crate::heap`]), and dead-store tracking ([`crate::dse`])
//! through a single instruction at a time.
//!
//! This module has no opinion on which block runs next, whether a call
//! is inlined, or how many times a loop is peeled — that's
//! [`crate::driver`]'s job. It only answers "given this instruction and
//! the state so far, what value does it produce and how does memory
//! change".

use alloc::string::String;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::context::EngineContext;
use crate::dse::{DseStore, DseTracker};
use crate::entities::{AId, AIdKind, CallContextId, GlobalId, InstId};
use crate::errors::Reason;
use crate::fx::FxHashMap;
use crate::heap::{BStore, BlockStatus, HStore};
use crate::ir::function::{InstKind, Operand};
use crate::ir::special::{ArgEffect, SpecialFunction};
use crate::ir::types::Type;
use crate::value::{Offset, PtrMember, ScalarBits, ScalarKind, Val};

/// Everything one executing frame needs besides the (shared, explicit)
/// [`EngineContext`]: the block-store map, the DSE map, the SSA value
/// environment, and the current frame's argument values and call
/// context.
pub struct ExecState {
    /// This frame's per-block memory state.
    pub bstore: BStore,
    /// This frame's DSE tracking state.
    pub dse: DseStore,
    /// Values produced so far by instructions in this frame.
    pub values: FxHashMap<InstId, Val>,
    /// The resolved `AId` for each module global, populated once by the
    /// loader before execution begins.
    pub globals: FxHashMap<GlobalId, AId>,
    /// This frame's argument values, in declaration order.
    pub args: SmallVec<[Val; 4]>,
    /// Whether the current block is known to run unconditionally
    /// (§4.4/§4.5).
    pub status: BlockStatus,
    /// The call/peel context allocations in this frame are scoped to
    /// (§3).
    pub context: CallContextId,
}

impl ExecState {
    /// A fresh frame for `context`, with no values produced yet.
    pub fn new(context: CallContextId, args: SmallVec<[Val; 4]>, status: BlockStatus) -> Self {
        ExecState {
            bstore: BStore::new(),
            dse: DseStore::new(),
            values: FxHashMap::default(),
            globals: FxHashMap::default(),
            args,
            status,
            context,
        }
    }

    /// The value produced so far by `id`, or [`Val::Bottom`] if it
    /// hasn't executed yet on this path.
    fn value_of(&self, id: InstId) -> Val {
        self.values.get(&id).cloned().unwrap_or(Val::Bottom)
    }
}

/// Resolve an [`Operand`] to its current abstract value.
pub fn eval_operand(op: &Operand, state: &ExecState, ctx: &EngineContext) -> Val {
    match op {
        Operand::Arg(index) => state
            .args
            .get(*index as usize)
            .cloned()
            .unwrap_or(Val::Overdefined),
        Operand::Value(id) => state.value_of(*id),
        Operand::Const(bits) => scalar_to_val(*bits),
        Operand::Global(gid) => match state.globals.get(gid) {
            Some(aid) => Val::ptr(*aid, 0),
            None => Val::Overdefined,
        },
        Operand::FuncAddr(fid) => {
            let bits = ScalarBits {
                ty: Type::Ptr { width: 8 },
                kind: ScalarKind::FuncAddr(*fid),
            };
            scalar_to_val(bits)
        }
        Operand::Null => Val::null(ctx.null_alloc()),
    }
}

fn scalar_to_val(bits: ScalarBits) -> Val {
    let mut v = SmallVec::new();
    v.push(bits);
    Val::Scalar(v)
}

/// The single precise `(base, offset)` this value names, if it is
/// exactly one pointer member with a known offset (§4.6's common case
/// for store/load/gep).
fn as_single_precise_ptr(v: &Val) -> Option<(AId, i64)> {
    match v {
        Val::Ptr(members) if members.len() == 1 => match members[0].offset {
            Offset::Precise(off) => Some((members[0].base, off)),
            Offset::Unknown => None,
        },
        _ => None,
    }
}

/// Every `(base, precise offset)` this value names, or `None` if it
/// isn't a pointer at all or at least one candidate has an `UNKNOWN`
/// offset (§4.6: "if any candidate has `UNKNOWN` offset, result is
/// overdefined" for loads; the same precision is required before a
/// store's multi-candidate read-modify-merge path can pin down which
/// bytes each candidate covers).
fn precise_ptr_members(v: &Val) -> Option<SmallVec<[(AId, i64); 4]>> {
    match v {
        Val::Ptr(members) if !members.is_empty() => {
            let mut out = SmallVec::new();
            for m in members {
                match m.offset {
                    Offset::Precise(off) => out.push((m.base, off)),
                    Offset::Unknown => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

/// Log the §7 `Pp2` diagnostic when an operation that requires exactly
/// one precise pointer candidate (free, realloc, va_start/va_copy) sees
/// more than one, before falling back to a full clobber.
fn log_if_multi_candidate(v: &Val) {
    if let Val::Ptr(members) = v {
        if members.len() > 1 {
            log::trace!("multiple precise pointer candidates where one was required: {}", Reason::Pp2);
        }
    }
}

/// Read `[off, off+len)` of `id`, trying `id`'s constant initializer
/// (if the loader resolved one) before falling to the heap store
/// (§4.6: "If rooted on a constant global with known offset,
/// constant-fold via ... byte-read. Otherwise `readRange`").
fn read_one(ctx: &EngineContext, state: &ExecState, id: AId, off: u32, len: u32) -> Val {
    if let Some(bytes) = ctx.global_initializer(id) {
        if let Some(v) = const_fold_global(bytes, off, len) {
            return v;
        }
    }
    state.bstore.read_range(ctx, id, off, len)
}

/// Byte-read `len` bytes starting at `off` out of a constant global's
/// initializer, little-endian (matching
/// [`crate::value::partial::PartialValue`]'s byte convention). `None`
/// (logging the matching §7 reason) if the range falls outside the
/// initializer or `len` isn't a representable integer width, leaving
/// the caller to fall through to the ordinary heap read.
fn const_fold_global(bytes: &[u8], off: u32, len: u32) -> Option<Val> {
    let start = off as usize;
    let end = start.checked_add(len as usize)?;
    if end > bytes.len() {
        log::trace!("constant global read out of range: {}", Reason::ConstOor);
        return None;
    }
    let ty = match Type::int_of_bytes(len) {
        Some(ty) => ty,
        None => {
            log::trace!("constant global byte-read failed: {}", Reason::ConstRdfgFailed);
            return None;
        }
    };
    let mut bits: u128 = 0;
    for (i, &b) in bytes[start..end].iter().enumerate().take(16) {
        bits |= (b as u128) << (i as u32 * 8);
    }
    Some(Val::scalar_int(ty, bits))
}

/// **Store**'s multi-candidate path (§4.6): "for each candidate base:
/// partial writes read-modify-merge with the existing value". Each
/// candidate gets a weak update — the write might land on any one of
/// them, so every candidate's existing value is merged with (not
/// replaced by) the value being written, and the old bytes are treated
/// as read (hence possibly needed) rather than as dead.
fn store_multi_candidate(
    ctx: &mut EngineContext,
    tracker: &mut DseTracker,
    state: &mut ExecState,
    inst_id: InstId,
    members: &[(AId, i64)],
    size: u32,
    value_val: &Val,
) {
    let null_alloc = ctx.null_alloc();
    for &(id, off) in members {
        if off < 0 {
            continue;
        }
        let off = off as u32;
        let existing = read_one(ctx, state, id, off, size);
        state.dse.on_read(id, off, size);
        let merged = existing.merge(value_val, null_alloc);
        let alloc_size = ctx.alloc_size(id);
        let will_cover_whole = off == 0 && alloc_size == Some(size);
        state
            .bstore
            .get_writable_store_for(ctx, id, will_cover_whole, state.status)
            .write_pb(off, size, merged, alloc_size);
        tracker.on_store(&mut state.dse, id, off, size, inst_id);
    }
}

/// **Load**'s multi-candidate path (§4.6): "readRange for each
/// candidate and merge".
fn load_multi_candidate(ctx: &EngineContext, state: &mut ExecState, members: &[(AId, i64)], size: u32) -> Val {
    let null_alloc = ctx.null_alloc();
    let mut acc = Val::Bottom;
    for &(id, off) in members {
        if off < 0 {
            return Val::Overdefined;
        }
        let off = off as u32;
        let v = read_one(ctx, state, id, off, size);
        state.dse.on_read(id, off, size);
        acc = acc.merge(&v, null_alloc);
    }
    acc
}

/// Clobber every allocation named by `v` (used for writes/calls whose
/// target can't be pinned down precisely, §4.6).
fn clobber_bases(bstore: &mut BStore, dse: &mut DseStore, v: &Val) {
    match v {
        Val::Ptr(members) => {
            log_if_multi_candidate(v);
            for m in members {
                bstore.install(m.base, alloc::rc::Rc::new(HStore::new_single(Val::Overdefined)));
                dse.on_free(m.base);
            }
        }
        _ => {
            bstore.clobber_all();
            dse.on_imprecise_read();
        }
    }
}

/// Execute one instruction, updating `state` in place and returning the
/// value it produces (non-value-producing instructions return
/// [`Val::Bottom`]).
pub fn step(
    ctx: &mut EngineContext,
    tracker: &mut DseTracker,
    state: &mut ExecState,
    inst_id: InstId,
    kind: &InstKind,
) -> Val {
    let result = match kind {
        InstKind::Alloca { ty, size } => {
            let id = ctx.new_alloc(
                AIdKind::Stack {
                    site: inst_id,
                    context: state.context,
                },
                *size,
                *ty,
            );
            state
                .bstore
                .install(id, alloc::rc::Rc::new(HStore::new_single(Val::Overdefined)));
            tracker.on_alloc(&mut state.dse, id, inst_id);
            Val::ptr(id, 0)
        }
        InstKind::Malloc { size } => {
            let size_val = eval_operand(size, state, ctx);
            let size_bytes = scalar_as_u32(&size_val);
            let id = ctx.new_alloc(
                AIdKind::Heap {
                    site: inst_id,
                    context: state.context,
                },
                size_bytes,
                Type::Opaque { bytes: size_bytes },
            );
            state
                .bstore
                .install(id, alloc::rc::Rc::new(HStore::new_single(Val::Overdefined)));
            tracker.on_alloc(&mut state.dse, id, inst_id);
            Val::ptr(id, 0)
        }
        InstKind::Realloc { ptr, new_size } => {
            let old = eval_operand(ptr, state, ctx);
            let new_size_val = eval_operand(new_size, state, ctx);
            let new_size_bytes = scalar_as_u32(&new_size_val);
            match as_single_precise_ptr(&old) {
                Some((old_id, 0)) => {
                    let old_size = ctx.alloc_size(old_id);
                    let fresh = ctx.new_alloc(
                        AIdKind::Heap {
                            site: inst_id,
                            context: state.context,
                        },
                        new_size_bytes,
                        Type::Opaque {
                            bytes: new_size_bytes,
                        },
                    );
                    let pieces = state
                        .bstore
                        .local(old_id)
                        .map(|s| s.read_range_multi(0, old_size.unwrap_or(0), old_size, None))
                        .unwrap_or_default();
                    let mut fresh_store = HStore::new_single(Val::Overdefined);
                    fresh_store.replace_range_with_pbs(&pieces, 0, new_size_bytes);
                    state.bstore.install(fresh, alloc::rc::Rc::new(fresh_store));
                    state.dse.on_free(old_id);
                    tracker.on_alloc(&mut state.dse, fresh, inst_id);
                    Val::ptr(fresh, 0)
                }
                _ => {
                    clobber_bases(&mut state.bstore, &mut state.dse, &old);
                    Val::Overdefined
                }
            }
        }
        InstKind::Free { ptr } => {
            let v = eval_operand(ptr, state, ctx);
            match as_single_precise_ptr(&v) {
                Some((id, 0)) => {
                    state.dse.on_free(id);
                }
                _ => clobber_bases(&mut state.bstore, &mut state.dse, &v),
            }
            Val::Bottom
        }
        InstKind::Store { ptr, value, ty } => {
            let ptr_val = eval_operand(ptr, state, ctx);
            let value_val = eval_operand(value, state, ctx);
            match ty.bytes() {
                Some(size) => match as_single_precise_ptr(&ptr_val) {
                    Some((id, off)) if off >= 0 => {
                        let off = off as u32;
                        let alloc_size = ctx.alloc_size(id);
                        let will_cover_whole = off == 0 && alloc_size == Some(size);
                        state
                            .bstore
                            .get_writable_store_for(ctx, id, will_cover_whole, state.status)
                            .write_pb(off, size, value_val, alloc_size);
                        tracker.on_store(&mut state.dse, id, off, size, inst_id);
                    }
                    _ => match precise_ptr_members(&ptr_val) {
                        Some(members) if members.len() > 1 => {
                            store_multi_candidate(ctx, tracker, state, inst_id, &members, size, &value_val)
                        }
                        _ => clobber_bases(&mut state.bstore, &mut state.dse, &ptr_val),
                    },
                },
                None => clobber_bases(&mut state.bstore, &mut state.dse, &ptr_val),
            }
            Val::Bottom
        }
        InstKind::Load { ptr, ty } => {
            let ptr_val = eval_operand(ptr, state, ctx);
            match ty.bytes() {
                Some(size) => match as_single_precise_ptr(&ptr_val) {
                    Some((id, off)) if off >= 0 => {
                        let off = off as u32;
                        let v = read_one(ctx, state, id, off, size);
                        state.dse.on_read(id, off, size);
                        v
                    }
                    _ => match precise_ptr_members(&ptr_val) {
                        Some(members) if members.len() > 1 => load_multi_candidate(ctx, state, &members, size),
                        _ => {
                            state.dse.on_imprecise_read();
                            Val::Overdefined
                        }
                    },
                },
                None => {
                    state.dse.on_imprecise_read();
                    Val::Overdefined
                }
            }
        }
        InstKind::Memcpy { dst, src, len } | InstKind::Memmove { dst, src, len } => {
            let dst_val = eval_operand(dst, state, ctx);
            let src_val = eval_operand(src, state, ctx);
            let len_val = eval_operand(len, state, ctx);
            match (
                as_single_precise_ptr(&dst_val),
                as_single_precise_ptr(&src_val),
                scalar_as_u32(&len_val),
            ) {
                (Some((dst_id, doff)), Some((src_id, soff)), Some(n))
                    if doff >= 0 && soff >= 0 =>
                {
                    let (doff, soff) = (doff as u32, soff as u32);
                    let src_size = ctx.alloc_size(src_id);
                    let pieces = state
                        .bstore
                        .local(src_id)
                        .map(|s| s.read_range_multi(soff, n, src_size, None))
                        .unwrap_or_default();
                    let pieces: Vec<_> = pieces
                        .into_iter()
                        .map(|(lo, hi, v)| (lo - soff, hi - soff, v))
                        .collect();
                    let dst_alloc_size = ctx.alloc_size(dst_id);
                    let will_cover_whole = doff == 0 && dst_alloc_size == Some(n);
                    state
                        .bstore
                        .get_writable_store_for(ctx, dst_id, will_cover_whole, state.status)
                        .replace_range_with_pbs(&pieces, doff, dst_alloc_size);
                    tracker.on_store(&mut state.dse, dst_id, doff, n, inst_id);
                    state.dse.on_read(src_id, soff, n);
                }
                _ => {
                    clobber_bases(&mut state.bstore, &mut state.dse, &dst_val);
                    state.dse.on_imprecise_read();
                }
            }
            Val::Bottom
        }
        InstKind::Memset { dst, byte, len } => {
            let dst_val = eval_operand(dst, state, ctx);
            let byte_val = eval_operand(byte, state, ctx);
            let len_val = eval_operand(len, state, ctx);
            match (
                as_single_precise_ptr(&dst_val),
                scalar_as_u32(&byte_val),
                scalar_as_u32(&len_val),
            ) {
                (Some((id, off)), Some(b), Some(n)) if off >= 0 => {
                    let off = off as u32;
                    let alloc_size = ctx.alloc_size(id);
                    let will_cover_whole = off == 0 && alloc_size == Some(n);
                    state
                        .bstore
                        .get_writable_store_for(ctx, id, will_cover_whole, state.status)
                        .write_pb(off, n, Val::splat(b as u8, n), alloc_size);
                    tracker.on_store(&mut state.dse, id, off, n, inst_id);
                }
                _ => clobber_bases(&mut state.bstore, &mut state.dse, &dst_val),
            }
            Val::Bottom
        }
        InstKind::Call { callee, args } => exec_call(ctx, tracker, state, inst_id, callee, args),
        InstKind::Phi { incoming } => {
            let mut acc = Val::Bottom;
            for (_, operand) in incoming {
                let v = eval_operand(operand, state, ctx);
                acc = acc.merge(&v, ctx.null_alloc());
            }
            acc
        }
        InstKind::Cast { value, to } => {
            let v = eval_operand(value, state, ctx);
            match to.bytes() {
                Some(size) => match v.coerce(*to, size, ctx.null_alloc()) {
                    Ok(result) => result,
                    Err(reason) => {
                        log::trace!("cast collapsed to overdefined: {reason}");
                        Val::Overdefined
                    }
                },
                None => Val::Overdefined,
            }
        }
        InstKind::Gep { base, offset } => {
            let base_val = eval_operand(base, state, ctx);
            let offset_val = eval_operand(offset, state, ctx);
            gep(&base_val, &offset_val)
        }
        InstKind::IConst { value } => scalar_to_val(*value),
        InstKind::VaStart { va_list } => {
            let v = eval_operand(va_list, state, ctx);
            if let Some((id, 0)) = as_single_precise_ptr(&v) {
                let cookie = Val::VaArg(SmallVec::from_slice(&[crate::value::VaArgMember {
                    base: id,
                    kind: crate::value::VaArgKind::BasePtr,
                }]));
                let alloc_size = ctx.alloc_size(id);
                let size = alloc_size.unwrap_or(8);
                let will_cover_whole = alloc_size == Some(size);
                state
                    .bstore
                    .get_writable_store_for(ctx, id, will_cover_whole, state.status)
                    .write_pb(0, size, cookie, alloc_size);
                tracker.on_store(&mut state.dse, id, 0, size, inst_id);
            } else {
                clobber_bases(&mut state.bstore, &mut state.dse, &v);
            }
            Val::Bottom
        }
        InstKind::VaCopy { dst, src } => {
            let dst_val = eval_operand(dst, state, ctx);
            let src_val = eval_operand(src, state, ctx);
            match (as_single_precise_ptr(&dst_val), as_single_precise_ptr(&src_val)) {
                (Some((dst_id, 0)), Some((src_id, 0))) => {
                    let size = ctx.alloc_size(src_id).unwrap_or(8);
                    let pieces = state
                        .bstore
                        .local(src_id)
                        .map(|s| s.read_range_multi(0, size, Some(size), None))
                        .unwrap_or_default();
                    let alloc_size = ctx.alloc_size(dst_id);
                    state
                        .bstore
                        .get_writable_store_for(ctx, dst_id, alloc_size == Some(size), state.status)
                        .replace_range_with_pbs(&pieces, 0, alloc_size);
                    tracker.on_store(&mut state.dse, dst_id, 0, size, inst_id);
                }
                _ => clobber_bases(&mut state.bstore, &mut state.dse, &dst_val),
            }
            Val::Bottom
        }
        InstKind::Syscall { name, args } => exec_syscall(ctx, state, name, args),
    };
    state.values.insert(inst_id, result.clone());
    result
}

fn scalar_as_u32(v: &Val) -> Option<u32> {
    match v {
        Val::Scalar(members) if members.len() == 1 => match members[0].kind {
            ScalarKind::Int(bits) => u32::try_from(bits).ok(),
            ScalarKind::FuncAddr(_) => None,
        },
        _ => None,
    }
}

fn gep(base: &Val, offset: &Val) -> Val {
    let Val::Ptr(members) = base else {
        return if base.is_overdefined() {
            Val::Overdefined
        } else {
            base.clone()
        };
    };
    let displacement = match offset {
        Val::Scalar(members) if members.len() == 1 => match members[0].kind {
            ScalarKind::Int(bits) => Some(bits as i64),
            ScalarKind::FuncAddr(_) => None,
        },
        _ => None,
    };
    let mut out: SmallVec<[PtrMember; 4]> = SmallVec::new();
    for m in members {
        let new_offset = match (m.offset, displacement) {
            (Offset::Precise(base_off), Some(d)) => Offset::Precise(base_off + d),
            _ => Offset::Unknown,
        };
        let candidate = PtrMember {
            base: m.base,
            offset: new_offset,
        };
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    Val::Ptr(out)
}

/// **Call** transfer (§4.6, §6): look up the callee's declared model
/// (if the operand resolves to a known function address) and apply its
/// effects. Actual inlining is the driver's job — by the time `step`
/// sees a `Call`, the driver has already decided not to inline it (or
/// this instruction wouldn't be the one executing).
fn exec_call(
    ctx: &mut EngineContext,
    tracker: &mut DseTracker,
    state: &mut ExecState,
    inst_id: InstId,
    callee: &Operand,
    args: &SmallVec<[Operand; 4]>,
) -> Val {
    let callee_val = eval_operand(callee, state, ctx);
    let arg_vals: SmallVec<[Val; 4]> = args.iter().map(|a| eval_operand(a, state, ctx)).collect();

    let func_name = match &callee_val {
        Val::Scalar(members) if members.len() == 1 => match members[0].kind {
            ScalarKind::FuncAddr(fid) => Some(fid),
            _ => None,
        },
        _ => None,
    };

    let Some(fid) = func_name else {
        for v in &arg_vals {
            clobber_bases(&mut state.bstore, &mut state.dse, v);
        }
        return Val::Overdefined;
    };

    match ctx.func_model(fid).cloned() {
        Some(SpecialFunction::Malloc) => {
            let size = arg_vals.first().and_then(scalar_as_u32);
            let id = ctx.new_alloc(
                AIdKind::Heap {
                    site: inst_id,
                    context: state.context,
                },
                size,
                Type::Opaque { bytes: size },
            );
            state
                .bstore
                .install(id, alloc::rc::Rc::new(HStore::new_single(Val::Overdefined)));
            tracker.on_alloc(&mut state.dse, id, inst_id);
            Val::ptr(id, 0)
        }
        Some(SpecialFunction::Free) => {
            if let Some(v) = arg_vals.first() {
                if let Some((id, 0)) = as_single_precise_ptr(v) {
                    state.dse.on_free(id);
                } else {
                    clobber_bases(&mut state.bstore, &mut state.dse, v);
                }
            }
            Val::Bottom
        }
        Some(SpecialFunction::Realloc) | Some(SpecialFunction::VaStart) | Some(SpecialFunction::VaCopy) => {
            for v in &arg_vals {
                clobber_bases(&mut state.bstore, &mut state.dse, v);
            }
            Val::Overdefined
        }
        Some(SpecialFunction::Library(model)) => {
            apply_library_model(ctx, state, &arg_vals, &model.effects);
            Val::Overdefined
        }
        Some(SpecialFunction::Opaque) | Some(SpecialFunction::Blacklisted) | None => {
            for v in &arg_vals {
                clobber_bases(&mut state.bstore, &mut state.dse, v);
            }
            Val::Overdefined
        }
    }
}

fn exec_syscall(ctx: &mut EngineContext, state: &mut ExecState, name: &String, args: &SmallVec<[Operand; 4]>) -> Val {
    let arg_vals: SmallVec<[Val; 4]> = args.iter().map(|a| eval_operand(a, state, ctx)).collect();
    match ctx.specials().lookup(name).cloned() {
        Some(SpecialFunction::Library(model)) => {
            apply_library_model(ctx, state, &arg_vals, &model.effects);
        }
        _ => {
            for v in &arg_vals {
                clobber_bases(&mut state.bstore, &mut state.dse, v);
            }
        }
    }
    Val::Overdefined
}

fn apply_library_model(ctx: &mut EngineContext, state: &mut ExecState, arg_vals: &[Val], effects: &[ArgEffect]) {
    for effect in effects {
        match *effect {
            ArgEffect::ReadArg { index, size } => {
                if let Some(v) = arg_vals.get(index as usize) {
                    match (as_single_precise_ptr(v), size) {
                        (Some((id, off)), Some(size)) if off >= 0 => {
                            state.dse.on_annotated_read(id, off as u32, size);
                        }
                        _ => state.dse.on_imprecise_read(),
                    }
                }
            }
            ArgEffect::WriteArg { index, size } => {
                if let Some(v) = arg_vals.get(index as usize) {
                    match (as_single_precise_ptr(v), size) {
                        (Some((id, off)), Some(size)) if off >= 0 => {
                            state
                                .bstore
                                .get_writable_store_for(ctx, id, false, state.status)
                                .write_pb(off as u32, size, Val::Overdefined, None);
                            state.dse.on_annotated_write(id, off as u32, size);
                        }
                        _ => clobber_bases(&mut state.bstore, &mut state.dse, v),
                    }
                }
            }
            ArgEffect::Opaque => {
                if let Some(v) = arg_vals.first() {
                    clobber_bases(&mut state.bstore, &mut state.dse, v);
                }
            }
        }
    }
}
