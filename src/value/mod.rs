//! AV — Abstract Values.
//!
//! `Val` is the SCCP-style lattice element every SSA value in the
//! program carries: a bounded set of concrete possibilities (`k` ≤
//! [`K_MAX`]) drawn from one of a handful of disjoint value classes,
//! generalised with pointer base+offset, file-descriptor tokens, and
//! vararg cookies (§3). The shape of `Val` follows
//! `cranelift_codegen::data_value::DataValue` (a small tagged union with
//! manual `Display`); the merge/insert generalisation rules are ported
//! from LLPE's `PointerBase::insert`/`merge`
//! (`examples/original_source/llvm/include/llvm/Analysis/ShadowInlines.h`).

pub mod partial;

use cranelift_entity::EntityRef;
use smallvec::SmallVec;

use crate::entities::{AId, FdId};
use crate::errors::Reason;
use crate::ir::types::Type;

/// Maximum number of distinct members a bounded value set may hold
/// before it collapses (via generalisation, then overdefined).
pub const K_MAX: usize = 16;

/// The byte width every symbolic pointer base+offset is treated as
/// occupying, regardless of the target's declared `Type::Ptr { width }`
/// (§4.1's pointer<->int coercion is only sound at this width; a
/// base+offset pair can't be truncated or zero-extended and remain
/// meaningful).
const NATIVE_PTR_WIDTH: u32 = 8;

/// A symbolic pointer offset: either a precise byte displacement from
/// the allocation's base, or `UNKNOWN` meaning "any offset into that
/// base" (§3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Offset {
    /// An exact, statically-known byte offset.
    Precise(i64),
    /// Any offset into the base allocation.
    Unknown,
}

impl Offset {
    /// True if this offset is [`Offset::Unknown`].
    pub const fn is_unknown(self) -> bool {
        matches!(self, Offset::Unknown)
    }
}

/// One member of a [`Val::Ptr`] set: a base allocation plus offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PtrMember {
    /// The allocation this pointer is based on.
    pub base: AId,
    /// The byte offset from the base, or unknown.
    pub offset: Offset,
}

/// What kind of vararg cookie a [`Val::VaArg`] member represents (§3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VaArgKind {
    /// The base pointer of the va_list's argument save area.
    BasePtr,
    /// The `index`-th non-floating-point variadic argument.
    NonFpArg(u32),
    /// The `index`-th floating-point variadic argument.
    FpArg(u32),
}

/// One member of a [`Val::VaArg`] set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VaArgMember {
    /// The va_list allocation this cookie is drawn from.
    pub base: AId,
    /// Which cookie.
    pub kind: VaArgKind,
}

/// The concrete payload of one [`Val::Scalar`] member: either an
/// ordinary bit pattern, or the symbolic address of a function (kept
/// distinct from an arbitrary integer so that the null/function
/// reconciliation rule in [`Val::merge`] can recognise it).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Raw bits, valid for the low `ty.bytes() * 8` bits.
    Int(u128),
    /// The address of a function, not yet resolved to a concrete
    /// number (there is no target layout at this stage of the
    /// pipeline).
    FuncAddr(crate::entities::FuncId),
}

/// One member of a [`Val::Scalar`] set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScalarBits {
    /// The type this constant was produced at.
    pub ty: Type,
    /// The constant's payload.
    pub kind: ScalarKind,
}

impl ScalarBits {
    /// A plain integer scalar.
    pub fn int(ty: Type, bits: u128) -> Self {
        let masked = mask_to_type(bits, ty);
        ScalarBits {
            ty,
            kind: ScalarKind::Int(masked),
        }
    }

    /// True if this scalar is exactly the all-zero bit pattern (the
    /// only integer constant allowed to become a null pointer, per
    /// [`Val::coerce`]).
    fn is_zero(&self) -> bool {
        matches!(self.kind, ScalarKind::Int(0))
    }

    /// Extract `len` bytes starting at byte offset `off`, if that range
    /// lies within this scalar's own byte size. Returns `None` (forcing
    /// the caller to fall to overdefined, per §4.1's `slice`) when the
    /// range doesn't fit or this member isn't bit-sliceable (e.g. a
    /// function address).
    fn slice_bits(&self, off: u32, len: u32) -> Option<ScalarBits> {
        let ScalarKind::Int(bits) = self.kind else {
            return if off == 0 && Some(len) == self.ty.bytes() {
                Some(*self)
            } else {
                None
            };
        };
        let size = self.ty.bytes()?;
        if off.checked_add(len)? > size {
            return None;
        }
        let ty = Type::int_of_bytes(len)?;
        let shifted = if off == 0 {
            bits
        } else {
            bits >> (off as u32 * 8)
        };
        Some(ScalarBits::int(ty, shifted))
    }
}

fn mask_to_type(bits: u128, ty: Type) -> u128 {
    match ty.bytes() {
        Some(n) if n < 16 => bits & ((1u128 << (n * 8)) - 1),
        _ => bits,
    }
}

/// A run of `len` identical bytes, the result class produced by a
/// memset-like operation (§3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Splat {
    /// The repeated byte.
    pub byte: u8,
    /// How many bytes it's repeated for.
    pub len: u32,
}

/// The symbolic abstract value lattice element (§3).
///
/// `Bottom` is the lattice's bottom (no information yet, identity
/// element of [`Val::merge`]); `Overdefined` is the top (no refinement
/// possible). Each other variant carries a bounded, deduplicated set of
/// same-class members.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    /// No information yet.
    Bottom,
    /// No further refinement is possible.
    Overdefined,
    /// A bounded set of constant bit patterns (or function addresses).
    Scalar(SmallVec<[ScalarBits; 4]>),
    /// A bounded set of byte-splat results.
    Splat(SmallVec<[Splat; 2]>),
    /// A bounded set of base+offset pointers.
    Ptr(SmallVec<[PtrMember; 4]>),
    /// A bounded set of file-descriptor tokens.
    Fd(SmallVec<[FdId; 4]>),
    /// A bounded set of vararg cookies.
    VaArg(SmallVec<[VaArgMember; 2]>),
}

impl Val {
    /// A single precise pointer value.
    pub fn ptr(base: AId, offset: i64) -> Val {
        let mut v = SmallVec::new();
        v.push(PtrMember {
            base,
            offset: Offset::Precise(offset),
        });
        Val::Ptr(v)
    }

    /// The null pointer, `Ptr(null_alloc, 0)` (§3).
    pub fn null(null_alloc: AId) -> Val {
        Val::ptr(null_alloc, 0)
    }

    /// A single constant integer scalar.
    pub fn scalar_int(ty: Type, bits: u128) -> Val {
        let mut v = SmallVec::new();
        v.push(ScalarBits::int(ty, bits));
        Val::Scalar(v)
    }

    /// A single byte-splat value.
    pub fn splat(byte: u8, len: u32) -> Val {
        let mut v = SmallVec::new();
        v.push(Splat { byte, len });
        Val::Splat(v)
    }

    /// True if this value carries no information (lattice bottom).
    pub fn is_bottom(&self) -> bool {
        matches!(self, Val::Bottom)
    }

    /// True if this value is the lattice top.
    pub fn is_overdefined(&self) -> bool {
        matches!(self, Val::Overdefined)
    }

    fn only_contains_functions(&self) -> bool {
        matches!(self, Val::Scalar(members)
            if !members.is_empty()
                && members.iter().all(|m| matches!(m.kind, ScalarKind::FuncAddr(_))))
    }

    fn only_contains_null(&self, null_alloc: AId) -> bool {
        matches!(self, Val::Ptr(members)
            if members.len() == 1
                && members[0].base == null_alloc
                && members[0].offset == Offset::Precise(0))
    }

    /// Merge two abstract values, per §3. Commutative, associative;
    /// `Bottom` is the identity and `Overdefined` is absorbing, except
    /// for the one generalisation named in the spec: a `Scalar` set
    /// containing only function addresses may absorb a lone null
    /// pointer by reclassifying the null as a scalar (and vice versa,
    /// ported from LLPE's `PointerBase::merge`, which tries the
    /// reclassification in both argument orders).
    pub fn merge(&self, other: &Val, null_alloc: AId) -> Val {
        if self.is_overdefined() || other.is_overdefined() {
            return Val::Overdefined;
        }
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        if core::mem::discriminant(self) != core::mem::discriminant(other) {
            if self.only_contains_functions() && other.only_contains_null(null_alloc) {
                return self.clone();
            }
            if self.only_contains_null(null_alloc) && other.only_contains_functions() {
                return other.clone();
            }
            return Val::Overdefined;
        }
        match (self, other) {
            (Val::Scalar(a), Val::Scalar(b)) => merge_scalar(a, b),
            (Val::Splat(a), Val::Splat(b)) => {
                let mut out = a.clone();
                for &m in b {
                    if !out.contains(&m) {
                        out.push(m);
                    }
                }
                if out.len() > K_MAX {
                    Val::Overdefined
                } else {
                    Val::Splat(out)
                }
            }
            (Val::Ptr(a), Val::Ptr(b)) => merge_ptr(a, b),
            (Val::Fd(a), Val::Fd(b)) => {
                let mut out = a.clone();
                for &m in b {
                    if !out.contains(&m) {
                        out.push(m);
                    }
                }
                if out.len() > K_MAX {
                    Val::Overdefined
                } else {
                    Val::Fd(out)
                }
            }
            (Val::VaArg(a), Val::VaArg(b)) => {
                let mut out = a.clone();
                for &m in b {
                    if !out.contains(&m) {
                        out.push(m);
                    }
                }
                if out.len() > K_MAX {
                    Val::Overdefined
                } else {
                    Val::VaArg(out)
                }
            }
            _ => Val::Overdefined,
        }
    }

    /// Bit-reinterpret a `Scalar` to `target`, of byte size `size`.
    /// Permits implicit pointer↔pointer and (equal-width) pointer↔int
    /// casts; forbids constructing a pointer from non-zero raw bytes
    /// (§4.1). `null_alloc` names the reserved allocation a zero integer
    /// becomes a pointer into.
    pub fn coerce(&self, target: Type, size: u32, null_alloc: AId) -> Result<Val, Reason> {
        match self {
            Val::Bottom => Ok(Val::Bottom),
            Val::Overdefined => Ok(Val::Overdefined),
            Val::Ptr(members) => {
                // Pointer<->pointer and pointer<->int of equal width: the
                // symbolic base+offset carries over unchanged, provided the
                // target is exactly the native pointer width. A base+offset
                // pair can't be truncated into fewer bytes or zero-extended
                // into more and remain meaningful.
                if (target.is_pointer() || target.is_integer()) && size == NATIVE_PTR_WIDTH {
                    return Ok(Val::Ptr(members.clone()));
                }
                Err(Reason::NonScalarCoerce)
            }
            Val::Scalar(members) => {
                if target.is_pointer() {
                    let mut out = SmallVec::new();
                    for m in members {
                        if !m.is_zero() {
                            return Err(Reason::CastNonZeroToPtr);
                        }
                        out.push(PtrMember {
                            base: null_alloc,
                            offset: Offset::Precise(0),
                        });
                    }
                    return Ok(Val::Ptr(out));
                }
                let mut out: SmallVec<[ScalarBits; 4]> = SmallVec::new();
                for m in members {
                    let bits = match m.kind {
                        ScalarKind::Int(b) => b,
                        ScalarKind::FuncAddr(_) => return Err(Reason::NonScalarCoerce),
                    };
                    let new_member = ScalarBits::int(target, bits);
                    if !out.contains(&new_member) {
                        out.push(new_member);
                    }
                }
                Ok(Val::Scalar(out))
            }
            Val::Splat(_) | Val::Fd(_) | Val::VaArg(_) => Err(Reason::NonScalarCoerce),
        }
    }

    /// Extract the sub-range `[off, off+len)`. Structural on `Scalar`
    /// (bit slicing); identity on `Splat` (still a splat, just shorter);
    /// overdefined otherwise (§4.1 — this crate models no aggregate
    /// constants, so the "covered by an aggregate constant" escape
    /// hatch never applies).
    pub fn slice(&self, off: u32, len: u32) -> Val {
        match self {
            Val::Bottom => Val::Bottom,
            Val::Overdefined => Val::Overdefined,
            Val::Scalar(members) => {
                let mut out: SmallVec<[ScalarBits; 4]> = SmallVec::new();
                for m in members {
                    match m.slice_bits(off, len) {
                        Some(b) => {
                            if !out.contains(&b) {
                                out.push(b);
                            }
                        }
                        None => return Val::Overdefined,
                    }
                }
                if out.is_empty() {
                    Val::Overdefined
                } else {
                    Val::Scalar(out)
                }
            }
            Val::Splat(members) => {
                let mut out: SmallVec<[Splat; 2]> = SmallVec::new();
                for s in members {
                    let new = Splat { byte: s.byte, len };
                    if !out.contains(&new) {
                        out.push(new);
                    }
                }
                Val::Splat(out)
            }
            _ => Val::Overdefined,
        }
    }
}

fn merge_scalar(a: &SmallVec<[ScalarBits; 4]>, b: &SmallVec<[ScalarBits; 4]>) -> Val {
    let mut out: SmallVec<[ScalarBits; 4]> = a.clone();
    for &m in b {
        if !out.contains(&m) {
            out.push(m);
        }
    }
    if out.len() > K_MAX {
        return Val::Overdefined;
    }
    Val::Scalar(out)
}

/// Pointer-set insert/merge with the §3 generalisation rules:
/// a vague (`Unknown`-offset) member for a base absorbs all precise
/// members of that base and vice versa; inserting a vague member drops
/// any existing precise members of the same base; if the set still
/// overflows `K_MAX`, bases with ≥2 precise members collapse to one
/// vague member for that base (two-stage collapse, ported from LLPE's
/// `PointerBase::insert`), and only if *that* doesn't bring the set
/// back under `K_MAX` does the whole value go overdefined.
fn merge_ptr(a: &SmallVec<[PtrMember; 4]>, b: &SmallVec<[PtrMember; 4]>) -> Val {
    let mut out: SmallVec<[PtrMember; 4]> = a.clone();
    for &m in b {
        insert_ptr_member(&mut out, m);
    }
    if out.len() > K_MAX {
        collapse_oversize_bases(&mut out);
    }
    if out.len() > K_MAX {
        return Val::Overdefined;
    }
    Val::Ptr(out)
}

fn insert_ptr_member(set: &mut SmallVec<[PtrMember; 4]>, m: PtrMember) {
    if set.contains(&m) {
        return;
    }
    let vague = PtrMember {
        base: m.base,
        offset: Offset::Unknown,
    };
    if set.contains(&vague) {
        return;
    }
    if m.offset.is_unknown() {
        set.retain(|p| p.base != m.base);
    }
    set.push(m);
}

fn collapse_oversize_bases(set: &mut SmallVec<[PtrMember; 4]>) {
    let mut counts: SmallVec<[(AId, u32); 8]> = SmallVec::new();
    for m in set.iter() {
        match counts.iter_mut().find(|(base, _)| *base == m.base) {
            Some((_, n)) => *n += 1,
            None => counts.push((m.base, 1)),
        }
    }
    for (base, count) in counts {
        if count >= 2 {
            set.retain(|p| p.base != base);
            set.push(PtrMember {
                base,
                offset: Offset::Unknown,
            });
        }
    }
}
