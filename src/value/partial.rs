//! PV — Partial Values: a scratch accumulator bridging a load that
//! straddles writes of mixed granularity (§4.2). Nothing outside a
//! single `readRange` call ever sees a `PartialValue`; it collapses back
//! to a plain [`Val`] (or a [`Reason`]) via [`PartialValue::to_value`].

use alloc::vec::Vec;

use crate::errors::Reason;
use crate::value::{ScalarKind, Splat, Val};

/// An explicit byte-array scratch buffer: one entry per byte of the
/// eventual load, each either contributed already or still missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ByteArray {
    bytes: Vec<u8>,
    valid: Vec<bool>,
    load_finished: bool,
}

impl ByteArray {
    fn new(load_size: u32) -> Self {
        ByteArray {
            bytes: alloc::vec![0u8; load_size as usize],
            valid: alloc::vec![false; load_size as usize],
            load_finished: load_size == 0,
        }
    }

    /// Contribute `data` at `[first_def, first_not_def)`, honouring
    /// first-writer-wins on bytes already valid, then recompute
    /// `load_finished`.
    fn contribute(&mut self, data: &[u8], first_def: u32, first_not_def: u32) {
        for (i, &byte) in data.iter().enumerate() {
            let idx = first_def as usize + i;
            if idx >= first_not_def as usize || idx >= self.valid.len() {
                break;
            }
            if !self.valid[idx] {
                self.bytes[idx] = byte;
                self.valid[idx] = true;
            }
        }
        self.load_finished = self.valid.iter().all(|&v| v);
    }
}

/// The accumulator itself (§4.2).
#[derive(Clone, Debug, PartialEq)]
pub enum PartialValue {
    /// No contribution has landed yet.
    Empty,
    /// A single contribution covered the entire load window in one
    /// shot; no byte-array accounting was ever needed.
    Total(Val),
    /// A contribution that covers the load window only when sliced
    /// starting at `offset` bytes into `value` — the "constant aggregate
    /// plus read-offset" case (§4.2); resolved lazily in
    /// [`PartialValue::to_value`] via [`Val::slice`].
    Aggregate {
        /// The covering constant.
        value: Val,
        /// Where in `value` the load window begins.
        offset: u32,
    },
    /// Byte-by-byte accumulation from more than one contribution.
    Bytes(ByteArray),
}

impl Default for PartialValue {
    fn default() -> Self {
        PartialValue::Empty
    }
}

impl PartialValue {
    /// An empty accumulator for a load of `load_size` bytes.
    pub fn new() -> Self {
        PartialValue::Empty
    }

    /// Contribute `other` to bytes `[first_def, first_not_def)` of a
    /// `load_size`-byte load (§4.2). `other` itself is assumed to be
    /// exactly `first_not_def - first_def` bytes wide.
    ///
    /// Fails with [`Reason::NonConstBOps`] if `other` needs to be
    /// bytified (because this or an earlier contribution already forced
    /// byte-array accounting) but isn't a single concrete constant, or
    /// with [`Reason::Rdfg`] if extracting the relevant bytes out of an
    /// already-accumulated aggregate constant fails.
    pub fn combine(
        &mut self,
        other: &Val,
        first_def: u32,
        first_not_def: u32,
        load_size: u32,
    ) -> Result<(), Reason> {
        let covers_whole = first_def == 0 && first_not_def == load_size;
        match self {
            PartialValue::Empty if covers_whole => {
                *self = PartialValue::Total(other.clone());
                Ok(())
            }
            PartialValue::Empty => {
                let mut arr = ByteArray::new(load_size);
                let bytes = bytify(other, first_not_def - first_def)?;
                arr.contribute(&bytes, first_def, first_not_def);
                *self = PartialValue::Bytes(arr);
                Ok(())
            }
            PartialValue::Total(existing) => {
                let existing = existing.clone();
                let mut arr = ByteArray::new(load_size);
                let existing_bytes = bytify(&existing, load_size)?;
                arr.contribute(&existing_bytes, 0, load_size);
                let new_bytes = bytify(other, first_not_def - first_def)?;
                arr.contribute(&new_bytes, first_def, first_not_def);
                *self = PartialValue::Bytes(arr);
                Ok(())
            }
            PartialValue::Aggregate { value, offset } => {
                let covering = value.slice(*offset, load_size);
                let mut arr = ByteArray::new(load_size);
                let existing_bytes = bytify(&covering, load_size).map_err(|_| Reason::Rdfg)?;
                arr.contribute(&existing_bytes, 0, load_size);
                let new_bytes = bytify(other, first_not_def - first_def)?;
                arr.contribute(&new_bytes, first_def, first_not_def);
                *self = PartialValue::Bytes(arr);
                Ok(())
            }
            PartialValue::Bytes(arr) => {
                let new_bytes = bytify(other, first_not_def - first_def)?;
                arr.contribute(&new_bytes, first_def, first_not_def);
                Ok(())
            }
        }
    }

    /// Collapse the accumulator to a concrete [`Val`] of `size` bytes.
    ///
    /// `Total`/`Aggregate` return the covering constant directly when a
    /// structural slice succeeds; everything else (and any slice
    /// failure) falls through to reinterpreting the byte-array
    /// representation, failing with [`Reason::PvToPb`] if that path has
    /// no bytes to fall back on either.
    pub fn to_value(&self, size: u32) -> Result<Val, Reason> {
        match self {
            PartialValue::Empty => Err(Reason::PvToPb),
            PartialValue::Total(v) => Ok(v.clone()),
            PartialValue::Aggregate { value, offset } => {
                let sliced = value.slice(*offset, size);
                if sliced.is_overdefined() {
                    Err(Reason::PvToPb)
                } else {
                    Ok(sliced)
                }
            }
            PartialValue::Bytes(arr) => {
                if !arr.load_finished {
                    return Ok(Val::Overdefined);
                }
                let ty = crate::ir::types::Type::int_of_bytes(size).ok_or(Reason::PvToPb)?;
                let mut bits: u128 = 0;
                for (i, &b) in arr.bytes.iter().enumerate().take(16) {
                    bits |= (b as u128) << (i as u32 * 8);
                }
                Ok(Val::scalar_int(ty, bits))
            }
        }
    }
}

/// Reduce `v` to its raw little-endian byte representation, if `v` is a
/// single concrete constant (a lone integer scalar or a lone splat).
/// Anything else — an overdefined top, a bounded set with more than one
/// member, a pointer, a file descriptor, a vararg cookie — has no fixed
/// byte pattern to contribute, so bytifying it fails.
fn bytify(v: &Val, size: u32) -> Result<Vec<u8>, Reason> {
    match v {
        Val::Scalar(members) if members.len() == 1 => match members[0].kind {
            ScalarKind::Int(bits) => {
                let le = bits.to_le_bytes();
                Ok(le[..(size as usize).min(le.len())].to_vec())
            }
            ScalarKind::FuncAddr(_) => Err(Reason::NonConstBOps),
        },
        Val::Splat(members) if members.len() == 1 => {
            let s: &Splat = &members[0];
            Ok(alloc::vec![s.byte; size as usize])
        }
        _ => Err(Reason::NonConstBOps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{IntWidth, Type};

    #[test]
    fn single_full_contribution_is_total() {
        let mut pv = PartialValue::new();
        let v = Val::scalar_int(Type::Int(IntWidth::I32), 0x2A);
        pv.combine(&v, 0, 4, 4).unwrap();
        assert_eq!(pv, PartialValue::Total(v.clone()));
        assert_eq!(pv.to_value(4).unwrap(), v);
    }

    #[test]
    fn two_half_contributions_round_trip() {
        let mut pv = PartialValue::new();
        let lo = Val::scalar_int(Type::Int(IntWidth::I16), 0x1122);
        let hi = Val::scalar_int(Type::Int(IntWidth::I16), 0x3344);
        pv.combine(&lo, 0, 2, 4).unwrap();
        pv.combine(&hi, 2, 4, 4).unwrap();
        let result = pv.to_value(4).unwrap();
        assert_eq!(result, Val::scalar_int(Type::Int(IntWidth::I32), 0x3344_1122));
    }

    #[test]
    fn first_writer_wins_on_overlap() {
        let mut pv = PartialValue::new();
        let first = Val::scalar_int(Type::Int(IntWidth::I8), 0xAA);
        let second = Val::scalar_int(Type::Int(IntWidth::I8), 0xBB);
        pv.combine(&first, 0, 1, 2).unwrap();
        pv.combine(&second, 0, 1, 2).unwrap();
        pv.combine(&Val::scalar_int(Type::Int(IntWidth::I8), 0xCC), 1, 2, 2)
            .unwrap();
        let result = pv.to_value(2).unwrap();
        assert_eq!(result, Val::scalar_int(Type::Int(IntWidth::I16), 0xCCAA));
    }

    #[test]
    fn bytifying_overdefined_fails() {
        let mut pv = PartialValue::new();
        let err = pv.combine(&Val::Overdefined, 0, 2, 4).unwrap_err();
        assert_eq!(err, Reason::NonConstBOps);
    }

    #[test]
    fn incomplete_bytes_yield_overdefined() {
        let mut pv = PartialValue::new();
        pv.combine(&Val::scalar_int(Type::Int(IntWidth::I8), 1), 0, 1, 4)
            .unwrap();
        assert_eq!(pv.to_value(4).unwrap(), Val::Overdefined);
    }
}
