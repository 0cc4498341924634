//! Diagnostic reason tokens.
//!
//! Per §7, failures to refine a value inside the abstract-value and
//! partial-value machinery are not fatal: every such failure collapses
//! the result to *overdefined* and attaches one of these stable, short
//! tokens for diagnostics and tests. Fatal conditions (contract
//! violations such as writing through an uninitialised pointer) are
//! modelled separately as `debug_assert!`/panics at the call site, not
//! through this type.
//!
//! Mirrors `cranelift_codegen::data_value::DataValueCastFailure` in
//! implementing `Display` (and, under `std`, `std::error::Error`) by
//! hand instead of deriving them with `thiserror`, since this crate
//! keeps its dependency surface limited to what the domain needs.

use core::fmt;

/// A stable, short reason token explaining why a value could not be
/// refined further and collapsed to overdefined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Reason {
    /// [`crate::value::partial::PartialValue::combine`] needed to
    /// bytify a non-constant total value.
    NonConstBOps,
    /// Byte extraction from an aggregate constant failed
    /// ("read-different-from-generation-failed").
    Rdfg,
    /// A partial-pointer query resolved to more than one precise
    /// candidate where exactly one was required.
    Pp2,
    /// A constant index or offset fell outside the range the
    /// surrounding aggregate or buffer actually covers.
    ConstOor,
    /// Aggregate-member extraction for a read-modify-merge of an
    /// existing constant failed.
    ConstRdfgFailed,
    /// [`crate::value::Val::coerce`] was asked to build a pointer from
    /// non-zero raw bytes.
    CastNonZeroToPtr,
    /// [`crate::value::Val::coerce`] was asked to bit-reinterpret a
    /// non-`Scalar` value.
    NonScalarCoerce,
    /// A load through a pointer with at least one candidate of unknown
    /// (`UNKNOWN`) offset can never be precise.
    LoadVague,
    /// [`crate::value::partial::PartialValue::to_value`] fell through
    /// to the byte-array path and that path also failed.
    PvToPb,
}

impl Reason {
    /// The stable token text named in §7, e.g. for inclusion in logs.
    pub const fn token(self) -> &'static str {
        match self {
            Reason::NonConstBOps => "NonConstBOps",
            Reason::Rdfg => "RDFG",
            Reason::Pp2 => "PP2",
            Reason::ConstOor => "ConstOOR",
            Reason::ConstRdfgFailed => "ConstRDFGFailed",
            Reason::CastNonZeroToPtr => "CastNonZeroToPtr",
            Reason::NonScalarCoerce => "NonScalarCoerce",
            Reason::LoadVague => "LoadVague",
            Reason::PvToPb => "PVToPB",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Reason {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_match_spec_text() {
        assert_eq!(Reason::NonConstBOps.token(), "NonConstBOps");
        assert_eq!(Reason::Rdfg.token(), "RDFG");
        assert_eq!(Reason::Pp2.token(), "PP2");
        assert_eq!(Reason::ConstOor.token(), "ConstOOR");
        assert_eq!(Reason::ConstRdfgFailed.token(), "ConstRDFGFailed");
        assert_eq!(Reason::CastNonZeroToPtr.token(), "CastNonZeroToPtr");
        assert_eq!(Reason::NonScalarCoerce.token(), "NonScalarCoerce");
        assert_eq!(Reason::LoadVague.token(), "LoadVague");
        assert_eq!(Reason::PvToPb.token(), "PVToPB");
    }
}
