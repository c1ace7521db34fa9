//! Error Taxonomy
//!
//! Errors raised during hit classification and QRDR mutation detection.
//! All are fatal for the sample being processed; the driver reports them
//! and moves on to the next sample untouched.

use thiserror::Error;

/// Classification and mutation-detection errors.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A hit references a variant absent from the reference class table.
    ///
    /// Indicates the class table and the search database were built from
    /// different references; ignoring it would silently corrupt the report.
    #[error("unknown variant in hit: {variant_id} (class table / search database mismatch)")]
    UnknownVariant { variant_id: String },

    /// A raw alignment line has the wrong field count or an unparsable
    /// numeric field. No partial parsing is attempted.
    #[error("malformed {kind} record: {line}")]
    MalformedRecord { kind: &'static str, line: String },

    /// An external binary exited non-zero, timed out, or produced
    /// empty/unparsable output where output was required.
    #[error("{tool} failed: {detail}")]
    ExternalToolFailure { tool: String, detail: String },

    /// The requested ungapped position exceeds the non-gap characters
    /// available in the gapped sequence. Surfaced rather than clamped so
    /// callers can skip the mutation call instead of reading a wrong residue.
    #[error("position {requested} beyond aligned region ({available} residues)")]
    CoordinateOutOfRange { requested: usize, available: usize },
}
