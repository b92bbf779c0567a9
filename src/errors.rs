// src/errors.rs

use crate::rank::Rank;
use thiserror::Error;

/// Errors raised while parsing a report or rebuilding a taxonomy tree.
///
/// Structural-input errors (`InvalidRank`, `MalformedSequence`) abort processing
/// of the affected root tree only; the driver logs them and moves on to the next
/// region. An empty selection is never an error.
#[derive(Debug, Error)]
pub enum K2rError {
    /// Rank text did not match the species-or-below grammar ("S", "S1", ...).
    #[error("invalid taxon rank: {0:?}")]
    InvalidRank(String),

    /// The graph builder found no ancestor at the required rank in the
    /// already-consumed prefix. Indicates a non-monotonic or truncated report.
    #[error("no ancestor at rank {rank} found before row {row}")]
    MalformedSequence { row: usize, rank: Rank },

    /// A species-level row carried an unparseable numeric field.
    #[error("malformed report row {row}: {field}")]
    MalformedReport { row: usize, field: &'static str },

    /// The report contained no species-level rows at all.
    #[error("no usable species-level rows in report")]
    NoData,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
