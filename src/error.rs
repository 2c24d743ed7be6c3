//! Error types surfaced by every fallible index operation.
//!
//! All errors propagate to the caller; nothing is swallowed or retried
//! inside the engine. A failed `add` never consumes an internal id.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors returned by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Malformed caller input: wrong dimensionality, mismatched element
    /// type, an unsorted or duplicated jaccard set, or an unknown metric
    /// or scalar name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The index is full; `reserve` more slots before adding.
    #[error("index is full ({size} of {capacity} slots used)")]
    OutOfCapacity { size: usize, capacity: usize },

    /// File system failure during save, load, or view.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file exists but cannot back this index: bad magic, unsupported
    /// version, or a dimension/element/metric mismatch.
    #[error("incompatible index file: {0}")]
    IncompatibleFile(String),

    /// An exclusive operation (reserve, save, load, view, clear) was
    /// attempted while adds or searches were in flight, or vice versa.
    #[error("operation requires exclusive access but the index is busy")]
    Locked,

    /// Mutation of a memory-mapped (viewed) index.
    #[error("index is memory-mapped read-only")]
    Immutable,
}
