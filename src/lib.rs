//! # proxima
//!
//! Single-file, in-memory vector search engine built on a hierarchical
//! navigable small-world proximity graph. Supports approximate
//! nearest-neighbor queries under pluggable distance metrics (inner
//! product, cosine, squared L2, hamming over bit-hashes, jaccard over
//! sorted sets, or a user callback) across f16/f32/f64/i8 elements.
//!
//! Adds and searches run concurrently; the whole index round-trips
//! through one self-describing file that can be either fully loaded or
//! served from a read-only memory mapping.
//!
//! ```no_run
//! use proxima::{Index, IndexOptions, MetricKind, VectorData};
//!
//! let index = Index::new(IndexOptions {
//!     dimensions: 3,
//!     capacity: 1024,
//!     metric: MetricKind::L2sq,
//!     ..IndexOptions::default()
//! })?;
//! index.add(42, VectorData::F32(&[0.1, 0.2, 0.3]), 0)?;
//! let nearest = index.search(VectorData::F32(&[0.1, 0.2, 0.3]), 10, 0)?;
//! assert_eq!(nearest[0].label, 42);
//! # Ok::<(), proxima::IndexError>(())
//! ```

/// Compile-time tuning constants.
pub mod config;
/// Error types and the crate-wide `Result` alias.
pub mod error;
/// Bit-hashing of token streams for the hamming metric.
pub mod hash;
/// The hierarchical proximity graph: storage, traversal, insertion.
pub mod hnsw;
/// The public index façade.
pub mod index;
/// Element types and typed input views.
pub mod scalar;
/// Persistence: save, load, and memory-mapped view.
pub mod storage;

pub use error::{IndexError, Result};
pub use hash::{hash64, BitHasher};
pub use hnsw::distance::{CustomMetric, MetricKind};
pub use index::{Index, IndexOptions, Match};
pub use scalar::{ScalarKind, VectorData};
