//! Global tuning constants for the proximity-graph index.
//!
//! These are compile-time defaults; per-index settings are supplied through
//! [`IndexOptions`](crate::IndexOptions) at construction time.

/// Default number of outgoing links per node at layers above 0.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8-64.
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// Default candidate beam width during insertion (`ef_construction`).
///
/// Controls the size of the dynamic candidate list while stitching a new
/// node into the graph. Higher values produce a better graph but slow down
/// build time.
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// Default candidate beam width during search (`ef_search`).
///
/// Raised to `k` automatically when a query asks for more results.
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Hard ceiling on the number of hierarchy layers.
///
/// With `level_lambda = 1/ln(16)` a draw at this layer has probability
/// around `16^-15`; the cap bounds the per-node layer loop and the file
/// format, nothing else.
pub const MAX_LAYERS: usize = 16;

/// Per-vector slots in the arena are padded to this boundary so every
/// vector load starts on a fresh cache line. The on-disk vector arena is
/// aligned to the same boundary.
pub const VECTOR_ALIGN: usize = 64;

/// Maximum supported vector dimensionality.
pub const MAX_DIMENSION: usize = 4096;

/// Construction-time RNG seed used when the caller does not supply one.
///
/// Layer draws are reproducible per worker id for a fixed seed.
pub const DEFAULT_SEED: u64 = 42;
