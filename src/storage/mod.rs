//! Persistence layer: the single-file index format, full loads, and
//! read-only memory-mapped views.

/// Save, load, and view in the little-endian single-file format.
pub mod persistence;

pub use persistence::{load, save, view};
