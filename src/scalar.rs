//! Element types and typed input views.
//!
//! Every index stores exactly one element type; callers hand vectors over
//! as a [`VectorData`] view which is validated and converted into the
//! stored representation. Float-family indexes accept any float input
//! width; integer payloads (bit-hash words, sorted set members) must match
//! the stored type exactly.

use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Scalar element type of the vectors stored in an index.
///
/// Wire ids (used in the file header) are stable: f32=1, f16=2, f64=3,
/// i8=4, b64=5, u32=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// IEEE 754 half-precision float.
    F16,
    /// Single-precision float (the default).
    F32,
    /// Double-precision float.
    F64,
    /// Signed 8-bit integer.
    I8,
    /// 64-bit words of a bit-hash, compared with the hamming metric.
    B64,
    /// Members of a sorted integer set, compared with the jaccard metric.
    U32,
}

impl ScalarKind {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarKind::I8 => 1,
            ScalarKind::F16 => 2,
            ScalarKind::F32 | ScalarKind::U32 => 4,
            ScalarKind::F64 | ScalarKind::B64 => 8,
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::F16 => "f16",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::I8 => "i8",
            ScalarKind::B64 => "b64",
            ScalarKind::U32 => "u32",
        }
    }

    /// Parses a scalar kind from its canonical name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "f16" => Ok(ScalarKind::F16),
            "f32" => Ok(ScalarKind::F32),
            "f64" => Ok(ScalarKind::F64),
            "i8" => Ok(ScalarKind::I8),
            "b64" => Ok(ScalarKind::B64),
            "u32" => Ok(ScalarKind::U32),
            other => Err(IndexError::InvalidArgument(format!(
                "unknown scalar type '{other}' (expected f16, f32, f64, i8, b64, or u32)"
            ))),
        }
    }

    /// True for the float family accepted by ip/cos/l2sq metrics.
    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F16 | ScalarKind::F32 | ScalarKind::F64)
    }

    pub(crate) fn to_wire(self) -> u32 {
        match self {
            ScalarKind::F32 => 1,
            ScalarKind::F16 => 2,
            ScalarKind::F64 => 3,
            ScalarKind::I8 => 4,
            ScalarKind::B64 => 5,
            ScalarKind::U32 => 6,
        }
    }

    pub(crate) fn from_wire(v: u32) -> Option<Self> {
        match v {
            1 => Some(ScalarKind::F32),
            2 => Some(ScalarKind::F16),
            3 => Some(ScalarKind::F64),
            4 => Some(ScalarKind::I8),
            5 => Some(ScalarKind::B64),
            6 => Some(ScalarKind::U32),
            _ => None,
        }
    }
}

/// Borrowed view over one caller-supplied vector.
#[derive(Debug, Clone, Copy)]
pub enum VectorData<'a> {
    F16(&'a [f16]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    I8(&'a [i8]),
    B64(&'a [u64]),
    U32(&'a [u32]),
}

impl VectorData<'_> {
    /// Number of elements in the view.
    pub fn len(&self) -> usize {
        match self {
            VectorData::F16(v) => v.len(),
            VectorData::F32(v) => v.len(),
            VectorData::F64(v) => v.len(),
            VectorData::I8(v) => v.len(),
            VectorData::B64(v) => v.len(),
            VectorData::U32(v) => v.len(),
        }
    }

    /// True when the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            VectorData::F16(_) => "f16",
            VectorData::F32(_) => "f32",
            VectorData::F64(_) => "f64",
            VectorData::I8(_) => "i8",
            VectorData::B64(_) => "b64",
            VectorData::U32(_) => "u32",
        }
    }

    /// Validates the view against the index shape and writes the stored
    /// byte representation into `out`.
    pub(crate) fn coerce_into(
        &self,
        kind: ScalarKind,
        dims: usize,
        out: &mut AlignedBuf,
    ) -> Result<()> {
        if self.len() != dims {
            return Err(IndexError::InvalidArgument(format!(
                "vector has {} dimensions, index expects {dims}",
                self.len()
            )));
        }
        out.resize_bytes(dims * kind.size_bytes());
        let bytes = out.as_bytes_mut();
        match (self, kind) {
            (VectorData::F16(v), k) if k.is_float() => {
                write_floats(bytes, k, v.iter().map(|x| x.to_f64()));
            }
            (VectorData::F32(v), k) if k.is_float() => {
                write_floats(bytes, k, v.iter().map(|&x| x as f64));
            }
            (VectorData::F64(v), k) if k.is_float() => {
                write_floats(bytes, k, v.iter().copied());
            }
            (VectorData::I8(v), ScalarKind::I8) => {
                for (b, &x) in bytes.iter_mut().zip(*v) {
                    *b = x as u8;
                }
            }
            (VectorData::B64(v), ScalarKind::B64) => {
                for (chunk, &x) in bytes.chunks_exact_mut(8).zip(*v) {
                    chunk.copy_from_slice(&x.to_le_bytes());
                }
            }
            (VectorData::U32(v), ScalarKind::U32) => {
                for (chunk, &x) in bytes.chunks_exact_mut(4).zip(*v) {
                    chunk.copy_from_slice(&x.to_le_bytes());
                }
            }
            _ => {
                return Err(IndexError::InvalidArgument(format!(
                    "{} input cannot populate a {} index",
                    self.type_name(),
                    kind.name()
                )))
            }
        }
        Ok(())
    }
}

fn write_floats(out: &mut [u8], kind: ScalarKind, values: impl Iterator<Item = f64>) {
    match kind {
        ScalarKind::F16 => {
            for (chunk, x) in out.chunks_exact_mut(2).zip(values) {
                chunk.copy_from_slice(&f16::from_f64(x).to_le_bytes());
            }
        }
        ScalarKind::F32 => {
            for (chunk, x) in out.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&(x as f32).to_le_bytes());
            }
        }
        ScalarKind::F64 => {
            for (chunk, x) in out.chunks_exact_mut(8).zip(values) {
                chunk.copy_from_slice(&x.to_le_bytes());
            }
        }
        _ => unreachable!("guarded by is_float"),
    }
}

/// Rejects jaccard payloads that are not strictly increasing.
pub(crate) fn validate_sorted_set(set: &[u32]) -> Result<()> {
    for pair in set.windows(2) {
        if pair[0] >= pair[1] {
            return Err(IndexError::InvalidArgument(
                "jaccard sets must be sorted and deduplicated".into(),
            ));
        }
    }
    Ok(())
}

/// Byte buffer backed by `u64` words so typed views of any supported
/// element width stay aligned.
#[derive(Debug, Default)]
pub(crate) struct AlignedBuf {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuf {
    /// Resizes the buffer to `len` bytes. Contents are overwritten by the
    /// next coercion, so stale bytes are never observed.
    pub fn resize_bytes(&mut self, len: usize) {
        self.words.resize(len.div_ceil(8), 0);
        self.len = len;
    }

    pub fn as_bytes(&self) -> &[u8] {
        // The word storage always covers `len` bytes.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast(), self.len) }
    }
}

macro_rules! cast_fn {
    ($name:ident, $t:ty) => {
        /// Reinterprets stored bytes as a typed slice.
        ///
        /// Arena slots, mapped arenas, and query buffers are all at least
        /// 8-byte aligned by construction, which satisfies every element
        /// type.
        #[inline]
        pub(crate) fn $name(bytes: &[u8]) -> &[$t] {
            debug_assert_eq!(bytes.as_ptr() as usize % std::mem::align_of::<$t>(), 0);
            debug_assert_eq!(bytes.len() % std::mem::size_of::<$t>(), 0);
            unsafe {
                std::slice::from_raw_parts(
                    bytes.as_ptr().cast(),
                    bytes.len() / std::mem::size_of::<$t>(),
                )
            }
        }
    };
}

cast_fn!(as_f16s, f16);
cast_fn!(as_f32s, f32);
cast_fn!(as_f64s, f64);
cast_fn!(as_i8s, i8);
cast_fn!(as_u64s, u64);
cast_fn!(as_u32s, u32);
