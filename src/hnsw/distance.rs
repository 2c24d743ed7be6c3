//! Distance metrics for proximity-graph search.
//!
//! Five built-in metrics (inner product, cosine, squared L2, hamming,
//! jaccard) plus a user-supplied callback. Every metric returns a scalar
//! where **lower is closer**; inner-product-like metrics store `1 - dot`
//! and `1 - cos` so the convention holds uniformly.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::scalar::{self, ScalarKind};

/// Built-in distance metric.
///
/// Wire ids (used in the file header) are stable: ip=1, cos=2, l2sq=3,
/// hamming=4, jaccard=5; 0 marks a user callback and makes the file
/// non-portable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Inner product distance: `1 - dot(a, b)`.
    Ip,
    /// Cosine distance: `1 - cos(a, b)`. Range: \[0, 2\].
    Cos,
    /// Squared Euclidean distance. Range: \[0, inf).
    L2sq,
    /// Population count of `a XOR b` over 64-bit words.
    Hamming,
    /// Set dissimilarity: `1 - |a n b| / |a u b|` over sorted id sets.
    Jaccard,
}

impl MetricKind {
    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Ip => "ip",
            MetricKind::Cos => "cos",
            MetricKind::L2sq => "l2sq",
            MetricKind::Hamming => "hamming",
            MetricKind::Jaccard => "jaccard",
        }
    }

    /// Parses a metric from its canonical name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ip" => Ok(MetricKind::Ip),
            "cos" => Ok(MetricKind::Cos),
            "l2sq" => Ok(MetricKind::L2sq),
            "hamming" => Ok(MetricKind::Hamming),
            "jaccard" => Ok(MetricKind::Jaccard),
            other => Err(IndexError::InvalidArgument(format!(
                "unknown metric '{other}' (expected ip, cos, l2sq, hamming, or jaccard)"
            ))),
        }
    }

    /// Whether this metric can run over the given element type.
    pub fn compatible_with(self, scalar: ScalarKind) -> bool {
        match self {
            MetricKind::Ip | MetricKind::Cos | MetricKind::L2sq => {
                scalar.is_float() || scalar == ScalarKind::I8
            }
            MetricKind::Hamming => scalar == ScalarKind::B64,
            MetricKind::Jaccard => scalar == ScalarKind::U32,
        }
    }

    pub(crate) fn to_wire(self) -> u32 {
        match self {
            MetricKind::Ip => 1,
            MetricKind::Cos => 2,
            MetricKind::L2sq => 3,
            MetricKind::Hamming => 4,
            MetricKind::Jaccard => 5,
        }
    }

    pub(crate) fn from_wire(v: u32) -> Option<Self> {
        match v {
            1 => Some(MetricKind::Ip),
            2 => Some(MetricKind::Cos),
            3 => Some(MetricKind::L2sq),
            4 => Some(MetricKind::Hamming),
            5 => Some(MetricKind::Jaccard),
            _ => None,
        }
    }
}

/// User-supplied distance callback over raw stored bytes.
///
/// Receives both vectors in the stored representation plus the index
/// dimensionality. Must be pure, deterministic, and thread-safe.
pub type CustomMetric = fn(&[u8], &[u8], usize) -> f32;

#[derive(Debug, Clone, Copy)]
enum Routine {
    Builtin(MetricKind),
    Custom(CustomMetric),
}

/// A distance function bound to an element type and dimensionality.
#[derive(Debug, Clone, Copy)]
pub struct Metric {
    routine: Routine,
    scalar: ScalarKind,
    dims: usize,
}

impl Metric {
    /// Binds a built-in metric, validating element-type compatibility.
    pub fn builtin(kind: MetricKind, scalar: ScalarKind, dims: usize) -> Result<Self> {
        if !kind.compatible_with(scalar) {
            return Err(IndexError::InvalidArgument(format!(
                "metric '{}' does not support {} elements",
                kind.name(),
                scalar.name()
            )));
        }
        Ok(Self {
            routine: Routine::Builtin(kind),
            scalar,
            dims,
        })
    }

    /// Binds a user callback. Files saved from such an index carry metric
    /// id 0 and are non-portable.
    pub fn custom(f: CustomMetric, scalar: ScalarKind, dims: usize) -> Self {
        Self {
            routine: Routine::Custom(f),
            scalar,
            dims,
        }
    }

    /// The built-in kind, or `None` for a user callback.
    pub fn kind(&self) -> Option<MetricKind> {
        match self.routine {
            Routine::Builtin(kind) => Some(kind),
            Routine::Custom(_) => None,
        }
    }

    /// True when backed by a user callback.
    pub fn is_custom(&self) -> bool {
        matches!(self.routine, Routine::Custom(_))
    }

    /// Element type of both operands.
    pub fn scalar(&self) -> ScalarKind {
        self.scalar
    }

    /// Elements per vector.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Stored bytes per vector.
    pub fn dims_bytes(&self) -> usize {
        self.dims * self.scalar.size_bytes()
    }

    pub(crate) fn wire_id(&self) -> u32 {
        match self.routine {
            Routine::Builtin(kind) => kind.to_wire(),
            Routine::Custom(_) => 0,
        }
    }

    /// Distance between two stored vectors. Lower is closer.
    #[inline]
    pub fn distance(&self, a: &[u8], b: &[u8]) -> f32 {
        let kind = match self.routine {
            Routine::Custom(f) => return f(a, b, self.dims),
            Routine::Builtin(kind) => kind,
        };
        match (kind, self.scalar) {
            (MetricKind::Ip, ScalarKind::F32) => 1.0 - dot_f32(scalar::as_f32s(a), scalar::as_f32s(b)),
            (MetricKind::Cos, ScalarKind::F32) => cos_dist_f32(scalar::as_f32s(a), scalar::as_f32s(b)),
            (MetricKind::L2sq, ScalarKind::F32) => l2sq_f32(scalar::as_f32s(a), scalar::as_f32s(b)),
            (MetricKind::Ip, ScalarKind::F16) => 1.0 - dot_f16(scalar::as_f16s(a), scalar::as_f16s(b)),
            (MetricKind::Cos, ScalarKind::F16) => cos_dist_f16(scalar::as_f16s(a), scalar::as_f16s(b)),
            (MetricKind::L2sq, ScalarKind::F16) => l2sq_f16(scalar::as_f16s(a), scalar::as_f16s(b)),
            (MetricKind::Ip, ScalarKind::F64) => 1.0 - dot_f64(scalar::as_f64s(a), scalar::as_f64s(b)),
            (MetricKind::Cos, ScalarKind::F64) => cos_dist_f64(scalar::as_f64s(a), scalar::as_f64s(b)),
            (MetricKind::L2sq, ScalarKind::F64) => l2sq_f64(scalar::as_f64s(a), scalar::as_f64s(b)),
            (MetricKind::Ip, ScalarKind::I8) => 1.0 - dot_i8(scalar::as_i8s(a), scalar::as_i8s(b)),
            (MetricKind::Cos, ScalarKind::I8) => cos_dist_i8(scalar::as_i8s(a), scalar::as_i8s(b)),
            (MetricKind::L2sq, ScalarKind::I8) => l2sq_i8(scalar::as_i8s(a), scalar::as_i8s(b)),
            (MetricKind::Hamming, ScalarKind::B64) => {
                hamming_u64(scalar::as_u64s(a), scalar::as_u64s(b))
            }
            (MetricKind::Jaccard, ScalarKind::U32) => {
                jaccard_u32(scalar::as_u32s(a), scalar::as_u32s(b))
            }
            _ => unreachable!("metric/element compatibility is validated at construction"),
        }
    }
}

fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2sq_f32(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn cos_dist_f32(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

fn dot_f16(a: &[half::f16], b: &[half::f16]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
}

fn l2sq_f16(a: &[half::f16], b: &[half::f16]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x.to_f32() - y.to_f32();
            d * d
        })
        .sum()
}

fn cos_dist_f16(a: &[half::f16], b: &[half::f16]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

fn dot_f64(a: &[f64], b: &[f64]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() as f32
}

fn l2sq_f64(a: &[f64], b: &[f64]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>() as f32
}

fn cos_dist_f64(a: &[f64], b: &[f64]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (na.sqrt() * nb.sqrt())) as f32
}

fn dot_i8(a: &[i8], b: &[i8]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x as i32 * y as i32)
        .sum::<i32>() as f32
}

fn l2sq_i8(a: &[i8], b: &[i8]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            d * d
        })
        .sum::<i32>() as f32
}

fn cos_dist_i8(a: &[i8], b: &[i8]) -> f32 {
    let (mut dot, mut na, mut nb) = (0i64, 0i64, 0i64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as i64, y as i64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0 || nb == 0 {
        return 1.0;
    }
    (1.0 - dot as f64 / ((na as f64).sqrt() * (nb as f64).sqrt())) as f32
}

fn hamming_u64(a: &[u64], b: &[u64]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum::<u32>() as f32
}

fn jaccard_u32(a: &[u32], b: &[u32]) -> f32 {
    let (mut i, mut j, mut inter) = (0usize, 0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                inter += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - inter;
    if union == 0 {
        0.0
    } else {
        1.0 - inter as f32 / union as f32
    }
}
