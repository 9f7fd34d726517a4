//! Flat (exhaustive) squared-L2 nearest-neighbour index.
//!
//! Row `i` of the index belongs to memory `mem-{i}`. There is no incremental
//! add or remove: every change to the memory set rebuilds the index from the
//! full vector set in sequence order.
//!
//! # File format
//!
//! Little-endian throughout:
//!
//! | Field | Type |
//! |---|---|
//! | magic `MNFL` | 4 bytes |
//! | version | `u32` |
//! | dimension | `u32` |
//! | count | `u64` |
//! | vectors | `count * dimension` × `f32` |

use std::io::Write;
use std::path::Path;

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{MemoryError, Result};

const MAGIC: &[u8; 4] = b"MNFL";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    /// Shape `[count, dim]`, standard (row-major) layout.
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// An empty index of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Array2::zeros((0, dim)),
        }
    }

    /// Build from scratch. Every vector must have exactly `dim` components.
    pub fn build(dim: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        if dim == 0 {
            return Err(MemoryError::Configuration(
                "index dimension must be greater than zero".into(),
            ));
        }
        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dim {
                return Err(MemoryError::Configuration(format!(
                    "vector {i} has dimension {}, index expects {dim}",
                    v.len()
                )));
            }
            flat.extend_from_slice(v);
        }
        let vectors = Array2::from_shape_vec((vectors.len(), dim), flat)
            .map_err(|e| MemoryError::Configuration(format!("invalid index shape: {e}")))?;
        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored vector at `position`.
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        (position < self.len()).then(|| self.vectors.row(position).to_vec())
    }

    /// A new index holding only the rows at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Result<Self> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(MemoryError::Configuration(format!(
                "position {bad} out of range for index of {} vectors",
                self.len()
            )));
        }
        Ok(Self {
            dim: self.dim,
            vectors: self.vectors.select(Axis(0), positions),
        })
    }

    /// The `k` nearest rows to `query` by squared L2 distance, ascending.
    ///
    /// Ties are broken by lower position so results are deterministic. `k` is
    /// clamped to the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(MemoryError::Configuration(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dim
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let q = ArrayView1::from(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(i, row)| {
                let dist = row
                    .iter()
                    .zip(q.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (i, dist)
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize to `path` (overwriting).
    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for x in self.vectors.iter() {
            bytes.extend_from_slice(&x.to_le_bytes());
        }

        let mut file = std::fs::File::create(path).map_err(|e| MemoryError::io(path, e))?;
        file.write_all(&bytes).map_err(|e| MemoryError::io(path, e))?;
        file.sync_all().map_err(|e| MemoryError::io(path, e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| MemoryError::io(path, e))?;
        Self::from_bytes(&bytes)
            .map_err(|msg| MemoryError::MalformedInput(format!("{}: {msg}", path.display())))
    }

    fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("index file too short ({} bytes)", bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err("not an index file (bad magic)".into());
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().map_err(|_| "bad header")?);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported index version {version}"));
        }
        let dim = u32::from_le_bytes(bytes[8..12].try_into().map_err(|_| "bad header")?) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into().map_err(|_| "bad header")?) as usize;
        if dim == 0 {
            return Err("index dimension is zero".into());
        }

        let expected = count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or("index size overflow")?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(format!(
                "index body is {} bytes, expected {expected} for {count} x {dim}",
                body.len()
            ));
        }

        let flat: Vec<f32> = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let vectors = Array2::from_shape_vec((count, dim), flat).map_err(|e| e.to_string())?;
        Ok(Self { dim, vectors })
    }
}
