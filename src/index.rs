use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem::size_of;
use std::path::Path;

use crate::config::Number;
use crate::vector_ops::squared_l2_distance_simd;

const MAGIC: &[u8; 4] = b"RGLX";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;

/// Exact-scan vector index. Vectors are stored row-major in insertion
/// order; the ordinal of a vector is the ordinal of its chunk. The first
/// insertion fixes the dimension for the lifetime of the index.
#[derive(Debug)]
pub struct VectorIndex {
    dim: usize,
    data: Vec<Number>,
    count: usize,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            dim: 0,
            data: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Dimension fixed by the first inserted vector; `None` while empty.
    pub fn dim(&self) -> Option<usize> {
        if self.count == 0 {
            None
        } else {
            Some(self.dim)
        }
    }

    pub fn vector(&self, ordinal: usize) -> &[Number] {
        let start = ordinal * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Append vectors in the given order. Any vector whose dimension does
    /// not match the index dimension fails the whole call.
    pub fn insert(&mut self, vectors: &[Vec<Number>]) -> Result<()> {
        for vector in vectors {
            if vector.is_empty() {
                anyhow::bail!("Cannot insert an empty vector into the index.");
            }
            if self.count == 0 && self.dim == 0 {
                self.dim = vector.len();
            } else if vector.len() != self.dim {
                anyhow::bail!(
                    "Vector dimension mismatch: index has {}, got {}",
                    self.dim,
                    vector.len()
                );
            }
            self.data.extend_from_slice(vector);
            self.count += 1;
        }
        Ok(())
    }

    /// Exact linear scan: squared L2 distance from the query to every
    /// stored vector, nearest first, ties broken by insertion ordinal.
    /// `k` larger than the index clamps to the index size.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<(usize, Number)>> {
        if self.count == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            anyhow::bail!(
                "Query dimension mismatch: index has {}, got {}",
                self.dim,
                query.len()
            );
        }

        let mut scored = (0..self.count)
            .into_par_iter()
            .map(|i| -> Result<(usize, Number)> {
                let distance = squared_l2_distance_simd(query, self.vector(i))
                    .context("Stored vector length mismatch")?;
                Ok((i, distance))
            })
            .collect::<Result<Vec<_>>>()?;

        scored.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize to `path`: fixed header followed by the row-major
    /// little-endian payload. Round-trip exact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create index file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dim as u32).to_le_bytes())?;
        writer.write_all(&(self.count as u32).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write index file '{}'", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open index file '{}'", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE {
            anyhow::bail!("Index file '{}' is truncated.", path.display());
        }
        if &mmap[0..4] != MAGIC {
            anyhow::bail!("Index file '{}' has an unrecognized format.", path.display());
        }
        let version = u32::from_le_bytes(mmap[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            anyhow::bail!(
                "Index file '{}' has unsupported version {}.",
                path.display(),
                version
            );
        }
        let dim = u32::from_le_bytes(mmap[8..12].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(mmap[12..16].try_into().unwrap()) as usize;

        let expected = HEADER_SIZE + dim * count * size_of::<Number>();
        if mmap.len() != expected {
            anyhow::bail!(
                "Index file '{}' is corrupt: expected {} bytes, found {}.",
                path.display(),
                expected,
                mmap.len()
            );
        }

        let data: Vec<Number> = mmap[HEADER_SIZE..]
            .chunks_exact(size_of::<Number>())
            .map(|b| Number::from_le_bytes(b.try_into().unwrap()))
            .collect();

        Ok(Self { dim, data, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_index() -> VectorIndex {
        let mut index = VectorIndex::new();
        index
            .insert(&[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn first_insert_fixes_dimension() {
        let mut index = VectorIndex::new();
        index.insert(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(index.dim(), Some(2));

        let err = index.insert(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn query_of_wrong_dimension_is_rejected() {
        let index = unit_index();
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn nearest_chunk_wins() {
        // Query close to the first axis must return ordinal 0 at squared
        // distance 0.01 + 0.01 = 0.02.
        let index = unit_index();
        let results = index.search(&[0.9, 0.1, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 0.02).abs() < 1e-6);
    }

    #[test]
    fn distances_are_non_decreasing() {
        let index = unit_index();
        let results = index.search(&[0.9, 0.1, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut index = VectorIndex::new();
        index
            .insert(&[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
        assert_eq!(results[2].0, 2);
    }

    #[test]
    fn oversized_k_clamps_to_index_size() {
        let index = unit_index();
        let results = index.search(&[0.0, 1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn search_is_deterministic() {
        let index = unit_index();
        let first = index.search(&[0.3, 0.5, 0.2], 3).unwrap();
        let second = index.search(&[0.3, 0.5, 0.2], 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_index_returns_no_results() {
        let index = VectorIndex::new();
        let results = index.search(&[1.0, 2.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn save_load_round_trip_preserves_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let index = unit_index();
        index.save(&path).unwrap();
        let reloaded = VectorIndex::load(&path).unwrap();

        assert_eq!(reloaded.len(), index.len());
        assert_eq!(reloaded.dim(), index.dim());
        let query = [0.9, 0.1, 0.0];
        assert_eq!(
            index.search(&query, 3).unwrap(),
            reloaded.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn truncated_index_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        unit_index().save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }
}
