use rayon::prelude::*;

use crate::error::{Error, Result};

/// One nearest-neighbor hit: the offset of a prefix in the ordered prefix
/// corpus and its distance from the query vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub offset: usize,
    pub distance: f32,
}

/// Nearest-neighbor search over the embedded prefix corpus.
pub trait NeighborIndex: Send + Sync {
    /// The `k` closest entries to `vector`, nearest first.
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive squared-L2 scan over a dense row-major matrix.
///
/// Ties are broken by ascending offset so results are reproducible.
#[derive(Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build from vectors whose offsets are `0..n` in order.
    pub fn from_vectors(
        dimension: usize,
        vectors: impl IntoIterator<Item = Vec<f32>>,
    ) -> Result<Self> {
        let mut index = Self::new(dimension);
        for vector in vectors {
            index.push(&vector)?;
        }
        Ok(index)
    }

    /// Append a vector; its offset is the current length.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::collaborator(
                "nearest-neighbor index",
                format!(
                    "vector has dimension {}, index expects {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl NeighborIndex for FlatIndex {
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(vector)?;
        if k == 0 || self.dimension == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(offset, row)| Neighbor {
                offset,
                distance: squared_l2(row, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.offset.cmp(&b.offset))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }
}

impl std::fmt::Debug for FlatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndex")
            .field("dimension", &self.dimension)
            .field("len", &self.len())
            .finish()
    }
}
