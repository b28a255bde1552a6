//! Approximate matching of free-text terms against the prefix corpus.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::{
    embedding::Embedder,
    embedding_db::EmbeddingDb,
    error::{Error, Result},
    neighbors::{FlatIndex, NeighborIndex},
    prefix_index::PrefixIndex,
};

pub const DEFAULT_K: usize = 10;
pub const DEFAULT_MAX_DISTANCE: f32 = 0.089;

/// A prefix accepted as a semantic match.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub prefix: String,
    pub distance: f32,
}

/// Embeds free text and keeps the nearest prefixes within `max_distance`.
#[derive(Clone)]
pub struct SemanticResolver {
    embedder: Arc<dyn Embedder>,
    neighbors: Arc<dyn NeighborIndex>,
    k: usize,
    max_distance: f32,
}

impl SemanticResolver {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        neighbors: Arc<dyn NeighborIndex>,
    ) -> Self {
        Self {
            embedder,
            neighbors,
            k: DEFAULT_K,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Neighbors of `text` among the prefixes of `index`, nearest first,
    /// restricted to `distance <= max_distance`.
    ///
    /// `index` must be the index whose ordered prefixes seeded the
    /// neighbor corpus.
    pub fn resolve(
        &self,
        text: &str,
        index: &PrefixIndex,
    ) -> Result<Vec<SemanticMatch>> {
        let vector = self.embedder.embed(text)?;
        let hits = self.neighbors.search(&vector, self.k)?;

        let mut accepted = Vec::new();
        for hit in hits {
            if hit.distance > self.max_distance {
                continue;
            }
            let prefix = index.prefix_at(hit.offset).ok_or_else(|| {
                Error::collaborator(
                    "nearest-neighbor index",
                    format!(
                        "offset {} is outside the prefix corpus of {}",
                        hit.offset,
                        index.len()
                    ),
                )
            })?;
            accepted.push(SemanticMatch {
                prefix: prefix.to_string(),
                distance: hit.distance,
            });
        }

        debug!(
            text,
            k = self.k,
            accepted = accepted.len(),
            "resolved semantic term"
        );
        Ok(accepted)
    }
}

impl std::fmt::Debug for SemanticResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticResolver")
            .field("embedder", &self.embedder.name())
            .field("k", &self.k)
            .field("max_distance", &self.max_distance)
            .finish_non_exhaustive()
    }
}

/// Embed every prefix of `index` in offset order.
pub fn embed_prefixes(
    embedder: &dyn Embedder,
    index: &PrefixIndex,
) -> Result<Vec<Vec<f32>>> {
    index
        .all_prefixes()
        .par_iter()
        .map(|prefix| embedder.embed(prefix))
        .collect()
}

/// Embed the corpus and persist it, one vector per prefix offset.
pub fn write_corpus(
    embedder: &dyn Embedder,
    index: &PrefixIndex,
    db: &EmbeddingDb,
) -> Result<usize> {
    let vectors = embed_prefixes(embedder, index)?;
    let entries: Vec<(u64, Vec<f32>)> = vectors
        .into_iter()
        .enumerate()
        .map(|(offset, vector)| (offset as u64, vector))
        .collect();

    db.batch_store(&entries)?;
    db.set_model(embedder.name())?;
    Ok(entries.len())
}

/// Load a persisted corpus into a [`FlatIndex`].
///
/// Fails when the corpus was written by a different embedder or does not
/// cover every prefix of `index`.
pub fn load_corpus(
    embedder: &dyn Embedder,
    index: &PrefixIndex,
    db: &EmbeddingDb,
) -> Result<FlatIndex> {
    if let Some(model) = db.model()?
        && model != embedder.name()
    {
        return Err(Error::Config(format!(
            "embeddings were built with '{model}', not '{}'; rebuild the index",
            embedder.name()
        )));
    }

    let entries = db.load_all()?;
    if entries.len() != index.len()
        || entries.iter().enumerate().any(|(i, (o, _))| *o != i as u64)
    {
        return Err(Error::Config(format!(
            "embedding corpus has {} vectors for {} prefixes; rebuild the index",
            entries.len(),
            index.len()
        )));
    }

    FlatIndex::from_vectors(
        embedder.dimension(),
        entries.into_iter().map(|(_, v)| v),
    )
}
