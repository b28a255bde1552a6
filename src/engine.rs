//! Snapshots of a built index and the engine that serves queries from them.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    catalog::{Catalog, CatalogStats},
    data_dir::{DataDir, Generation, GenerationLease},
    embedding::{Embedder, NgramEmbedder},
    embedding_db::EmbeddingDb,
    error::{Error, Result},
    eval::{Evaluator, RecordSet, TermReport},
    neighbors::FlatIndex,
    pattern::PatternResolver,
    pattern_store::TantivyPatternStore,
    prefix_index::{PrefixIndex, PrefixIndexBuilder},
    projection::project,
    query::Query,
    records::RecordStore,
    semantic::{self, SemanticResolver},
    settings::{Overrides, Settings},
};

/// What a query produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub records: RecordSet,
    /// Projected payloads, one per record, in id order.
    pub views: Vec<Value>,
    pub reports: Vec<TermReport>,
    pub ignored_keys: Vec<String>,
}

impl SearchOutcome {
    pub fn count(&self) -> usize {
        self.views.len()
    }

    pub fn truncated(&self) -> bool {
        self.reports.iter().any(|r| r.truncated)
    }
}

/// Counts describing one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BuildSummary {
    pub records: usize,
    pub prefixes: usize,
    pub fields: usize,
    pub embedded: usize,
}

/// Everything one query needs, immutable once built.
pub struct Snapshot {
    pub records: RecordStore,
    pub index: PrefixIndex,
    pub patterns: PatternResolver,
    pub semantic: Option<SemanticResolver>,
    pub settings: Settings,
    /// Keeps the generation this snapshot was loaded from on disk.
    lease: Option<GenerationLease>,
}

/// Flatten every record into a fresh index.
pub fn index_records(records: &RecordStore) -> PrefixIndex {
    let mut builder = PrefixIndexBuilder::new();
    for (id, record) in records.iter() {
        builder.add_record(id, record);
    }
    builder.finish()
}

fn embedder_for(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(NgramEmbedder::new(settings.embedding_dim)?))
}

fn semantic_for(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
    neighbors: FlatIndex,
) -> SemanticResolver {
    SemanticResolver::new(embedder, Arc::new(neighbors))
        .with_k(settings.k)
        .with_max_distance(settings.max_distance)
}

impl Snapshot {
    /// Build a snapshot entirely in memory.
    pub fn build(records: Vec<Value>, settings: Settings) -> Result<Self> {
        let embedder = if settings.hybrid {
            Some(embedder_for(&settings)?)
        } else {
            None
        };
        Self::build_with_embedder(records, settings, embedder)
    }

    /// Build in memory with a caller-supplied embedder for the semantic
    /// path. `None` disables free-text matching.
    pub fn build_with_embedder(
        records: Vec<Value>,
        settings: Settings,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        settings.validate()?;
        let records = RecordStore::from_records(records, settings.id_field.as_deref())?;
        let index = index_records(&records);

        let store = TantivyPatternStore::open_in_ram()?;
        store.rebuild(index.all_prefixes().iter().map(String::as_str))?;

        let semantic = match embedder {
            Some(embedder) => {
                let vectors = semantic::embed_prefixes(embedder.as_ref(), &index)?;
                let neighbors = FlatIndex::from_vectors(embedder.dimension(), vectors)?;
                Some(semantic_for(&settings, embedder, neighbors))
            }
            None => None,
        };

        Ok(Self {
            records,
            index,
            patterns: PatternResolver::new(Arc::new(store)),
            semantic,
            settings,
            lease: None,
        })
    }

    /// Parse, evaluate and project `text`.
    pub fn search(&self, text: &str) -> Result<SearchOutcome> {
        let query = Query::parse(text)?;
        self.search_query(&query)
    }

    pub fn search_value(&self, value: &Value) -> Result<SearchOutcome> {
        let query = Query::from_value(value)?;
        self.search_query(&query)
    }

    pub fn search_query(&self, query: &Query) -> Result<SearchOutcome> {
        let evaluation = Evaluator::new(&self.index, &self.patterns)
            .with_semantic(self.semantic.as_ref())
            .with_limits(self.settings.limits())
            .evaluate(query)?;

        let views = project(
            query.options.select.as_deref(),
            &evaluation.records,
            &self.records,
        );
        Ok(SearchOutcome {
            records: evaluation.records,
            views,
            reports: evaluation.reports,
            ignored_keys: query.ignored_keys.clone(),
        })
    }

    pub fn field_paths(&self) -> Vec<String> {
        self.index.field_paths().map(str::to_string).collect()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("records", &self.records.len())
            .field("prefixes", &self.index.len())
            .field("hybrid", &self.semantic.is_some())
            .field("leased", &self.lease.is_some())
            .finish_non_exhaustive()
    }
}

/// Build a new generation on disk from `records` and publish it.
pub fn build_generation(
    data_dir: &DataDir,
    records: Vec<Value>,
    settings: &Settings,
) -> Result<(Generation, BuildSummary)> {
    settings.validate()?;
    let generation = data_dir.new_generation()?;

    let summary = match write_generation(&generation, records, settings) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(generation.root()) {
                warn!(error = %cleanup, "failed to remove incomplete generation");
            }
            return Err(e);
        }
    };

    generation.mark_complete()?;
    data_dir.publish(&generation)?;
    info!(
        generation = generation.name(),
        records = summary.records,
        prefixes = summary.prefixes,
        "published index"
    );
    Ok((generation, summary))
}

fn write_generation(
    generation: &Generation,
    records: Vec<Value>,
    settings: &Settings,
) -> Result<BuildSummary> {
    let records = RecordStore::from_records(records, settings.id_field.as_deref())?;
    let index = index_records(&records);
    info!(records = records.len(), prefixes = index.len(), "indexed records");

    Catalog::write(&generation.catalog(), &records, &index, settings)?;

    let store = TantivyPatternStore::open(&generation.patterns_dir())?;
    store.rebuild(index.all_prefixes().iter().map(String::as_str))?;

    let embedded = if settings.hybrid {
        let embedder = embedder_for(settings)?;
        let db = EmbeddingDb::open(&generation.embeddings_db())?;
        semantic::write_corpus(embedder.as_ref(), &index, &db)?
    } else {
        0
    };

    Ok(BuildSummary {
        records: records.len(),
        prefixes: index.len(),
        fields: index.field_paths().count(),
        embedded,
    })
}

fn current_generation(data_dir: &DataDir) -> Result<Generation> {
    data_dir.current()?.ok_or_else(|| Error::NotFound {
        kind: "index",
        name: format!("{} (run `sieve build` first)", data_dir.root().display()),
    })
}

/// Load the published generation.
///
/// Settings are those stored with the build, then the environment, then
/// `overrides`.
pub fn load(data_dir: &DataDir, overrides: &Overrides) -> Result<Snapshot> {
    let generation = current_generation(data_dir)?;
    let lease = generation.lease()?;
    let catalog = Catalog::open(&generation.catalog())?;

    let settings = catalog
        .load_settings()?
        .with_env()?
        .with_overrides(overrides);
    settings.validate()?;

    let records = catalog.load_records()?;
    let index = catalog.load_index()?;
    let store = TantivyPatternStore::open(&generation.patterns_dir())?;

    let semantic = if settings.hybrid {
        let embedder = embedder_for(&settings)?;
        let path = generation.embeddings_db();
        let neighbors = if path.exists() {
            let db = EmbeddingDb::open(&path)?;
            semantic::load_corpus(embedder.as_ref(), &index, &db)?
        } else {
            info!("index was built without embeddings; embedding prefixes now");
            let vectors = semantic::embed_prefixes(embedder.as_ref(), &index)?;
            FlatIndex::from_vectors(embedder.dimension(), vectors)?
        };
        Some(semantic_for(&settings, embedder, neighbors))
    } else {
        None
    };

    info!(
        generation = generation.name(),
        records = records.len(),
        prefixes = index.len(),
        hybrid = settings.hybrid,
        "loaded index"
    );
    Ok(Snapshot {
        records,
        index,
        patterns: PatternResolver::new(Arc::new(store)),
        semantic,
        settings,
        lease: Some(lease),
    })
}

/// Field paths of the published generation, read without loading records.
pub fn field_paths(data_dir: &DataDir) -> Result<Vec<String>> {
    let generation = current_generation(data_dir)?;
    Catalog::open(&generation.catalog())?.field_paths()
}

/// Counts of the published generation.
pub fn status(data_dir: &DataDir) -> Result<(Generation, CatalogStats, Settings)> {
    let generation = current_generation(data_dir)?;
    let catalog = Catalog::open(&generation.catalog())?;
    Ok((generation, catalog.stats()?, catalog.load_settings()?))
}

/// Serves queries from the most recently published snapshot.
///
/// A query holds its own `Arc` for its whole evaluation, so publishing a
/// new snapshot never affects queries already in flight.
pub struct Engine {
    current: RwLock<Arc<Snapshot>>,
}

impl Engine {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `snapshot` visible to subsequent queries and return the one it
    /// replaced.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut current =
            self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(snapshot))
    }

    pub fn search(&self, text: &str) -> Result<SearchOutcome> {
        self.snapshot().search(text)
    }

    pub fn search_value(&self, value: &Value) -> Result<SearchOutcome> {
        self.snapshot().search_value(value)
    }

    pub fn field_paths(&self) -> Vec<String> {
        self.snapshot().field_paths()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("current", &self.snapshot())
            .finish()
    }
}
