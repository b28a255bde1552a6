use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::flatten::flatten;

/// Identifier of an ingested record.
pub type RecordId = u64;

/// Accumulates postings while records are ingested.
///
/// Postings are appended in ingestion order and may contain repeats until
/// [`finish`](Self::finish) de-duplicates them.
#[derive(Debug, Default)]
pub struct PrefixIndexBuilder {
    postings: HashMap<String, Vec<RecordId>>,
    field_paths: BTreeSet<String>,
}

impl PrefixIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the posting list of `prefix`, creating it if absent.
    pub fn insert(&mut self, prefix: String, id: RecordId) {
        self.postings.entry(prefix).or_default().push(id);
    }

    pub fn register_field(&mut self, field_path: &str) {
        if !self.field_paths.contains(field_path) {
            self.field_paths.insert(field_path.to_string());
        }
    }

    /// Flatten `record` and index every pair it yields.
    ///
    /// Returns the number of pairs emitted.
    pub fn add_record(&mut self, id: RecordId, record: &Value) -> usize {
        let entries = flatten(record);
        for entry in &entries {
            self.register_field(entry.field_path());
            self.insert(entry.prefix(), id);
        }
        entries.len()
    }

    pub fn finish(self) -> PrefixIndex {
        PrefixIndex::from_parts(self.postings, self.field_paths)
    }
}

/// Immutable mapping from prefix to the records that produced it.
///
/// Prefixes are held in lexicographic order; a prefix's position in that
/// order is its offset, which is how the nearest-neighbor corpus refers to
/// it.
#[derive(Debug, Default, Clone)]
pub struct PrefixIndex {
    prefixes: Vec<String>,
    postings: Vec<Vec<RecordId>>,
    field_paths: BTreeSet<String>,
}

impl PrefixIndex {
    /// Assemble an index from raw postings. Every posting list is sorted and
    /// de-duplicated.
    pub fn from_parts(
        postings: impl IntoIterator<Item = (String, Vec<RecordId>)>,
        field_paths: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut entries: Vec<(String, Vec<RecordId>)> = postings
            .into_iter()
            .map(|(prefix, mut ids)| {
                ids.sort_unstable();
                ids.dedup();
                (prefix, ids)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let (prefixes, postings) = entries.into_iter().unzip();
        Self {
            prefixes,
            postings,
            field_paths: field_paths.into_iter().collect(),
        }
    }

    fn offset_of(&self, prefix: &str) -> Option<usize> {
        self.prefixes
            .binary_search_by(|probe| probe.as_str().cmp(prefix))
            .ok()
    }

    /// The de-duplicated, ascending posting list for `prefix`; empty when the
    /// prefix is unknown.
    pub fn lookup(&self, prefix: &str) -> &[RecordId] {
        self.offset_of(prefix)
            .map(|offset| self.postings[offset].as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.offset_of(prefix).is_some()
    }

    pub fn all_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn prefix_at(&self, offset: usize) -> Option<&str> {
        self.prefixes.get(offset).map(String::as_str)
    }

    pub fn postings_at(&self, offset: usize) -> &[RecordId] {
        self.postings.get(offset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
        self.prefixes
            .iter()
            .map(String::as_str)
            .zip(self.postings.iter().map(Vec::as_slice))
    }

    /// Distinct field paths seen during ingestion, in lexicographic order.
    pub fn field_paths(&self) -> impl Iterator<Item = &str> {
        self.field_paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
