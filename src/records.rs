use std::{
    collections::BTreeMap,
    io::BufRead,
    path::Path,
};

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    prefix_index::RecordId,
};

/// Ingested records addressed by id.
///
/// Iteration is in ascending id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: BTreeMap<RecordId, Value>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids to `records` and collect them.
    ///
    /// Without `id_field` a record's id is its position. With it, an object
    /// record whose `id_field` holds a non-negative integer (or a string of
    /// digits) takes that value; other records keep their position.
    pub fn from_records(
        records: impl IntoIterator<Item = Value>,
        id_field: Option<&str>,
    ) -> Result<Self> {
        let mut store = Self::new();
        for (position, record) in records.into_iter().enumerate() {
            let id = id_field
                .and_then(|field| explicit_id(&record, field))
                .unwrap_or(position as RecordId);
            store.insert(id, record)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, id: RecordId, record: Value) -> Result<()> {
        if self.records.contains_key(&id) {
            return Err(Error::DuplicateRecord(id));
        }
        self.records.insert(id, record);
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Option<&Value> {
        self.records.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Value)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(RecordId, Value)> for RecordStore {
    fn from_iter<I: IntoIterator<Item = (RecordId, Value)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

fn explicit_id(record: &Value, field: &str) -> Option<RecordId> {
    match record.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

/// Parse one record per line. Blank lines are skipped; a line that is not
/// JSON becomes an opaque string record.
pub fn parse_lines(reader: impl BufRead) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut opaque = 0usize;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => records.push(value),
            Err(e) => {
                debug!(error = %e, "keeping unparseable line as an opaque record");
                opaque += 1;
                records.push(Value::String(trimmed.to_string()));
            }
        }
    }

    if opaque > 0 {
        info!(opaque, "some lines were not JSON and were kept as text");
    }
    Ok(records)
}

/// Read a JSON-lines file of records.
pub fn load_jsonl(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)?;
    parse_lines(std::io::BufReader::new(file))
}
