use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::error::{Error, Result};

const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const MODEL_KEY: &str = "model";

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Stores one embedding vector per prefix, keyed by the prefix's offset in
/// the ordered prefix corpus.
///
/// Binary format per entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
pub struct EmbeddingDb {
    db: Database,
}

impl EmbeddingDb {
    /// Open or create an embeddings database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use sieve::EmbeddingDb;
    ///
    /// let db = EmbeddingDb::open(&tmp.path().join("embeddings.redb")).unwrap();
    /// assert_eq!(db.len().unwrap(), 0);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(EMBEDDINGS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Record which embedder produced the stored vectors.
    pub fn set_model(&self, name: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            table.insert(MODEL_KEY, name)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn model(&self) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(MODEL_KEY)?.map(|v| v.value().to_string()))
    }

    /// Store the vector for one prefix offset.
    pub fn store(&self, offset: u64, vector: &[f32]) -> Result<()> {
        self.batch_store(&[(offset, vector.to_vec())])
    }

    /// Store multiple vectors in a single transaction.
    ///
    /// Uses `insert_reserve` for zero-copy writes.
    pub fn batch_store(&self, entries: &[(u64, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for (offset, vector) in entries {
                let dimension = u32::try_from(vector.len()).map_err(|_| {
                    Error::Config(format!(
                        "embedding dimension {} does not fit in u32",
                        vector.len()
                    ))
                })?;
                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
                let mut guard = table.insert_reserve(*offset, byte_len)?;
                let dest = guard.as_mut();

                dest[0..HEADER_SIZE].copy_from_slice(&dimension.to_le_bytes());
                dest[HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(vector.as_slice()));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Retrieve the vector for one prefix offset.
    ///
    /// Returns None if absent or if the stored entry is truncated.
    pub fn load(&self, offset: u64) -> Result<Option<Vec<f32>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let Some(guard) = table.get(offset)? else {
            return Ok(None);
        };
        Ok(decode(guard.value()))
    }

    /// Load every stored vector in offset order.
    pub fn load_all(&self) -> Result<Vec<(u64, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            match decode(v.value()) {
                Some(vector) => result.push((k.value(), vector)),
                None => {
                    return Err(Error::Config(format!(
                        "corrupt embedding entry at offset {}",
                        k.value()
                    )));
                }
            }
        }
        Ok(result)
    }

    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    let header: [u8; HEADER_SIZE] = bytes.get(0..HEADER_SIZE)?.try_into().ok()?;
    let dimension = u32::from_le_bytes(header) as usize;
    let body = &bytes[HEADER_SIZE..];
    if body.len() != dimension * 4 {
        return None;
    }
    // Values are not guaranteed to be 4-byte aligned inside the page.
    Some(bytemuck::pod_collect_to_vec(body))
}

impl std::fmt::Debug for EmbeddingDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, EmbeddingDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = EmbeddingDb::open(&tmp.path().join("embeddings.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn store_and_load() {
        let (_tmp, db) = test_db();

        let vector: Vec<f32> = (0..4).map(|i| i as f32 * 0.1).collect();
        db.store(42, &vector).unwrap();

        assert_eq!(db.load(42).unwrap().unwrap(), vector);
    }

    #[test]
    fn load_missing_returns_none() {
        let (_tmp, db) = test_db();
        assert!(db.load(999).unwrap().is_none());
    }

    #[test]
    fn load_all_is_in_offset_order() {
        let (_tmp, db) = test_db();

        db.batch_store(&[
            (2, vec![5.0, 6.0]),
            (0, vec![1.0, 2.0]),
            (1, vec![3.0, 4.0]),
        ])
        .unwrap();

        let all = db.load_all().unwrap();
        let offsets: Vec<u64> = all.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert_eq!(all[1].1, vec![3.0, 4.0]);
        assert_eq!(db.len().unwrap(), 3);
    }

    #[test]
    fn overwrite_entry() {
        let (_tmp, db) = test_db();

        db.store(7, &[1.0, 2.0]).unwrap();
        db.store(7, &[3.0, 4.0, 5.0]).unwrap();

        assert_eq!(db.load(7).unwrap().unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn model_name_round_trips() {
        let (_tmp, db) = test_db();
        assert_eq!(db.model().unwrap(), None);
        db.set_model("ngram-v1").unwrap();
        assert_eq!(db.model().unwrap().as_deref(), Some("ngram-v1"));
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("embeddings.redb");

        {
            let db = EmbeddingDb::open(&path).unwrap();
            db.store(0, &[1.0, 2.0]).unwrap();
        }

        {
            let db = EmbeddingDb::open(&path).unwrap();
            assert_eq!(db.load(0).unwrap().unwrap(), vec![1.0, 2.0]);
        }
    }

    #[test]
    fn truncated_entries_are_rejected() {
        assert_eq!(decode(&[1, 0]), None);
        assert_eq!(decode(&[2, 0, 0, 0, 0, 0, 128, 63]), None);
        assert_eq!(decode(&[1, 0, 0, 0, 0, 0, 128, 63]), Some(vec![1.0]));
    }
}
