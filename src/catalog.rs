use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    prefix_index::{PrefixIndex, RecordId},
    records::RecordStore,
    settings::Settings,
};

const RECORDS: TableDefinition<u64, &str> = TableDefinition::new("records");
/// Prefix to ascending record ids, stored as u64 LE.
const POSTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("postings");
const FIELDS: TableDefinition<&str, ()> = TableDefinition::new("fields");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const SETTINGS_KEY: &str = "settings";

/// Counts reported by `sieve status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CatalogStats {
    pub records: u64,
    pub prefixes: u64,
    pub fields: u64,
}

/// Persistent form of a built index: records, postings, the field registry
/// and the settings it was built with.
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Write a complete catalog in one transaction.
    pub fn write(
        path: &Path,
        records: &RecordStore,
        index: &PrefixIndex,
        settings: &Settings,
    ) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS)?;
            for (id, record) in records.iter() {
                let text = serde_json::to_string(record)?;
                table.insert(id, text.as_str())?;
            }
        }
        {
            let mut table = txn.open_table(POSTINGS)?;
            for (prefix, ids) in index.iter() {
                table.insert(prefix, bytemuck::cast_slice::<u64, u8>(ids))?;
            }
        }
        {
            let mut table = txn.open_table(FIELDS)?;
            for field in index.field_paths() {
                table.insert(field, ())?;
            }
        }
        {
            let mut table = txn.open_table(SETTINGS)?;
            let text = serde_json::to_string(settings)?;
            table.insert(SETTINGS_KEY, text.as_str())?;
        }
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open an existing catalog without writing to it.
    ///
    /// Every table except the settings must be present.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound {
                kind: "catalog",
                name: path.display().to_string(),
            });
        }
        let db = Database::open(path)?;

        let txn = db.begin_read()?;
        require_table(&txn, RECORDS)?;
        require_table(&txn, POSTINGS)?;
        require_table(&txn, FIELDS)?;
        drop(txn);

        Ok(Self { db })
    }

    pub fn load_records(&self) -> Result<RecordStore> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let record: Value = serde_json::from_str(v.value())?;
            records.push((k.value(), record));
        }
        Ok(records.into_iter().collect())
    }

    pub fn load_index(&self) -> Result<PrefixIndex> {
        let txn = self.db.begin_read()?;

        let postings_table = txn.open_table(POSTINGS)?;
        let mut postings = Vec::new();
        for entry in postings_table.iter()? {
            let (k, v) = entry?;
            let bytes = v.value();
            if bytes.len() % size_of::<RecordId>() != 0 {
                return Err(Error::Config(format!(
                    "corrupt posting list for prefix '{}'",
                    k.value()
                )));
            }
            let ids: Vec<RecordId> = bytemuck::pod_collect_to_vec(bytes);
            postings.push((k.value().to_string(), ids));
        }

        Ok(PrefixIndex::from_parts(postings, self.field_paths()?))
    }

    /// Field paths from the registry, in lexicographic order.
    pub fn field_paths(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FIELDS)?;
        let mut fields = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            fields.push(k.value().to_string());
        }
        Ok(fields)
    }

    /// Settings stored at build time, or defaults when none were stored.
    pub fn load_settings(&self) -> Result<Settings> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(SETTINGS) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        match table.get(SETTINGS_KEY)? {
            Some(v) => Ok(serde_json::from_str(v.value())?),
            None => Ok(Settings::default()),
        }
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let txn = self.db.begin_read()?;
        Ok(CatalogStats {
            records: txn.open_table(RECORDS)?.len()?,
            prefixes: txn.open_table(POSTINGS)?.len()?,
            fields: txn.open_table(FIELDS)?.len()?,
        })
    }
}

fn require_table<K: redb::Key + 'static, V: redb::Value + 'static>(
    txn: &redb::ReadTransaction,
    table: TableDefinition<K, V>,
) -> Result<()> {
    match txn.open_table(table) {
        Ok(_) => Ok(()),
        Err(redb::TableError::TableDoesNotExist(name)) => Err(Error::NotFound {
            kind: "catalog table",
            name,
        }),
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::prefix_index::PrefixIndexBuilder;

    fn sample() -> (RecordStore, PrefixIndex) {
        let records = RecordStore::from_records(
            vec![
                json!({"type": "P", "name": "John Smith"}),
                json!({"type": "P", "aliases": ["Johnny"]}),
                json!("opaque line"),
            ],
            None,
        )
        .unwrap();
        let mut builder = PrefixIndexBuilder::new();
        for (id, record) in records.iter() {
            builder.add_record(id, record);
        }
        (records, builder.finish())
    }

    #[test]
    fn write_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.redb");
        let (records, index) = sample();
        let settings = Settings {
            wel: 35,
            ..Settings::default()
        };

        Catalog::write(&path, &records, &index, &settings).unwrap();

        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.load_records().unwrap(), records);
        assert_eq!(catalog.load_settings().unwrap(), settings);

        let loaded = catalog.load_index().unwrap();
        assert_eq!(loaded.all_prefixes(), index.all_prefixes());
        assert_eq!(loaded.lookup("type:p"), &[0, 1]);
        assert_eq!(
            loaded.field_paths().collect::<Vec<_>>(),
            index.field_paths().collect::<Vec<_>>()
        );
    }

    #[test]
    fn stats_count_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.redb");
        let (records, index) = sample();

        let catalog =
            Catalog::write(&path, &records, &index, &Settings::default()).unwrap();
        let stats = catalog.stats().unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.prefixes, index.len() as u64);
        assert_eq!(stats.fields, 3);
    }

    #[test]
    fn open_missing_catalog_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Catalog::open(&tmp.path().join("missing.redb")).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "catalog", .. }));
    }

    #[test]
    fn open_reports_a_missing_table() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("partial.redb");
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            txn.open_table(RECORDS).unwrap();
            txn.commit().unwrap();
        }

        let err = Catalog::open(&path).unwrap_err();
        assert!(
            matches!(&err, Error::NotFound { kind: "catalog table", name } if name == "postings"),
            "{err}"
        );
    }

    #[test]
    fn missing_settings_table_means_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.redb");
        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            txn.open_table(RECORDS).unwrap();
            txn.open_table(POSTINGS).unwrap();
            txn.open_table(FIELDS).unwrap();
            txn.commit().unwrap();
        }

        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.load_settings().unwrap(), Settings::default());
        assert_eq!(catalog.stats().unwrap().records, 0);
    }
}
