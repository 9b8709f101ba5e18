use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{dataset::DatasetRecord, error::Result};

const DATASETS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("datasets");

/// The persisted payload store: one row per dataset id, holding the full
/// serialized metadata record. Structured filters read these rows; the
/// full-text shadow lives in the tantivy index.
pub struct CatalogDb {
    db: Database,
}

impl CatalogDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure the table exists by opening it in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DATASETS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Insert-or-replace the payload row for a dataset, in one transaction.
    pub fn put(&self, id: &str, record: &DatasetRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DATASETS)?;
            table.insert(id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<DatasetRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DATASETS)?;
        match table.get(id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Remove a payload row. Removing an id that was never stored is a
    /// silent no-op; returns whether a row existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DATASETS)?;
            table.remove(id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_ids(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DATASETS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            result.push(k.value().to_string());
        }
        Ok(result)
    }

    /// Return every stored record in a single read transaction.
    pub fn list_all(&self) -> Result<Vec<DatasetRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DATASETS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DATASETS)?;
        Ok(table.len()?)
    }
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb").finish_non_exhaustive()
    }
}
