use std::{
    path::Path,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use tantivy::IndexWriter;
use tracing::warn;

use crate::{
    catalog_db::CatalogDb,
    dataset::DatasetRecord,
    error::{Error, Result},
    search_index::SearchIndex,
};

/// Memory budget for the index writer (in bytes).
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Outcome of a bulk write: how many datasets were indexed, and per-item
/// error messages for the rest. Partial success is expected and reported,
/// never an abort.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub failures: Vec<(String, String)>,
}

/// The dataset catalog write path: keeps the payload store and the
/// full-text shadow index in step.
///
/// All index writes go through a single mutex-guarded writer, so two upserts
/// of the same id cannot interleave their delete/reinsert of the shadow row.
/// Reads need no coordination.
pub struct Catalog {
    db: CatalogDb,
    index: SearchIndex,
    writer: Mutex<IndexWriter>,
}

impl Catalog {
    pub fn open(db_path: &Path, index_dir: &Path) -> Result<Self> {
        let db = CatalogDb::open(db_path)?;
        let index = SearchIndex::open(index_dir)?;
        let writer = Mutex::new(index.writer(WRITER_MEMORY_BUDGET)?);
        Ok(Self { db, index, writer })
    }

    /// Catalog over an in-memory index (for testing).
    pub fn open_in_ram(db_path: &Path) -> Result<Self> {
        let db = CatalogDb::open(db_path)?;
        let index = SearchIndex::open_in_ram()?;
        let writer = Mutex::new(index.writer(WRITER_MEMORY_BUDGET)?);
        Ok(Self { db, index, writer })
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Insert or replace a dataset. Idempotent by id.
    ///
    /// The payload row is replaced in one transaction, then the shadow row
    /// is deleted and reinserted whole under the writer lock.
    pub fn upsert(&self, record: &DatasetRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::InvalidValue(
                "dataset id must not be empty".to_string(),
            ));
        }

        self.db.put(&record.id, record)?;

        let mut writer = self.lock_writer();
        self.index.add_document(&writer, record, now_secs())?;
        writer.commit()?;
        Ok(())
    }

    /// Remove a dataset's payload row and shadow row. Removing an id that
    /// was never indexed is a silent no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.db.remove(id)?;

        let mut writer = self.lock_writer();
        self.index.delete_document(&writer, id);
        writer.commit()?;
        Ok(())
    }

    /// Upsert a batch of datasets, one transaction each, so an interrupted
    /// batch leaves the catalog valid, just incomplete. Failures are
    /// collected per item and do not stop the batch.
    pub fn upsert_batch(&self, records: &[DatasetRecord]) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for record in records {
            match self.upsert(record) {
                Ok(()) => outcome.indexed += 1,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "failed to index dataset");
                    outcome.failures.push((record.id.clone(), e.to_string()));
                }
            }
        }
        outcome
    }

    /// Rebuild every shadow row from the payload store.
    pub fn reindex(&self) -> Result<BulkOutcome> {
        let records = self.db.list_all()?;
        Ok(self.upsert_batch(&records))
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, IndexWriter> {
        // A poisoned lock means a writer panicked mid-commit; the guarded
        // state is still the tantivy writer, which handles its own recovery.
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
