// ABOUTME: The record store contract every backend implements with identical semantics.
// ABOUTME: Also holds the shared import/merge policy and the per-batch import report.

use std::fmt;

use waystone_core::Record;

use crate::error::StoreError;

/// Operations a persistence backend offers for one record kind.
///
/// Expired records are swept lazily at the start of reads and writes and are
/// never returned. Keys compare case-insensitively. Methods take `&mut self`:
/// a store is used from one thread at a time, and hosts that share one across
/// threads wrap it in a `Mutex`.
pub trait RecordStore<R: Record> {
    /// Remove every record of this kind.
    fn clear(&mut self) -> Result<(), StoreError>;

    /// The live record matching `key`, or `None`.
    fn get(&mut self, key: &R::Key) -> Result<Option<R>, StoreError>;

    /// Insert, or fully replace the record sharing its normalized key.
    fn add(&mut self, record: R) -> Result<(), StoreError>;

    /// Delete whatever matches `key`. Returns how many records went away;
    /// zero is not an error.
    fn remove(&mut self, key: &R::Key) -> Result<usize, StoreError>;

    /// Live records associated with the partial key, ordered by key.
    fn list(&mut self, scope: &R::Scope) -> Result<Vec<R>, StoreError>;

    /// Every live record, ordered by key. Used by export and migration.
    fn all(&mut self) -> Result<Vec<R>, StoreError>;

    /// Merge an external collection. New keys are inserted; existing keys
    /// are replaced only when `overwrite` is set. Each record is applied on
    /// its own, so one failure does not stop the rest.
    fn import_batch(
        &mut self,
        records: Vec<R>,
        overwrite: bool,
    ) -> Result<ImportReport, StoreError>;

    fn count(&mut self, scope: &R::Scope) -> Result<usize, StoreError> {
        Ok(self.list(scope)?.len())
    }

    fn exists(&mut self, scope: &R::Scope) -> Result<bool, StoreError> {
        Ok(self.count(scope)? > 0)
    }
}

/// Check a record before it reaches a backend and bring its timestamps to
/// stored precision, so every backend accepts and returns the same values.
pub(crate) fn prepare<R: Record>(record: R) -> Result<R, StoreError> {
    record
        .validate()
        .map_err(|source| StoreError::InvalidRecord {
            kind: R::KIND,
            source,
        })?;
    Ok(record.at_stored_precision())
}

/// What an import does with one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Insert,
    Overwrite,
    Skip,
}

impl MergeAction {
    /// The merge rule both backends follow. `exists` must already exclude
    /// expired records.
    pub fn decide(exists: bool, overwrite: bool) -> Self {
        match (exists, overwrite) {
            (false, _) => MergeAction::Insert,
            (true, true) => MergeAction::Overwrite,
            (true, false) => MergeAction::Skip,
        }
    }
}

/// Outcome of an `import_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub overwritten: usize,
    /// Kept the existing record, or the incoming one had already expired.
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    pub fn record(&mut self, action: MergeAction) {
        match action {
            MergeAction::Insert => self.inserted += 1,
            MergeAction::Overwrite => self.overwritten += 1,
            MergeAction::Skip => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.overwritten + self.skipped + self.failed
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} overwritten, {} skipped, {} failed",
            self.inserted, self.overwritten, self.skipped, self.failed
        )
    }
}
