// ABOUTME: Flat-file record store that keeps the whole table in memory.
// ABOUTME: Every mutation rewrites the file atomically via temp file, fsync, and rename.

mod format;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use waystone_core::Clock;
use waystone_core::expiry::truncate_millis;

use crate::contract::{ImportReport, MergeAction, RecordStore, prepare};
use crate::error::StoreError;

pub use format::{DELIMITER, LineError, LineRecord};

/// A record store backed by one text file. The in-memory table is
/// authoritative; the file is a snapshot rewritten after each change.
pub struct FileStore<R: LineRecord> {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    table: BTreeMap<R::Key, R>,
}

impl<R: LineRecord> FileStore<R> {
    /// Open the store file at `path`, loading it if present. A missing file
    /// is an empty store and is written out immediately.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut store = Self {
            path: path.to_path_buf(),
            clock,
            table: BTreeMap::new(),
        };

        if path.exists() {
            store.load()?;
        } else {
            tracing::info!("no {} file at {}, starting empty", R::KIND, path.display());
            store.persist()?;
        }

        Ok(store)
    }

    /// Open the kind's default file (`R::FILE_NAME`) inside `dir`.
    pub fn open_in(dir: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::open(&dir.join(R::FILE_NAME), clock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn now(&self) -> DateTime<Utc> {
        truncate_millis(self.clock.now())
    }

    /// Parse the file line by line. Comments and blank lines are ignored,
    /// malformed lines (including ones that are not UTF-8) are logged and
    /// skipped, the first of several lines sharing a key wins, and
    /// already-expired records are dropped.
    fn load(&mut self) -> Result<(), StoreError> {
        let contents = fs::read(&self.path)?;
        let now = self.now();
        let mut loaded = 0;
        let mut skipped = 0;

        for (index, raw) in contents.split(|byte| *byte == b'\n').enumerate() {
            let Ok(line) = std::str::from_utf8(raw) else {
                tracing::warn!(
                    "skipping malformed {} on line {} of {}: not valid UTF-8",
                    R::KIND,
                    index + 1,
                    self.path.display()
                );
                skipped += 1;
                continue;
            };
            let line = line.strip_suffix('\r').unwrap_or(line);

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let record = match R::parse_line(line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        "skipping malformed {} on line {} of {}: {}",
                        R::KIND,
                        index + 1,
                        self.path.display(),
                        e
                    );
                    skipped += 1;
                    continue;
                }
            };

            if !record.is_alive(now) {
                continue;
            }

            match self.table.entry(record.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    loaded += 1;
                }
                Entry::Occupied(_) => {
                    tracing::warn!(
                        "duplicate {} on line {} of {}, keeping the first",
                        R::KIND,
                        index + 1,
                        self.path.display()
                    );
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "loaded {} {} records from {} ({} skipped)",
            loaded,
            R::KIND,
            self.path.display(),
            skipped
        );
        Ok(())
    }

    /// Drop expired records from the in-memory table. Returns how many went.
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.table.len();
        self.table.retain(|_, record| record.is_alive(now));
        let swept = before - self.table.len();
        if swept > 0 {
            tracing::debug!("swept {} expired {} records", swept, R::KIND);
        }
        swept
    }

    fn live<'a>(&'a self, now: DateTime<Utc>) -> impl Iterator<Item = &'a R> + 'a {
        self.table.values().filter(move |record| record.is_alive(now))
    }

    /// Rewrite the file from the in-memory table. On failure the table stays
    /// authoritative and the file is stale until the next successful write.
    fn persist(&self) -> Result<(), StoreError> {
        self.write_snapshot().map_err(|e| {
            tracing::error!(
                "could not write {} file {}: {}",
                R::KIND,
                self.path.display(),
                e
            );
            StoreError::Io(e)
        })
    }

    fn write_snapshot(&self) -> std::io::Result<()> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for line in R::HEADER {
            writeln!(writer, "{}", line)?;
        }
        writeln!(writer)?;
        for record in self.table.values() {
            writeln!(writer, "{}", record.to_line())?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        // Best-effort: the rename already succeeded, so a failed directory
        // fsync leaves the data consistent.
        if let Some(parent) = self.path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

impl<R: LineRecord> RecordStore<R> for FileStore<R> {
    fn clear(&mut self) -> Result<(), StoreError> {
        self.table.clear();
        self.persist()
    }

    fn get(&mut self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let now = self.now();
        self.sweep(now);

        let found = R::lookup_candidates(key)
            .iter()
            .filter_map(|candidate| self.table.get(candidate))
            .find(|record| record.is_alive(now))
            .cloned();
        Ok(found)
    }

    fn add(&mut self, record: R) -> Result<(), StoreError> {
        let record = prepare(record)?;
        let now = self.now();
        self.sweep(now);
        self.table.insert(record.key(), record);
        self.persist()
    }

    fn remove(&mut self, key: &R::Key) -> Result<usize, StoreError> {
        let now = self.now();
        let swept = self.sweep(now);
        let removed = usize::from(self.table.remove(key).is_some());

        if removed > 0 || swept > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    fn list(&mut self, scope: &R::Scope) -> Result<Vec<R>, StoreError> {
        let now = self.now();
        self.sweep(now);
        Ok(self
            .live(now)
            .filter(|record| record.in_scope(scope))
            .cloned()
            .collect())
    }

    fn all(&mut self) -> Result<Vec<R>, StoreError> {
        let now = self.now();
        self.sweep(now);
        Ok(self.live(now).cloned().collect())
    }

    fn import_batch(
        &mut self,
        records: Vec<R>,
        overwrite: bool,
    ) -> Result<ImportReport, StoreError> {
        let now = self.now();
        let swept = self.sweep(now);
        let mut report = ImportReport::default();

        for record in records {
            let record = match prepare(record) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("rejecting imported {}: {}", R::KIND, e);
                    report.failed += 1;
                    continue;
                }
            };
            if !record.is_alive(now) {
                report.record(MergeAction::Skip);
                continue;
            }

            let key = record.key();
            let action = MergeAction::decide(self.table.contains_key(&key), overwrite);
            if action != MergeAction::Skip {
                self.table.insert(key, record);
            }
            report.record(action);
        }

        tracing::info!("imported {} records into {}: {}", R::KIND, self.path.display(), report);

        if report.inserted + report.overwritten > 0 || swept > 0 {
            self.persist()?;
        }
        Ok(report)
    }
}
