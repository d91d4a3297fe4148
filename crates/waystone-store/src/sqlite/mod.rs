// ABOUTME: SQLite-backed record store with no in-memory cache.
// ABOUTME: Each call opens and validates a connection, sweeps expired rows, runs its statements, and closes.

mod schema;

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use waystone_core::expiry::truncate_millis;
use waystone_core::{Clock, key};

use crate::contract::{ImportReport, MergeAction, RecordStore, prepare};
use crate::error::StoreError;

pub use schema::SqlRecord;

/// How long a connection waits on a locked database before giving up.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A record store over one table of a SQLite database. Holds only the path
/// and a clock; connections are scoped to a single call.
pub struct SqlStore<R: SqlRecord> {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: SqlRecord> SqlStore<R> {
    /// Open (or create) the database at `path` and ensure the table exists.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
            clock,
            _kind: PhantomData,
        };

        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(R::SCHEMA)?;
        tracing::info!("opened {} table in {}", R::TABLE, path.display());

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection and make sure it answers before use.
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        conn.busy_timeout(LIVENESS_TIMEOUT)?;
        register_key_folding(&conn)?;

        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Unavailable(format!("liveness probe failed: {}", e)))?;

        Ok(conn)
    }

    /// Run `op` on a validated connection after sweeping expired rows. The
    /// connection is dropped when this returns; failures are logged here.
    fn with_connection<T>(
        &self,
        operation: &str,
        op: impl FnOnce(&mut Connection, DateTime<Utc>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let now = truncate_millis(self.clock.now());
        let result = self.connect().and_then(|mut conn| {
            sweep::<R>(&conn, now)?;
            op(&mut conn, now)
        });

        if let Err(e) = &result {
            tracing::error!(
                "{} {} failed against {}: {}",
                R::KIND,
                operation,
                self.path.display(),
                e
            );
        }
        result
    }
}

/// Make SQL `lower()` fold exactly like the flat-file backend's keys, so
/// non-ASCII identifiers compare the same way in both.
fn register_key_folding(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let raw: Option<String> = ctx.get(0)?;
            Ok(raw.map(|s| key::normalize(&s)))
        },
    )
}

fn sweep<R: SqlRecord>(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    let Some(column) = R::EXPIRY_COLUMN else {
        return Ok(0);
    };

    let swept = conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} IS NOT NULL AND {} <= ?1",
            R::TABLE,
            column,
            column
        ),
        params![now.timestamp_millis()],
    )?;
    if swept > 0 {
        tracing::debug!("swept {} expired {} rows", swept, R::KIND);
    }
    Ok(swept)
}

fn key_predicate<R: SqlRecord>() -> String {
    R::KEY_COLUMNS
        .iter()
        .map(|column| format!("lower({}) = lower(?)", column))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_order<R: SqlRecord>() -> String {
    R::KEY_COLUMNS
        .iter()
        .map(|column| format!("lower({})", column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql<R: SqlRecord>() -> String {
    let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    )
}

fn update_sql<R: SqlRecord>() -> String {
    let assignments = R::COLUMNS
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {}",
        R::TABLE,
        assignments,
        key_predicate::<R>()
    )
}

fn delete_sql<R: SqlRecord>() -> String {
    format!("DELETE FROM {} WHERE {}", R::TABLE, key_predicate::<R>())
}

fn count_sql<R: SqlRecord>() -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        R::TABLE,
        key_predicate::<R>()
    )
}

/// Select rows matching `filter` that are still alive at `now`. Reads
/// re-check expiry even though a sweep just ran.
fn select_live<R: SqlRecord>(
    conn: &Connection,
    filter: &str,
    mut values: Vec<Value>,
    now: DateTime<Utc>,
    tail: &str,
) -> rusqlite::Result<Vec<R>> {
    let mut conditions = vec![filter.to_string()];
    if let Some(column) = R::EXPIRY_COLUMN {
        conditions.push(format!("({} IS NULL OR {} > ?)", column, column));
        values.push(Value::Integer(now.timestamp_millis()));
    }

    let sql = format!(
        "SELECT {} FROM {} WHERE {} {}",
        R::COLUMNS.join(", "),
        R::TABLE,
        conditions.join(" AND "),
        tail
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), R::from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Apply one incoming record in its own transaction: count existing rows
/// for the key, then insert, update, or leave them alone.
fn import_one<R: SqlRecord>(
    conn: &mut Connection,
    record: &R,
    overwrite: bool,
) -> rusqlite::Result<MergeAction> {
    let key_values = R::key_values(&record.key());
    let tx = conn.transaction()?;

    let existing: i64 = tx.query_row(
        &count_sql::<R>(),
        params_from_iter(key_values.iter()),
        |row| row.get(0),
    )?;

    let action = MergeAction::decide(existing > 0, overwrite);
    match action {
        MergeAction::Insert => {
            tx.execute(&insert_sql::<R>(), params_from_iter(record.values()))?;
        }
        MergeAction::Overwrite => {
            let mut values = record.values();
            values.extend(key_values);
            tx.execute(&update_sql::<R>(), params_from_iter(values))?;
        }
        MergeAction::Skip => {}
    }

    tx.commit()?;
    Ok(action)
}

impl<R: SqlRecord> RecordStore<R> for SqlStore<R> {
    fn clear(&mut self) -> Result<(), StoreError> {
        self.with_connection("clear", |conn, _| {
            conn.execute(&format!("DELETE FROM {}", R::TABLE), [])?;
            Ok(())
        })
    }

    fn get(&mut self, key: &R::Key) -> Result<Option<R>, StoreError> {
        self.with_connection("get", |conn, now| {
            for candidate in R::lookup_candidates(key) {
                let found = select_live::<R>(
                    conn,
                    &key_predicate::<R>(),
                    R::key_values(&candidate),
                    now,
                    "LIMIT 1",
                )?;
                if let Some(record) = found.into_iter().next() {
                    return Ok(Some(record));
                }
            }
            Ok(None)
        })
    }

    /// Delete-then-insert in one transaction, so the result is an overwrite
    /// regardless of how many case variants were stored before.
    fn add(&mut self, record: R) -> Result<(), StoreError> {
        let record = prepare(record)?;
        self.with_connection("add", |conn, _| {
            let tx = conn.transaction()?;
            tx.execute(
                &delete_sql::<R>(),
                params_from_iter(R::key_values(&record.key())),
            )?;
            tx.execute(&insert_sql::<R>(), params_from_iter(record.values()))?;
            tx.commit()?;
            Ok(())
        })
    }

    fn remove(&mut self, key: &R::Key) -> Result<usize, StoreError> {
        self.with_connection("remove", |conn, _| {
            let removed = conn.execute(&delete_sql::<R>(), params_from_iter(R::key_values(key)))?;
            Ok(removed)
        })
    }

    fn list(&mut self, scope: &R::Scope) -> Result<Vec<R>, StoreError> {
        self.with_connection("list", |conn, now| {
            let (filter, values) = R::scope_filter(scope);
            let order = format!("ORDER BY {}", key_order::<R>());
            Ok(select_live::<R>(conn, filter, values, now, &order)?)
        })
    }

    fn all(&mut self) -> Result<Vec<R>, StoreError> {
        self.with_connection("all", |conn, now| {
            let order = format!("ORDER BY {}", key_order::<R>());
            Ok(select_live::<R>(conn, "1 = 1", Vec::new(), now, &order)?)
        })
    }

    fn import_batch(
        &mut self,
        records: Vec<R>,
        overwrite: bool,
    ) -> Result<ImportReport, StoreError> {
        self.with_connection("import", |conn, now| {
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

                match import_one(conn, &record, overwrite) {
                    Ok(action) => report.record(action),
                    Err(e) => {
                        tracing::error!(
                            "failed to import {} {:?}: {}",
                            R::KIND,
                            record.key(),
                            e
                        );
                        report.failed += 1;
                    }
                }
            }

            tracing::info!(
                "imported {} records into {}: {}",
                R::KIND,
                self.path.display(),
                report
            );
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;
    use waystone_core::{
        CooldownRecord, InvitationRecord, InviteKey, InviteScope, LocationKey, LocationRecord,
        ManualClock, Normalized, WILDCARD_TARGET,
    };

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(start()))
    }

    fn db(dir: &TempDir) -> PathBuf {
        dir.path().join("waystone.db")
    }

    fn home(owner: &str, name: &str, x: f64) -> LocationRecord {
        LocationRecord::new(owner, name, "world", x, 64.0, x)
    }

    fn raw_count(path: &Path, table: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn add_then_get_round_trips_every_field() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<LocationRecord>::open(&db(&dir), clock()).unwrap();
        let base = home("Steve", "Base", 10.25).with_orientation(-12.5, 178.0);

        store.add(base.clone()).unwrap();

        assert_eq!(
            store.get(&LocationKey::new("steve", "BASE")).unwrap(),
            Some(base)
        );
    }

    #[test]
    fn add_overwrites_case_variants() {
        let dir = TempDir::new().unwrap();
        let path = db(&dir);
        let mut store = SqlStore::<LocationRecord>::open(&path, clock()).unwrap();

        store.add(home("Steve", "home", 0.0)).unwrap();
        store.add(home("steve", "HOME", 10.0)).unwrap();

        assert_eq!(raw_count(&path, "homes"), 1);
        let found = store.get(&LocationKey::new("Steve", "Home")).unwrap().unwrap();
        assert_eq!(found.x, 10.0);
        assert_eq!(found.owner, "steve");
    }

    #[test]
    fn non_ascii_keys_fold_like_the_file_backend() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<LocationRecord>::open(&db(&dir), clock()).unwrap();

        store.add(home("Jörg", "ÜBERSICHT", 1.0)).unwrap();

        assert!(
            store
                .get(&LocationKey::new("JÖRG", "übersicht"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn cooldown_expires_and_is_swept_from_the_table() {
        let dir = TempDir::new().unwrap();
        let path = db(&dir);
        let clock = clock();
        let mut store = SqlStore::<CooldownRecord>::open(&path, clock.clone()).unwrap();

        store
            .add(CooldownRecord::new("Steve", start() + Duration::seconds(30)))
            .unwrap();
        clock.advance(Duration::seconds(29));
        assert!(store.get(&Normalized::new("STEVE")).unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get(&Normalized::new("STEVE")).unwrap().is_none());
        assert_eq!(raw_count(&path, "cooldowns"), 0);
    }

    #[test]
    fn invites_list_both_directions() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<InvitationRecord>::open(&db(&dir), clock()).unwrap();

        store.add(InvitationRecord::new("Alex", "base", "Steve")).unwrap();
        store
            .add(InvitationRecord::new("Notch", "tower", WILDCARD_TARGET))
            .unwrap();
        store.add(InvitationRecord::new("Alex", "farm", "Notch")).unwrap();

        let to_steve = store
            .list(&InviteScope::ToTarget(Normalized::new("steve")))
            .unwrap();
        let homes: Vec<&str> = to_steve.iter().map(|i| i.home.as_str()).collect();
        assert_eq!(homes, vec!["base", "tower"]);

        let from_alex = store
            .list(&InviteScope::FromSource(Normalized::new("ALEX")))
            .unwrap();
        assert_eq!(from_alex.len(), 2);
    }

    #[test]
    fn get_prefers_direct_invite_over_wildcard() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<InvitationRecord>::open(&db(&dir), clock()).unwrap();

        store
            .add(InvitationRecord::new("Alex", "base", WILDCARD_TARGET).with_reason("everyone"))
            .unwrap();
        store
            .add(InvitationRecord::new("Alex", "base", "Steve").with_reason("just you"))
            .unwrap();

        let direct = store.get(&InviteKey::new("alex", "base", "steve")).unwrap();
        assert_eq!(direct.unwrap().reason.as_deref(), Some("just you"));

        let fallback = store.get(&InviteKey::new("alex", "base", "notch")).unwrap();
        assert_eq!(fallback.unwrap().reason.as_deref(), Some("everyone"));
    }

    #[test]
    fn import_without_overwrite_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<LocationRecord>::open(&db(&dir), clock()).unwrap();
        store.add(home("U", "home", 0.0)).unwrap();

        let report = store
            .import_batch(vec![home("u", "HOME", 99.0), home("V", "home", 5.0)], false)
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        let kept = store.get(&LocationKey::new("u", "home")).unwrap().unwrap();
        assert_eq!(kept.x, 0.0);
    }

    #[test]
    fn import_with_overwrite_replaces() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<LocationRecord>::open(&db(&dir), clock()).unwrap();
        store.add(home("U", "home", 0.0)).unwrap();

        let report = store.import_batch(vec![home("U", "home", 99.0)], true).unwrap();

        assert_eq!(report.overwritten, 1);
        let replaced = store.get(&LocationKey::new("u", "home")).unwrap().unwrap();
        assert_eq!((replaced.x, replaced.y, replaced.z), (99.0, 64.0, 99.0));
    }

    #[test]
    fn import_skips_already_expired_records() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<CooldownRecord>::open(&db(&dir), clock()).unwrap();

        let stale = CooldownRecord::new("Steve", start() - Duration::seconds(1));
        let report = store.import_batch(vec![stale], true).unwrap();

        assert_eq!(report.skipped, 1);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn remove_reports_deleted_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = SqlStore::<LocationRecord>::open(&db(&dir), clock()).unwrap();
        store.add(home("Steve", "Base", 0.0)).unwrap();

        assert_eq!(store.remove(&LocationKey::new("STEVE", "base")).unwrap(), 1);
        assert_eq!(store.remove(&LocationKey::new("STEVE", "base")).unwrap(), 0);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let path = db(&dir);
        let mut store = SqlStore::<LocationRecord>::open(&path, clock()).unwrap();
        store.add(home("Steve", "Base", 0.0)).unwrap();
        store.add(home("Alex", "Base", 0.0)).unwrap();

        store.clear().unwrap();

        assert_eq!(raw_count(&path, "homes"), 0);
    }

    #[test]
    fn three_kinds_share_one_database() {
        let dir = TempDir::new().unwrap();
        let path = db(&dir);
        let clock = clock();

        let mut homes = SqlStore::<LocationRecord>::open(&path, clock.clone()).unwrap();
        let mut invites = SqlStore::<InvitationRecord>::open(&path, clock.clone()).unwrap();
        let mut cooldowns = SqlStore::<CooldownRecord>::open(&path, clock.clone()).unwrap();

        homes.add(home("Steve", "Base", 0.0)).unwrap();
        invites.add(InvitationRecord::new("Steve", "Base", "Alex")).unwrap();
        cooldowns
            .add(CooldownRecord::new("Steve", start() + Duration::minutes(5)))
            .unwrap();

        assert_eq!(homes.all().unwrap().len(), 1);
        assert_eq!(invites.all().unwrap().len(), 1);
        assert_eq!(cooldowns.all().unwrap().len(), 1);
    }

    #[test]
    fn unreachable_database_is_reported_as_unavailable() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let mut store =
            SqlStore::<LocationRecord>::open(&data_dir.join("waystone.db"), clock()).unwrap();

        fs::remove_dir_all(&data_dir).unwrap();

        let err = store.list(&Normalized::new("steve")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
