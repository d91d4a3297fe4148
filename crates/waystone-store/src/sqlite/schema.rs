// ABOUTME: Table layout and row mapping for each record kind in the SQLite backend.
// ABOUTME: Timestamps are INTEGER epoch milliseconds; key columns are compared through lower().

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::{Type, Value};
use waystone_core::{
    CooldownKey, CooldownRecord, InvitationRecord, InviteKey, InviteScope, LocationKey,
    LocationRecord, Normalized, Record,
};

/// A record kind the SQLite backend knows how to store. `COLUMNS` fixes the
/// order of `values()` and of the columns `from_row` reads.
pub trait SqlRecord: Record {
    const TABLE: &'static str;

    /// Idempotent DDL run when a store is opened.
    const SCHEMA: &'static str;

    const COLUMNS: &'static [&'static str];

    /// Columns forming the key, in the same order as `key_values`.
    const KEY_COLUMNS: &'static [&'static str];

    /// Nullable INTEGER column holding the expiry, if the kind expires.
    const EXPIRY_COLUMN: Option<&'static str> = None;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn values(&self) -> Vec<Value>;

    fn key_values(key: &Self::Key) -> Vec<Value>;

    /// WHERE fragment with `?` placeholders selecting the scope, plus its values.
    fn scope_filter(scope: &Self::Scope) -> (&'static str, Vec<Value>);
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn normalized(value: &Normalized) -> Value {
    text(value.as_str())
}

fn millis(t: DateTime<Utc>) -> Value {
    Value::Integer(t.timestamp_millis())
}

fn datetime(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {}", millis).into(),
        )
    })
}

impl SqlRecord for LocationRecord {
    const TABLE: &'static str = "homes";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS homes (
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            world TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            z REAL NOT NULL,
            pitch REAL NOT NULL,
            yaw REAL NOT NULL
        );";
    const COLUMNS: &'static [&'static str] =
        &["owner", "name", "world", "x", "y", "z", "pitch", "yaw"];
    const KEY_COLUMNS: &'static [&'static str] = &["owner", "name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LocationRecord {
            owner: row.get(0)?,
            name: row.get(1)?,
            world: row.get(2)?,
            x: row.get(3)?,
            y: row.get(4)?,
            z: row.get(5)?,
            pitch: row.get::<_, f64>(6)? as f32,
            yaw: row.get::<_, f64>(7)? as f32,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.owner),
            text(&self.name),
            text(&self.world),
            Value::Real(self.x),
            Value::Real(self.y),
            Value::Real(self.z),
            Value::Real(f64::from(self.pitch)),
            Value::Real(f64::from(self.yaw)),
        ]
    }

    fn key_values(key: &LocationKey) -> Vec<Value> {
        vec![normalized(&key.owner), normalized(&key.name)]
    }

    fn scope_filter(owner: &Normalized) -> (&'static str, Vec<Value>) {
        ("lower(owner) = lower(?)", vec![normalized(owner)])
    }
}

impl SqlRecord for InvitationRecord {
    const TABLE: &'static str = "invites";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS invites (
            source TEXT NOT NULL,
            home TEXT NOT NULL,
            target TEXT NOT NULL,
            expires INTEGER,
            reason TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_invites_expires ON invites(expires);";
    const COLUMNS: &'static [&'static str] = &["source", "home", "target", "expires", "reason"];
    const KEY_COLUMNS: &'static [&'static str] = &["source", "home", "target"];
    const EXPIRY_COLUMN: Option<&'static str> = Some("expires");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let expires = match row.get::<_, Option<i64>>(3)? {
            Some(ms) => Some(datetime(3, ms)?),
            None => None,
        };

        Ok(InvitationRecord {
            source: row.get(0)?,
            home: row.get(1)?,
            target: row.get(2)?,
            expires,
            reason: row.get(4)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.source),
            text(&self.home),
            text(&self.target),
            self.expires.map_or(Value::Null, millis),
            self.reason.as_deref().map_or(Value::Null, text),
        ]
    }

    fn key_values(key: &InviteKey) -> Vec<Value> {
        vec![
            normalized(&key.source),
            normalized(&key.home),
            normalized(&key.target),
        ]
    }

    fn scope_filter(scope: &InviteScope) -> (&'static str, Vec<Value>) {
        match scope {
            InviteScope::ToTarget(target) => (
                "(target = '*' OR lower(target) = lower(?))",
                vec![normalized(target)],
            ),
            InviteScope::FromSource(source) => {
                ("lower(source) = lower(?)", vec![normalized(source)])
            }
        }
    }
}

impl SqlRecord for CooldownRecord {
    const TABLE: &'static str = "cooldowns";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS cooldowns (
            player TEXT NOT NULL,
            expiry INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cooldowns_expiry ON cooldowns(expiry);";
    const COLUMNS: &'static [&'static str] = &["player", "expiry"];
    const KEY_COLUMNS: &'static [&'static str] = &["player"];
    const EXPIRY_COLUMN: Option<&'static str> = Some("expiry");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CooldownRecord {
            player: row.get(0)?,
            expiry: datetime(1, row.get(1)?)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![text(&self.player), millis(self.expiry)]
    }

    fn key_values(player: &CooldownKey) -> Vec<Value> {
        vec![normalized(player)]
    }

    fn scope_filter(player: &Normalized) -> (&'static str, Vec<Value>) {
        ("lower(player) = lower(?)", vec![normalized(player)])
    }
}
