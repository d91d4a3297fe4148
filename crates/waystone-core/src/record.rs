// ABOUTME: The Record trait shared by every record kind a store can hold.
// ABOUTME: Describes a kind's normalized key, list scope, lookup rules, and optional expiry.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::expiry;
use crate::validate::InvalidRecord;

/// A value a record store can persist. Each kind supplies its own key shape
/// and the partial key (`Scope`) that `list` filters by.
pub trait Record: Clone + Debug + Send + 'static {
    /// Canonical, case-insensitive composite key. At most one live record
    /// per key exists in a store.
    type Key: Clone + Ord + Debug;

    /// Partial key used to list related records.
    type Scope: Debug;

    /// Short name used in log lines, e.g. "home".
    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    /// Moment this record stops being visible. `None` never expires.
    fn expiry(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn in_scope(&self, scope: &Self::Scope) -> bool;

    /// Reject values that a backend could not store and read back unchanged.
    fn validate(&self) -> Result<(), InvalidRecord>;

    /// The record as backends persist it, with timestamps cut to whole
    /// milliseconds.
    fn at_stored_precision(self) -> Self {
        self
    }

    /// Keys a `get` probes, in preference order. Most kinds look up only the
    /// exact key; invitations fall back to a wildcard-addressed row.
    fn lookup_candidates(key: &Self::Key) -> Vec<Self::Key> {
        vec![key.clone()]
    }

    fn is_alive(&self, now: DateTime<Utc>) -> bool {
        expiry::is_alive(self.expiry(), now)
    }
}
