// ABOUTME: Defines InvitationRecord, permission for another player to visit a saved location.
// ABOUTME: Supports the wildcard target and optional expiry and reason fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expiry::truncate_millis;
use crate::key::Normalized;
use crate::record::Record;
use crate::validate::{self, InvalidRecord};

/// Target value meaning "any player".
pub const WILDCARD_TARGET: &str = "*";

/// An invitation from `source` to `target` to visit the location `home`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationRecord {
    pub source: String,
    pub home: String,
    pub target: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// (source, home, target), all case-folded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InviteKey {
    pub source: Normalized,
    pub home: Normalized,
    pub target: Normalized,
}

impl InviteKey {
    pub fn new(source: &str, home: &str, target: &str) -> Self {
        Self {
            source: Normalized::new(source),
            home: Normalized::new(home),
            target: Normalized::new(target),
        }
    }

    /// The same invitation addressed to everyone.
    pub fn to_wildcard(&self) -> Self {
        Self {
            source: self.source.clone(),
            home: self.home.clone(),
            target: Normalized::new(WILDCARD_TARGET),
        }
    }
}

/// Which side of an invitation `list` filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteScope {
    /// Invitations a player may use, including wildcard ones.
    ToTarget(Normalized),
    /// Invitations a player has handed out.
    FromSource(Normalized),
}

impl InvitationRecord {
    /// An open-ended invitation with no reason attached.
    pub fn new(source: &str, home: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            home: home.to_string(),
            target: target.to_string(),
            expires: None,
            reason: None,
        }
    }

    pub fn expiring_at(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(truncate_millis(expires));
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.target == WILDCARD_TARGET
    }
}

impl Record for InvitationRecord {
    type Key = InviteKey;
    type Scope = InviteScope;

    const KIND: &'static str = "invite";

    fn key(&self) -> InviteKey {
        InviteKey::new(&self.source, &self.home, &self.target)
    }

    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    fn in_scope(&self, scope: &InviteScope) -> bool {
        match scope {
            InviteScope::ToTarget(target) => {
                self.is_wildcard() || Normalized::new(&self.target) == *target
            }
            InviteScope::FromSource(source) => Normalized::new(&self.source) == *source,
        }
    }

    fn validate(&self) -> Result<(), InvalidRecord> {
        validate::leading("source", &self.source)?;
        validate::positional("home", &self.home)?;
        validate::positional("target", &self.target)?;
        match &self.reason {
            Some(reason) => validate::free_text("reason", reason),
            None => Ok(()),
        }
    }

    fn at_stored_precision(mut self) -> Self {
        self.expires = self.expires.map(truncate_millis);
        self
    }

    fn lookup_candidates(key: &InviteKey) -> Vec<InviteKey> {
        let wildcard = key.to_wildcard();
        if wildcard == *key {
            vec![wildcard]
        } else {
            vec![key.clone(), wildcard]
        }
    }
}
