// ABOUTME: Defines CooldownRecord, the moment a player may act again.
// ABOUTME: One cooldown per player; it disappears once its expiry passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expiry::truncate_millis;
use crate::key::Normalized;
use crate::record::Record;
use crate::validate::{self, InvalidRecord};

/// A per-player action cooldown. The expiry is mandatory and stored at
/// millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub player: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiry: DateTime<Utc>,
}

pub type CooldownKey = Normalized;

impl CooldownRecord {
    pub fn new(player: &str, expiry: DateTime<Utc>) -> Self {
        Self {
            player: player.to_string(),
            expiry: truncate_millis(expiry),
        }
    }
}

impl Record for CooldownRecord {
    type Key = CooldownKey;
    type Scope = Normalized;

    const KIND: &'static str = "cooldown";

    fn key(&self) -> CooldownKey {
        Normalized::new(&self.player)
    }

    fn expiry(&self) -> Option<DateTime<Utc>> {
        Some(self.expiry)
    }

    fn in_scope(&self, player: &Normalized) -> bool {
        self.key() == *player
    }

    fn validate(&self) -> Result<(), InvalidRecord> {
        validate::leading("player", &self.player)
    }

    fn at_stored_precision(mut self) -> Self {
        self.expiry = truncate_millis(self.expiry);
        self
    }
}
