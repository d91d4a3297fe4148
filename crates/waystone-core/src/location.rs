// ABOUTME: Defines LocationRecord, a named position a player has saved.
// ABOUTME: Names are unique per owner under case-insensitive comparison and never expire.

use serde::{Deserialize, Serialize};

use crate::key::Normalized;
use crate::record::Record;
use crate::validate::{self, InvalidRecord};

/// A saved location. Overwritten by a later save under the same
/// (owner, name) key; removed only explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub owner: String,
    pub name: String,
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pitch: f32,
    pub yaw: f32,
}

/// (owner, name), both case-folded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationKey {
    pub owner: Normalized,
    pub name: Normalized,
}

impl LocationKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: Normalized::new(owner),
            name: Normalized::new(name),
        }
    }
}

impl LocationRecord {
    /// Create a location facing straight ahead (pitch and yaw zero).
    pub fn new(owner: &str, name: &str, world: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            world: world.to_string(),
            x,
            y,
            z,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    pub fn with_orientation(mut self, pitch: f32, yaw: f32) -> Self {
        self.pitch = pitch;
        self.yaw = yaw;
        self
    }
}

impl Record for LocationRecord {
    type Key = LocationKey;
    type Scope = Normalized;

    const KIND: &'static str = "home";

    fn key(&self) -> LocationKey {
        LocationKey::new(&self.owner, &self.name)
    }

    fn in_scope(&self, owner: &Normalized) -> bool {
        Normalized::new(&self.owner) == *owner
    }

    fn validate(&self) -> Result<(), InvalidRecord> {
        validate::leading("owner", &self.owner)?;
        validate::positional("world", &self.world)?;
        validate::positional("name", &self.name)
    }
}
