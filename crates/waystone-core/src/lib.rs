// ABOUTME: Core library for waystone, containing record types, key normalization, and expiry policy.
// ABOUTME: This crate defines the shared data model every persistence backend stores.

pub mod cooldown;
pub mod expiry;
pub mod invite;
pub mod key;
pub mod location;
pub mod record;
pub mod validate;

pub use cooldown::{CooldownKey, CooldownRecord};
pub use expiry::{Clock, ManualClock, SystemClock, is_alive};
pub use invite::{InvitationRecord, InviteKey, InviteScope, WILDCARD_TARGET};
pub use key::Normalized;
pub use location::{LocationKey, LocationRecord};
pub use record::Record;
pub use validate::InvalidRecord;
