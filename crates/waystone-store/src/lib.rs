// ABOUTME: Persistence layer for waystone, storing locations, invitations, and cooldowns.
// ABOUTME: Provides the record store contract with interchangeable flat-file and SQLite backends.

pub mod config;
pub mod contract;
pub mod error;
pub mod file;
pub mod sqlite;
pub mod stores;

pub use config::{Backend, ConfigError, StoreConfig};
pub use contract::{ImportReport, MergeAction, RecordStore};
pub use error::{Degrade, StoreError};
pub use file::{FileStore, LineError, LineRecord};
pub use sqlite::{SqlRecord, SqlStore};
pub use stores::Stores;
