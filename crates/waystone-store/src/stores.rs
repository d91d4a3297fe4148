// ABOUTME: Opens the location, invitation, and cooldown stores for the configured backend.
// ABOUTME: The backend is chosen once here and stays fixed for the life of the Stores value.

use std::sync::Arc;

use waystone_core::{Clock, CooldownRecord, InvitationRecord, LocationRecord};

use crate::config::{Backend, StoreConfig};
use crate::contract::RecordStore;
use crate::error::StoreError;
use crate::file::FileStore;
use crate::sqlite::SqlStore;

pub type BoxedStore<R> = Box<dyn RecordStore<R> + Send>;

/// One store per record kind, all on the same backend.
pub struct Stores {
    pub backend: Backend,
    pub homes: BoxedStore<LocationRecord>,
    pub invites: BoxedStore<InvitationRecord>,
    pub cooldowns: BoxedStore<CooldownRecord>,
}

impl Stores {
    pub fn open(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        tracing::info!("opening {} stores", config.backend);

        let stores = match config.backend {
            Backend::File => Self {
                backend: Backend::File,
                homes: Box::new(FileStore::<LocationRecord>::open_in(
                    &config.data_dir,
                    clock.clone(),
                )?),
                invites: Box::new(FileStore::<InvitationRecord>::open_in(
                    &config.data_dir,
                    clock.clone(),
                )?),
                cooldowns: Box::new(FileStore::<CooldownRecord>::open_in(&config.data_dir, clock)?),
            },
            Backend::Sqlite => Self {
                backend: Backend::Sqlite,
                homes: Box::new(SqlStore::<LocationRecord>::open(
                    &config.database,
                    clock.clone(),
                )?),
                invites: Box::new(SqlStore::<InvitationRecord>::open(
                    &config.database,
                    clock.clone(),
                )?),
                cooldowns: Box::new(SqlStore::<CooldownRecord>::open(&config.database, clock)?),
            },
        };

        Ok(stores)
    }
}
