// ABOUTME: Store configuration loaded from environment variables.
// ABOUTME: Chooses the persistence backend and where its files live, once per process.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend {0:?}; expected \"file\" or \"sqlite\"")]
    UnknownBackend(String),
}

/// Which persistence implementation backs the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    File,
    Sqlite,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "flatfile" => Ok(Backend::File),
            "sqlite" | "sql" => Ok(Backend::Sqlite),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::File => f.write_str("file"),
            Backend::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Resolved store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub database: PathBuf,
}

impl StoreConfig {
    /// Settings rooted at `data_dir` with the default database location.
    pub fn new(backend: Backend, data_dir: PathBuf) -> Self {
        let database = data_dir.join("waystone.db");
        Self {
            backend,
            data_dir,
            database,
        }
    }

    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - WAYSTONE_BACKEND: "file" or "sqlite" (default: file)
    /// - WAYSTONE_DATA_DIR: directory for the flat files (default: ~/.waystone)
    /// - WAYSTONE_DATABASE: SQLite database path (default: <data dir>/waystone.db)
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("WAYSTONE_BACKEND") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => Backend::default(),
        };

        let data_dir = std::env::var("WAYSTONE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".waystone")
            });

        let mut config = Self::new(backend, data_dir);
        if let Ok(database) = std::env::var("WAYSTONE_DATABASE")
            && !database.is_empty()
        {
            config.database = PathBuf::from(database);
        }

        Ok(config)
    }

    /// The same locations with a different backend, used when migrating.
    pub fn with_backend(&self, backend: Backend) -> Self {
        Self {
            backend,
            ..self.clone()
        }
    }
}
