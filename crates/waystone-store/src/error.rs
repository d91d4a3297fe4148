// ABOUTME: Error type shared by every record store backend.
// ABOUTME: Separates "backend failed" from "not found", which stores report as Ok(None) or empty lists.

use thiserror::Error;
use waystone_core::InvalidRecord;

/// Errors a record store operation can fail with. An absent record is never
/// an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid {kind}: {source}")]
    InvalidRecord {
        kind: &'static str,
        source: InvalidRecord,
    },
}

/// Opt-in degraded behavior for callers that treat a failing backend like an
/// empty one: the error is logged and the default value returned.
pub trait Degrade<T> {
    fn or_degraded(self, operation: &str) -> T;
}

impl<T: Default> Degrade<T> for Result<T, StoreError> {
    fn or_degraded(self, operation: &str) -> T {
        self.unwrap_or_else(|e| {
            tracing::error!("{} failed, continuing with an empty result: {}", operation, e);
            T::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_passes_values_through() {
        let ok: Result<Vec<u32>, StoreError> = Ok(vec![1, 2]);
        assert_eq!(ok.or_degraded("list"), vec![1, 2]);
    }

    #[test]
    fn degrade_turns_failures_into_defaults() {
        let failed: Result<Option<u32>, StoreError> =
            Err(StoreError::Unavailable("connection refused".to_string()));
        assert_eq!(failed.or_degraded("get"), None);

        let failed: Result<(), StoreError> =
            Err(StoreError::Io(std::io::Error::other("disk full")));
        failed.or_degraded("add");
    }
}
