use thiserror::Error;

use boqtrack_core::store::StoreError;

pub mod memory;
pub mod sql;

pub use memory::InMemoryProcurementStore;
pub use sql::SqlProcurementStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("version conflict: {0}")]
    VersionConflict(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::Database(error))
                if error.is_unique_violation() =>
            {
                StoreError::Conflict(format!("unique constraint violated: {}", error.message()))
            }
            RepositoryError::VersionConflict(message) => StoreError::Conflict(message),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
