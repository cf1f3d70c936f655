//! Storage error types.
//!
//! Used by history store implementations; the engine maps them to `TeboError::Storage`.

use thiserror::Error;

/// Errors that can occur when reading or writing update history.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Encode(e.to_string())
    }
}

impl From<StorageError> for tebo_core::TeboError {
    fn from(e: StorageError) -> Self {
        tebo_core::TeboError::Storage(e.to_string())
    }
}
