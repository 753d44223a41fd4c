//! Storage layer for the playtime tracker.
//!
//! Provides the durable backends behind [`pt_core::DurableStore`]:
//! - [`FileStore`]: one JSON document, single instance only
//! - [`SqlStore`]: a relational table via `rusqlite`, safe for several
//!   instances sharing one database thanks to server-side max upserts
//! - [`StoreBackend`]: the variant selected once from configuration
//!
//! # Thread Safety
//!
//! Both stores keep their handle behind a `Mutex`, so a single instance can be
//! shared across event threads through an `Arc`. Calls are blocking.

mod backend;
mod file;
mod sql;

use std::path::PathBuf;

use pt_core::{Identity, StoreError};
use thiserror::Error;

pub use backend::{StoreBackend, StoreKind};
pub use file::FileStore;
pub use sql::{DEFAULT_TABLE, SqlOptions, SqlStore};

/// Storage errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file store document is not valid JSON.
    #[error("invalid document {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Table names are spliced into SQL and must be plain identifiers.
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("not connected to {0}")]
    Disconnected(String),
}

impl DbError {
    /// Converts a failed write of `id` into the store-level error.
    pub(crate) fn into_write_failure(self, id: Identity) -> StoreError {
        StoreError::WriteFailure {
            id,
            message: self.to_string(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Io { path, source } => Self::Io { path, source },
            DbError::Json { path, source } => Self::Document {
                path,
                message: source.to_string(),
            },
            DbError::Sqlite(_) | DbError::InvalidTableName(_) | DbError::Disconnected(_) => {
                Self::Unavailable(err.to_string())
            }
        }
    }
}
