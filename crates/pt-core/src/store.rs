//! Durable store capability.
//!
//! A durable store survives process restarts and may be shared by several
//! process instances. Backends live in `pt-db`; the reconciliation core only
//! sees this trait.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::Identity;

/// Errors reported by durable store operations.
///
/// All of them are absorbed by the reconciliation engine; none reach the
/// connect/disconnect hooks.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is switched off in configuration.
    #[error("durable store is disabled")]
    Disabled,
    /// Connection could not be established or was lost.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A persisted key is not a valid identity.
    #[error("corrupt identity in store: {key:?}")]
    CorruptIdentity { key: String },
    /// A durable write did not complete.
    #[error("write failed for {id}: {message}")]
    WriteFailure { id: Identity, message: String },
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The backing document could not be parsed or encoded.
    #[error("invalid document {}: {message}", path.display())]
    Document { path: PathBuf, message: String },
}

/// Parses a persisted record key.
///
/// Backends skip records that fail here and log the returned error; one bad
/// key never fails a whole load.
pub fn parse_stored_key(key: &str) -> Result<Identity, StoreError> {
    key.parse().map_err(|_| StoreError::CorruptIdentity {
        key: key.to_string(),
    })
}

/// Persistence backend holding one accumulated duration per identity.
///
/// Implementations use interior mutability so a single instance can be shared
/// across event threads.
pub trait DurableStore: Send + Sync {
    /// Short human-readable description, used in logs and status output.
    fn describe(&self) -> String;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether the last operation (or connection attempt) succeeded.
    fn is_healthy(&self) -> bool;

    fn read(&self, id: Identity) -> Result<Option<u64>, StoreError>;

    /// Upserts `total_ms` for `id`, replacing any stored value.
    fn write(&self, id: Identity, total_ms: u64) -> Result<(), StoreError>;

    fn bulk_read(&self) -> Result<HashMap<Identity, u64>, StoreError>;

    /// Upserts so that the stored value becomes `max(stored, total_ms)`.
    fn merge(&self, id: Identity, total_ms: u64) -> Result<(), StoreError>;

    /// Replaces the stored value of every identity in `totals`.
    fn write_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        for (id, total_ms) in totals {
            self.write(*id, *total_ms)?;
        }
        Ok(())
    }

    /// Merges every identity in `totals`.
    fn merge_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        for (id, total_ms) in totals {
            self.merge(*id, *total_ms)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_key_parses_identity_text() {
        let id = parse_stored_key("00000000-0000-0000-0000-00000000002a").unwrap();
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-00000000002a");
    }

    #[test]
    fn bad_stored_key_is_corrupt_identity() {
        let err = parse_stored_key("player-one").unwrap_err();
        assert!(matches!(&err, StoreError::CorruptIdentity { key } if key == "player-one"));
        assert_eq!(err.to_string(), r#"corrupt identity in store: "player-one""#);
    }
}
