//! Backend selection.

use std::collections::HashMap;

use pt_core::{DurableStore, Identity, StoreError};
use serde::{Deserialize, Serialize};

use crate::file::FileStore;
use crate::sql::SqlStore;

/// Configured kind of durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    Relational,
}

/// The durable store chosen at startup.
///
/// `Disabled` reports itself as not enabled and rejects every operation; the
/// reconciliation engine then routes writes to the local fallback file.
pub enum StoreBackend {
    Disabled,
    File(FileStore),
    Relational(SqlStore),
}

impl StoreBackend {
    fn active(&self) -> Result<&dyn DurableStore, StoreError> {
        match self {
            Self::Disabled => Err(StoreError::Disabled),
            Self::File(store) => Ok(store),
            Self::Relational(store) => Ok(store),
        }
    }

    pub const fn kind(&self) -> Option<StoreKind> {
        match self {
            Self::Disabled => None,
            Self::File(_) => Some(StoreKind::File),
            Self::Relational(_) => Some(StoreKind::Relational),
        }
    }
}

impl DurableStore for StoreBackend {
    fn describe(&self) -> String {
        self.active()
            .map_or_else(|_| "disabled".to_string(), |store| store.describe())
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    fn is_healthy(&self) -> bool {
        self.active().is_ok_and(|store| store.is_healthy())
    }

    fn read(&self, id: Identity) -> Result<Option<u64>, StoreError> {
        self.active()?.read(id)
    }

    fn write(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.active()?.write(id, total_ms)
    }

    fn bulk_read(&self) -> Result<HashMap<Identity, u64>, StoreError> {
        self.active()?.bulk_read()
    }

    fn merge(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.active()?.merge(id, total_ms)
    }

    fn write_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        self.active()?.write_all(totals)
    }

    fn merge_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        self.active()?.merge_all(totals)
    }
}
