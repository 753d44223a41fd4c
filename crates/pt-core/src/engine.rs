//! Reconciliation between the session cache and the durable layer.
//!
//! The cache answers every query. The durable store is the tie-breaker shared
//! with other instances, and conflicts resolve to the larger total. When the
//! store is disabled, totals go to the local fallback file instead; when it is
//! enabled but failing, totals that could not be written are spilled there so
//! a later migration can recover them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cache::{SessionCache, SessionEnd};
use crate::identity::Identity;
use crate::store::DurableStore;

/// Outcome of reconciling a single identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The store held a larger total; the cache took it.
    Adopted { previous_ms: u64, total_ms: u64 },
    /// The cache held a larger total; it was written to the store.
    Pushed { total_ms: u64 },
    Unchanged,
    /// Store disabled, nothing to reconcile against.
    Skipped,
    /// The store could not be read or written.
    Failed,
}

/// Summary of a full-roster sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// False when the store was disabled or its roster could not be read.
    pub reachable: bool,
    pub examined: usize,
    pub adopted: usize,
    pub pushed: usize,
    pub failed: usize,
}

/// Summary of a local-to-store migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// False when the store was disabled and nothing was attempted.
    pub attempted: bool,
    pub migrated: usize,
    pub failed: usize,
}

impl MigrationReport {
    pub const fn is_success(&self) -> bool {
        self.attempted && self.failed == 0
    }
}

/// Combines cache and durable state and routes writes to the right backend.
pub struct ReconciliationEngine {
    cache: SessionCache,
    store: RwLock<Arc<dyn DurableStore>>,
    fallback: Arc<dyn DurableStore>,
}

impl ReconciliationEngine {
    /// `store` may be disabled; `fallback` is the local file and is always
    /// available for writes.
    pub fn new(
        cache: SessionCache,
        store: Arc<dyn DurableStore>,
        fallback: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            cache,
            store: RwLock::new(store),
            fallback,
        }
    }

    pub const fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// The currently installed store.
    pub fn store(&self) -> Arc<dyn DurableStore> {
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs a new store, returning the previous one.
    pub fn replace_store(&self, store: Arc<dyn DurableStore>) -> Arc<dyn DurableStore> {
        let mut slot = self.store.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(backend = %store.describe(), "durable store replaced");
        std::mem::replace(&mut *slot, store)
    }

    pub fn fallback(&self) -> &Arc<dyn DurableStore> {
        &self.fallback
    }

    pub fn is_store_enabled(&self) -> bool {
        self.store().is_enabled()
    }

    pub fn is_store_healthy(&self) -> bool {
        let store = self.store();
        store.is_enabled() && store.is_healthy()
    }

    /// Seeds the cache at startup.
    ///
    /// Reads the whole store when it is enabled, and the local file otherwise
    /// or when the store cannot be read. With a readable store, totals spilled
    /// to the local file by an earlier run are adopted too and pushed back.
    /// Returns the number of identities taken into the cache.
    pub fn load(&self) -> usize {
        let store = self.store();
        if store.is_enabled() {
            match store.bulk_read() {
                Ok(records) => {
                    let loaded = self.cache.absorb(&records);
                    tracing::info!(count = loaded, backend = %store.describe(), "loaded totals from store");
                    return loaded + self.recover_spilled(store.as_ref());
                }
                Err(err) => {
                    tracing::warn!(error = %err, backend = %store.describe(), "store unavailable at startup, loading local file");
                }
            }
        }

        match self.fallback.bulk_read() {
            Ok(records) => {
                let loaded = self.cache.absorb(&records);
                tracing::info!(count = loaded, file = %self.fallback.describe(), "loaded totals from local file");
                loaded
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read local file");
                0
            }
        }
    }

    /// Closes the session for `id` and persists the new total.
    ///
    /// The total, not the session delta, is merged into the store so a larger
    /// value written by another instance is never lowered.
    pub fn end_session(&self, id: Identity) -> Option<SessionEnd> {
        let end = self.cache.end_session(id)?;
        let store = self.store();
        if store.is_enabled() {
            if let Err(err) = store.merge(id, end.total_ms) {
                tracing::warn!(%id, total_ms = end.total_ms, error = %err, "failed to write session total to store");
                self.spill(&HashMap::from([(id, end.total_ms)]));
            }
        } else if let Err(err) = self.fallback.write(id, end.total_ms) {
            tracing::error!(%id, total_ms = end.total_ms, error = %err, "failed to write local file");
        }
        tracing::debug!(%id, elapsed_ms = end.elapsed_ms, total_ms = end.total_ms, "session ended");
        Some(end)
    }

    /// Compares the store's value for `id` with the cache and heals whichever
    /// side is behind.
    pub fn sync_player(&self, id: Identity) -> Reconciled {
        let store = self.store();
        if !store.is_enabled() {
            return Reconciled::Skipped;
        }
        match store.read(id) {
            Ok(stored) => self.reconcile(store.as_ref(), id, stored.unwrap_or(0)),
            Err(err) => {
                tracing::warn!(%id, error = %err, "failed to read total from store");
                Reconciled::Failed
            }
        }
    }

    /// Runs [`sync_player`](Self::sync_player) logic for every identity the
    /// store knows about, using one bulk read.
    pub fn full_sync(&self) -> SyncReport {
        let store = self.store();
        let mut report = SyncReport::default();
        if !store.is_enabled() {
            return report;
        }
        let records = match store.bulk_read() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read roster from store");
                return report;
            }
        };

        report.reachable = true;
        for (id, stored) in records {
            report.examined += 1;
            match self.reconcile(store.as_ref(), id, stored) {
                Reconciled::Adopted { .. } => report.adopted += 1,
                Reconciled::Pushed { .. } => report.pushed += 1,
                Reconciled::Failed => report.failed += 1,
                Reconciled::Unchanged | Reconciled::Skipped => {}
            }
        }
        tracing::info!(
            examined = report.examined,
            adopted = report.adopted,
            pushed = report.pushed,
            failed = report.failed,
            "store sync complete"
        );
        report
    }

    /// Folds every active session into its total and writes all totals to
    /// the enabled backend. Returns the number of sessions closed.
    pub fn shutdown(&self) -> usize {
        let closed = self.cache.flush_active();
        let totals = self.cache.all_totals();
        let store = self.store();

        if store.is_enabled() {
            match store.merge_all(&totals) {
                Ok(()) => {
                    tracing::info!(count = totals.len(), backend = %store.describe(), "saved all totals to store");
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to save totals to store");
                    self.spill(&totals);
                }
            }
        } else {
            match self.fallback.write_all(&totals) {
                Ok(()) => tracing::info!(count = totals.len(), "saved all totals to local file"),
                Err(err) => tracing::error!(error = %err, "failed to save totals to local file"),
            }
        }
        closed
    }

    /// Pushes the local file's records, combined with the cache, into the
    /// store. Keeps going past individual failures.
    pub fn migrate_local_to_store(&self) -> MigrationReport {
        let store = self.store();
        let mut report = MigrationReport::default();
        if !store.is_enabled() {
            tracing::warn!("durable store is not enabled, skipping migration");
            return report;
        }
        report.attempted = true;

        let mut records = match self.fallback.bulk_read() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read local file for migration");
                report.failed += 1;
                HashMap::new()
            }
        };
        for (id, total_ms) in self.cache.all_totals() {
            let entry = records.entry(id).or_insert(0);
            *entry = (*entry).max(total_ms);
        }

        for (id, total_ms) in records {
            match store.merge(id, total_ms) {
                Ok(()) => report.migrated += 1,
                Err(err) => {
                    tracing::warn!(%id, error = %err, "failed to migrate record");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(migrated = report.migrated, failed = report.failed, "migration finished");
        report
    }

    fn reconcile(&self, store: &dyn DurableStore, id: Identity, stored: u64) -> Reconciled {
        let local = self.cache.stored_total(id);
        match stored.cmp(&local) {
            Ordering::Greater => {
                self.cache.adopt(id, stored);
                tracing::info!(%id, store_ms = stored, local_ms = local, "adopted larger total from store");
                Reconciled::Adopted {
                    previous_ms: local,
                    total_ms: stored,
                }
            }
            Ordering::Less => match store.merge(id, local) {
                Ok(()) => {
                    tracing::info!(%id, store_ms = stored, local_ms = local, "pushed larger local total to store");
                    Reconciled::Pushed { total_ms: local }
                }
                Err(err) => {
                    tracing::warn!(%id, error = %err, "failed to push total to store");
                    Reconciled::Failed
                }
            },
            Ordering::Equal => Reconciled::Unchanged,
        }
    }

    /// Adopts local-file totals that exceed the store's and merges them back.
    fn recover_spilled(&self, store: &dyn DurableStore) -> usize {
        let local = match self.fallback.bulk_read() {
            Ok(local) => local,
            Err(err) => {
                tracing::warn!(error = %err, file = %self.fallback.describe(), "failed to read local file");
                return 0;
            }
        };
        let raised: HashMap<Identity, u64> = local
            .into_iter()
            .filter(|(id, total_ms)| self.cache.adopt(*id, *total_ms))
            .collect();
        if raised.is_empty() {
            return 0;
        }

        match store.merge_all(&raised) {
            Ok(()) => tracing::info!(count = raised.len(), "recovered spilled totals into store"),
            Err(err) => {
                tracing::warn!(count = raised.len(), error = %err, "recovered spilled totals, store push deferred");
            }
        }
        raised.len()
    }

    fn spill(&self, totals: &HashMap<Identity, u64>) {
        match self.fallback.merge_all(totals) {
            Ok(()) => tracing::info!(count = totals.len(), "kept totals in local file until the store recovers"),
            Err(err) => tracing::error!(error = %err, "failed to spill totals to local file"),
        }
    }
}
