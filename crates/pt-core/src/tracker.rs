//! Lifecycle hooks and the outbound query surface.

use std::sync::{PoisonError, RwLock};

use crate::cache::SessionEnd;
use crate::engine::{MigrationReport, ReconciliationEngine, SyncReport};
use crate::format::{FormatOptions, format_duration};
use crate::identity::Identity;

/// Entry point for the host: connect/disconnect events, queries, shutdown.
///
/// None of these methods fail. Storage problems are logged by the engine and
/// the cache keeps answering.
pub struct Tracker {
    engine: ReconciliationEngine,
    format: RwLock<FormatOptions>,
}

impl Tracker {
    /// Wraps `engine` and seeds its cache from the durable layer.
    pub fn start(engine: ReconciliationEngine, format: FormatOptions) -> Self {
        engine.load();
        Self {
            engine,
            format: RwLock::new(format),
        }
    }

    pub const fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Opens a session and pulls in any larger total another instance wrote.
    pub fn on_connect(&self, id: Identity) {
        self.engine.cache().start_session(id);
        if self.engine.is_store_enabled() {
            self.engine.sync_player(id);
        }
        tracing::debug!(%id, "identity connected");
    }

    pub fn on_disconnect(&self, id: Identity) -> Option<SessionEnd> {
        let end = self.engine.end_session(id);
        if end.is_none() {
            tracing::debug!(%id, "disconnect without active session ignored");
        }
        end
    }

    /// Live total for `id`, reconciled with the store first when enabled.
    pub fn current_duration(&self, id: Identity) -> u64 {
        if self.engine.is_store_enabled() {
            self.engine.sync_player(id);
        }
        self.engine.cache().current_total(id)
    }

    pub fn formatted_duration(&self, id: Identity) -> String {
        self.format(self.current_duration(id))
    }

    /// Formats `duration_ms` with the configured unit flags.
    pub fn format(&self, duration_ms: u64) -> String {
        format_duration(duration_ms, &self.format_options())
    }

    pub fn format_options(&self) -> FormatOptions {
        *self.format.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_format_options(&self, options: FormatOptions) {
        *self.format.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub fn full_sync(&self) -> SyncReport {
        self.engine.full_sync()
    }

    pub fn migrate_local_to_store(&self) -> MigrationReport {
        self.engine.migrate_local_to_store()
    }

    pub fn is_store_enabled(&self) -> bool {
        self.engine.is_store_enabled()
    }

    pub fn is_store_healthy(&self) -> bool {
        self.engine.is_store_healthy()
    }

    /// Closes all active sessions and flushes every total.
    pub fn shutdown(&self) -> usize {
        let closed = self.engine.shutdown();
        tracing::info!(sessions_closed = closed, "tracker shut down");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::cache::SessionCache;
    use crate::clock::ManualClock;
    use crate::store::DurableStore;
    use crate::testing::MemoryStore;

    fn tracker(store: MemoryStore) -> (Tracker, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::new(0);
        let store = Arc::new(store);
        let engine = ReconciliationEngine::new(
            SessionCache::new(Arc::new(clock.clone())),
            Arc::clone(&store) as Arc<dyn DurableStore>,
            Arc::new(MemoryStore::default()),
        );
        (
            Tracker::start(engine, FormatOptions::default()),
            clock,
            store,
        )
    }

    #[test]
    fn connect_pulls_larger_store_total() {
        let id = Identity::random();
        let (tracker, clock, store) = tracker(MemoryStore::default());
        store.write(id, 60_000).unwrap();

        tracker.on_connect(id);
        clock.advance(5_000);

        assert_eq!(tracker.current_duration(id), 65_000);
        assert_eq!(tracker.formatted_duration(id), "1m 5s");
    }

    #[test]
    fn disconnect_without_connect_is_ignored() {
        let (tracker, _, store) = tracker(MemoryStore::default());
        assert!(tracker.on_disconnect(Identity::random()).is_none());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn query_survives_store_outage() {
        let id = Identity::random();
        let (tracker, clock, store) = tracker(MemoryStore::default());
        tracker.on_connect(id);
        clock.advance(3_000);
        store.set_failing(true);

        assert_eq!(tracker.current_duration(id), 3_000);
        assert_eq!(tracker.on_disconnect(id).unwrap().total_ms, 3_000);
        assert!(!tracker.is_store_healthy());
    }

    #[test]
    fn format_options_can_be_swapped() {
        let (tracker, _, _) = tracker(MemoryStore::default());
        tracker.set_format_options(FormatOptions {
            show_seconds: false,
            ..FormatOptions::default()
        });
        assert_eq!(tracker.format(61_000), "1m");
    }

    #[test]
    fn start_loads_existing_totals() {
        let id = Identity::random();
        let (tracker, _, _) = tracker(MemoryStore::with_records(&[(id, 42_000)]));
        assert_eq!(tracker.engine().cache().stored_total(id), 42_000);
        assert!(tracker.is_store_enabled());
    }
}
