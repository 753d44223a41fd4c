//! Application context.
//!
//! Built once at startup from [`Config`] and handed by reference to whatever
//! drives the tracker (the CLI commands, or a host delivering connect and
//! disconnect events).

use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use pt_core::{
    Clock, DurableStore, MigrationReport, ReconciliationEngine, SessionCache, SystemClock,
    Tracker,
};
use pt_db::{FileStore, SqlOptions, SqlStore, StoreBackend, StoreKind};

use crate::Config;

/// Everything the tracker needs, constructed up front.
pub struct AppContext {
    config: Mutex<Config>,
    tracker: Tracker,
}

/// Snapshot for the status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub store_enabled: bool,
    pub store_healthy: bool,
    pub backend: String,
    pub local_file: String,
    pub known_identities: usize,
    pub active_sessions: usize,
}

/// What a configuration reload changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub store_replaced: bool,
    /// Present when the reload enabled a previously disabled store.
    pub migration: Option<MigrationReport>,
}

impl AppContext {
    /// Starts with the system clock.
    pub fn start(config: Config) -> Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Opens the local fallback file and the configured store, then seeds the
    /// cache.
    ///
    /// Fails if the local file cannot be created or read. An unreachable
    /// relational database is not fatal; it is retried on use.
    pub fn start_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;
        let local_path = config.local_file_path();
        let fallback = FileStore::open(&local_path)
            .with_context(|| format!("failed to open {}", local_path.display()))?;
        let store = open_backend(&config)?;
        tracing::info!(backend = %store.describe(), local_file = %local_path.display(), "starting tracker");

        let engine = ReconciliationEngine::new(
            SessionCache::new(clock),
            Arc::new(store),
            Arc::new(fallback),
        );
        let tracker = Tracker::start(engine, config.format);
        Ok(Self {
            config: Mutex::new(config),
            tracker,
        })
    }

    pub const fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn config(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> StatusReport {
        let engine = self.tracker.engine();
        StatusReport {
            store_enabled: self.tracker.is_store_enabled(),
            store_healthy: self.tracker.is_store_healthy(),
            backend: engine.store().describe(),
            local_file: self.config().local_file_path().display().to_string(),
            known_identities: engine.cache().len(),
            active_sessions: engine.cache().active_count(),
        }
    }

    /// Applies a new configuration.
    ///
    /// Nothing is applied when the new backend cannot be built. Otherwise
    /// format flags always take effect, and a changed `[store]` table installs a
    /// new backend; if that enables a previously disabled store, local data is
    /// migrated into it. `data_dir` is fixed for the life of the context.
    pub fn reload(&self, new_config: Config) -> Result<ReloadOutcome> {
        let mut current = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        let mut outcome = ReloadOutcome::default();

        if new_config.data_dir != current.data_dir {
            tracing::warn!(
                current = %current.data_dir.display(),
                requested = %new_config.data_dir.display(),
                "data_dir cannot change while running, keeping current"
            );
        }

        if new_config.store != current.store {
            let mut effective = new_config.clone();
            effective.data_dir.clone_from(&current.data_dir);
            let backend = open_backend(&effective)?;
            let newly_enabled = !current.store.enabled && effective.store.enabled;
            self.tracker.engine().replace_store(Arc::new(backend));
            outcome.store_replaced = true;

            if newly_enabled {
                outcome.migration = Some(self.tracker.migrate_local_to_store());
            }
        }

        self.tracker.set_format_options(new_config.format);
        let data_dir = current.data_dir.clone();
        *current = new_config;
        current.data_dir = data_dir;
        tracing::info!(?outcome, "configuration reloaded");
        Ok(outcome)
    }

    /// Flushes every session and total. Call once, when the host stops.
    pub fn shutdown(&self) -> usize {
        self.tracker.shutdown()
    }
}

/// Builds the durable store selected by `config`.
pub fn open_backend(config: &Config) -> Result<StoreBackend> {
    if !config.store.enabled {
        return Ok(StoreBackend::Disabled);
    }
    match config.store.kind {
        StoreKind::File => {
            let path = config.store_document_path();
            let store = FileStore::open(&path)
                .with_context(|| format!("failed to open store file {}", path.display()))?;
            Ok(StoreBackend::File(store))
        }
        StoreKind::Relational => {
            let database = config.store_database_path();
            let options = SqlOptions {
                label: format!(
                    "{}@{}:{}/{}",
                    config.store.username,
                    config.store.host,
                    config.store.port,
                    database.display()
                ),
                database,
                table: config.store.table.clone(),
                timeout: Duration::from_millis(config.store.timeout_ms),
            };
            let store = SqlStore::open(options).context("invalid relational store settings")?;
            Ok(StoreBackend::Relational(store))
        }
    }
}
