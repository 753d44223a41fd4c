//! Relational store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE <table> (
//!     uuid         CHAR(36) PRIMARY KEY,
//!     playtime_ms  BIGINT NOT NULL DEFAULT 0,
//!     last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
//! )
//! ```
//!
//! `last_updated` is set by every upsert. `merge` computes the maximum inside
//! the upsert statement, so concurrent writers never lower each other's totals.
//!
//! # Connection Health
//!
//! The connection is opened lazily. Any failed operation drops it and marks
//! the store unhealthy; the next operation reconnects. There is no background
//! retry loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use pt_core::{DurableStore, Identity, StoreError, parse_stored_key};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};

use crate::DbError;

pub const DEFAULT_TABLE: &str = "player_playtime";

/// Connection settings for [`SqlStore`].
#[derive(Debug, Clone)]
pub struct SqlOptions {
    /// Database file.
    pub database: PathBuf,
    pub table: String,
    /// How long a statement waits on a locked database before failing.
    pub timeout: Duration,
    /// Human-readable location used in logs (e.g. `host:port/database`).
    pub label: String,
}

/// Durations keyed by identity in a relational table.
pub struct SqlStore {
    options: SqlOptions,
    conn: Mutex<Option<Connection>>,
    healthy: AtomicBool,
}

impl SqlStore {
    /// Creates the store and attempts a first connection.
    ///
    /// An unreachable database is not an error here: the store starts
    /// unhealthy and reconnects on first use. Only an invalid table name is
    /// rejected.
    pub fn open(options: SqlOptions) -> Result<Self, DbError> {
        validate_table_name(&options.table)?;
        let store = Self {
            options,
            conn: Mutex::new(None),
            healthy: AtomicBool::new(false),
        };
        match store.connect() {
            Ok(conn) => {
                *store.conn.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn);
                store.healthy.store(true, Ordering::SeqCst);
                tracing::info!(database = %store.options.label, "connected to database");
            }
            Err(err) => {
                tracing::error!(database = %store.options.label, error = %err, "failed to connect to database");
            }
        }
        Ok(store)
    }

    pub const fn options(&self) -> &SqlOptions {
        &self.options
    }

    fn connect(&self) -> Result<Connection, DbError> {
        let conn = Connection::open(&self.options.database)?;
        conn.busy_timeout(self.options.timeout)?;
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS \"{table}\" (
                uuid CHAR(36) NOT NULL PRIMARY KEY,
                playtime_ms BIGINT NOT NULL DEFAULT 0,
                last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            ",
            table = self.options.table
        ))?;
        Ok(conn)
    }

    /// Runs `op` on the connection, reconnecting first if needed.
    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            match self.connect() {
                Ok(conn) => {
                    tracing::info!(database = %self.options.label, "reconnected to database");
                    *slot = Some(conn);
                }
                Err(err) => {
                    self.healthy.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
        let Some(conn) = slot.as_mut() else {
            return Err(DbError::Disconnected(self.options.label.clone()));
        };

        match op(conn) {
            Ok(value) => {
                self.healthy.store(true, Ordering::SeqCst);
                Ok(value)
            }
            Err(err) => {
                self.healthy.store(false, Ordering::SeqCst);
                *slot = None;
                Err(err)
            }
        }
    }

    fn upsert_sql(&self, merge: bool) -> String {
        let value = if merge {
            "MAX(playtime_ms, excluded.playtime_ms)"
        } else {
            "excluded.playtime_ms"
        };
        format!(
            "
            INSERT INTO \"{table}\" (uuid, playtime_ms, last_updated)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(uuid) DO UPDATE SET
                playtime_ms = {value},
                last_updated = excluded.last_updated
            ",
            table = self.options.table
        )
    }

    fn upsert(&self, id: Identity, total_ms: u64, merge: bool) -> Result<(), DbError> {
        let sql = self.upsert_sql(merge);
        self.with_conn(|conn| {
            conn.execute(&sql, params![id.to_string(), to_sql_ms(total_ms), now_timestamp()])?;
            Ok(())
        })
    }

    fn upsert_all(&self, totals: &HashMap<Identity, u64>, merge: bool) -> Result<(), DbError> {
        if totals.is_empty() {
            return Ok(());
        }
        let sql = self.upsert_sql(merge);
        let updated_at = now_timestamp();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (id, total_ms) in totals {
                    stmt.execute(params![id.to_string(), to_sql_ms(*total_ms), updated_at])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

impl SqlStore {
    /// Converts a `playtime_ms` cell, skipping values that are not integers.
    fn stored_ms(&self, key: &str, value: Value) -> Option<u64> {
        match value {
            Value::Integer(total) => Some(from_sql_ms(total)),
            other => {
                tracing::warn!(
                    key = %key,
                    table = %self.options.table,
                    value = ?other,
                    "skipping row with invalid duration"
                );
                None
            }
        }
    }
}

impl DurableStore for SqlStore {
    fn describe(&self) -> String {
        format!("relational {} (table {})", self.options.label, self.options.table)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn read(&self, id: Identity) -> Result<Option<u64>, StoreError> {
        let sql = format!(
            "SELECT playtime_ms FROM \"{}\" WHERE uuid = ?1",
            self.options.table
        );
        let value = self.with_conn(|conn| {
            let value: Option<Value> = conn
                .query_row(&sql, [id.to_string()], |row| row.get(0))
                .optional()?;
            Ok(value)
        })?;
        Ok(value.and_then(|value| self.stored_ms(&id.to_string(), value)))
    }

    fn write(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.upsert(id, total_ms, false)
            .map_err(|err| err.into_write_failure(id))
    }

    fn bulk_read(&self) -> Result<HashMap<Identity, u64>, StoreError> {
        let sql = format!("SELECT uuid, playtime_ms FROM \"{}\"", self.options.table);
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let uuid: String = row.get(0)?;
                let total: Value = row.get(1)?;
                Ok((uuid, total))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut records = HashMap::with_capacity(rows.len());
        for (key, total) in rows {
            let id = match parse_stored_key(&key) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(table = %self.options.table, error = %err, "skipping row");
                    continue;
                }
            };
            let Some(total_ms) = self.stored_ms(&key, total) else {
                continue;
            };
            let stored = records.entry(id).or_insert(0);
            *stored = (*stored).max(total_ms);
        }
        Ok(records)
    }

    fn merge(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.upsert(id, total_ms, true)
            .map_err(|err| err.into_write_failure(id))
    }

    fn write_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        Ok(self.upsert_all(totals, false)?)
    }

    fn merge_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        Ok(self.upsert_all(totals, true)?)
    }
}

fn validate_table_name(name: &str) -> Result<(), DbError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidTableName(name.to_string()))
    }
}

/// Same text layout as SQLite's `CURRENT_TIMESTAMP`, in UTC.
fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn to_sql_ms(total_ms: u64) -> i64 {
    i64::try_from(total_ms).unwrap_or(i64::MAX)
}

/// Negative values can only come from outside writers; they count as zero.
fn from_sql_ms(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}
