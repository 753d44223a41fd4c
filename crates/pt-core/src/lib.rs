//! Core domain logic for the playtime tracker.
//!
//! This crate contains:
//! - Session accounting: an in-memory cache of accumulated durations and
//!   currently active sessions
//! - Reconciliation: max-wins merging between the cache and a durable store,
//!   with fallback to a local file
//! - Formatting: rendering durations as `1d 2h 3m 4s`

pub mod cache;
pub mod clock;
pub mod engine;
pub mod format;
mod identity;
pub mod store;
mod tracker;

#[cfg(test)]
mod testing;

pub use cache::{SessionCache, SessionEnd};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{MigrationReport, ReconciliationEngine, Reconciled, SyncReport};
pub use format::{FormatOptions, format_duration};
pub use identity::{Identity, IdentityError};
pub use store::{DurableStore, StoreError, parse_stored_key};
pub use tracker::Tracker;
