//! In-memory session accounting.
//!
//! Two concurrent maps: stored totals per identity, and the start reading of
//! every currently active session. Both are sharded (`DashMap`), so callbacks
//! for different identities do not contend on a global lock, and every
//! read-modify-write on a total happens under that key's shard lock.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::clock::Clock;
use crate::identity::Identity;

/// Result of closing an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// Time spent in the session that just ended.
    pub elapsed_ms: u64,
    /// Stored total after the session was added.
    pub total_ms: u64,
}

/// Identity → accumulated duration, plus identity → active session start.
pub struct SessionCache {
    clock: Arc<dyn Clock>,
    totals: DashMap<Identity, u64>,
    active: DashMap<Identity, u64>,
}

impl SessionCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            totals: DashMap::new(),
            active: DashMap::new(),
        }
    }

    /// Records the current reading as the session start for `id`.
    ///
    /// A second start without an end replaces the first; the elapsed clock
    /// restarts and nothing is counted twice.
    pub fn start_session(&self, id: Identity) {
        let now = self.clock.now_ms();
        if self.active.insert(id, now).is_some() {
            tracing::debug!(%id, "session restarted while already active");
        }
    }

    /// Closes the active session for `id` and adds its duration to the total.
    ///
    /// Returns `None` when no session is active, so duplicate end events are
    /// harmless.
    pub fn end_session(&self, id: Identity) -> Option<SessionEnd> {
        let (_, started) = self.active.remove(&id)?;
        let elapsed_ms = self.clock.now_ms().saturating_sub(started);
        let total_ms = self.add(id, elapsed_ms);
        Some(SessionEnd {
            elapsed_ms,
            total_ms,
        })
    }

    /// Stored total plus the time elapsed so far in an active session.
    pub fn current_total(&self, id: Identity) -> u64 {
        let stored = self.stored_total(id);
        let live = self
            .active
            .get(&id)
            .map_or(0, |started| self.clock.now_ms().saturating_sub(*started));
        stored.saturating_add(live)
    }

    /// Stored total only; absent identities count as zero.
    pub fn stored_total(&self, id: Identity) -> u64 {
        self.totals.get(&id).map_or(0, |total| *total)
    }

    /// Snapshot of stored totals, without in-progress session time.
    pub fn all_totals(&self) -> HashMap<Identity, u64> {
        self.totals
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Raises the stored total for `id` to `total_ms` if that is larger.
    ///
    /// Returns `true` when the cache changed.
    pub fn adopt(&self, id: Identity, total_ms: u64) -> bool {
        match self.totals.entry(id) {
            Entry::Occupied(mut entry) => {
                if total_ms > *entry.get() {
                    entry.insert(total_ms);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(total_ms);
                true
            }
        }
    }

    /// Adopts every record in `totals`, keeping the larger value per identity.
    pub fn absorb(&self, totals: &HashMap<Identity, u64>) -> usize {
        totals
            .iter()
            .filter(|(id, total)| self.adopt(**id, **total))
            .count()
    }

    /// Closes every active session into its stored total.
    ///
    /// Returns the number of sessions closed.
    pub fn flush_active(&self) -> usize {
        let ids: Vec<Identity> = self.active.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.end_session(*id).is_some())
            .count()
    }

    pub fn is_active(&self, id: Identity) -> bool {
        self.active.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of identities with a stored total.
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    fn add(&self, id: Identity, elapsed_ms: u64) -> u64 {
        let mut total = self.totals.entry(id).or_insert(0);
        *total = total.saturating_add(elapsed_ms);
        *total
    }
}
