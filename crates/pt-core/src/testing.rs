//! In-memory store double for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::identity::Identity;
use crate::store::{DurableStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Identity, u64>>,
    failing: AtomicBool,
    failing_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_records(records: &[(Identity, u64)]) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .extend(records.iter().copied());
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Keeps reads working while every write fails.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, id: Identity) -> Option<u64> {
        self.records.lock().unwrap().get(&id).copied()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.check()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store read-only".to_string()))
        } else {
            Ok(())
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, u64>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn is_healthy(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }

    fn read(&self, id: Identity) -> Result<Option<u64>, StoreError> {
        self.check()?;
        Ok(self.records().get(&id).copied())
    }

    fn write(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.check_write()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records().insert(id, total_ms);
        Ok(())
    }

    fn bulk_read(&self) -> Result<HashMap<Identity, u64>, StoreError> {
        self.check()?;
        Ok(self.records().clone())
    }

    fn merge(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        self.check_write()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records();
        let stored = records.entry(id).or_insert(0);
        *stored = (*stored).max(total_ms);
        Ok(())
    }
}
