//! Single-document file store.
//!
//! The document is a JSON object mapping identity text to integer
//! milliseconds. It is read once at open and rewritten in full on every
//! write, through a temporary file and a rename. There is no cross-process
//! locking: one process per file.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pt_core::{DurableStore, Identity, StoreError, parse_stored_key};
use serde_json::Value;

use crate::DbError;

/// JSON document of identity → total milliseconds.
pub struct FileStore {
    path: PathBuf,
    records: Mutex<HashMap<Identity, u64>>,
    healthy: AtomicBool,
}

impl FileStore {
    /// Opens the document at `path`, creating it (and its parent directory)
    /// if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DbError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::write(path, "{}\n").map_err(|source| DbError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                String::new()
            }
            Err(source) => {
                return Err(DbError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let records = parse_document(path, &content)?;
        tracing::debug!(path = ?path, count = records.len(), "opened file store");
        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn records(&self) -> MutexGuard<'_, HashMap<Identity, u64>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrites the whole document. Marks the store unhealthy on failure.
    fn flush(&self, records: &HashMap<Identity, u64>) -> Result<(), DbError> {
        let result = write_document(&self.path, records);
        self.healthy.store(result.is_ok(), Ordering::SeqCst);
        result
    }
}

impl DurableStore for FileStore {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn read(&self, id: Identity) -> Result<Option<u64>, StoreError> {
        Ok(self.records().get(&id).copied())
    }

    fn write(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        let mut records = self.records();
        records.insert(id, total_ms);
        self.flush(&records).map_err(|err| err.into_write_failure(id))
    }

    fn bulk_read(&self) -> Result<HashMap<Identity, u64>, StoreError> {
        Ok(self.records().clone())
    }

    fn merge(&self, id: Identity, total_ms: u64) -> Result<(), StoreError> {
        let mut records = self.records();
        let stored = records.entry(id).or_insert(0);
        *stored = (*stored).max(total_ms);
        self.flush(&records).map_err(|err| err.into_write_failure(id))
    }

    fn write_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        let mut records = self.records();
        records.extend(totals.iter().map(|(id, total)| (*id, *total)));
        self.flush(&records).map_err(StoreError::from)
    }

    fn merge_all(&self, totals: &HashMap<Identity, u64>) -> Result<(), StoreError> {
        let mut records = self.records();
        for (id, total_ms) in totals {
            let stored = records.entry(*id).or_insert(0);
            *stored = (*stored).max(*total_ms);
        }
        self.flush(&records).map_err(StoreError::from)
    }
}

/// Parses the document, skipping entries whose key is not an identity or
/// whose value is not a non-negative integer.
fn parse_document(path: &Path, content: &str) -> Result<HashMap<Identity, u64>, DbError> {
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let document: serde_json::Map<String, Value> =
        serde_json::from_str(content).map_err(|source| DbError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let mut records = HashMap::with_capacity(document.len());
    for (key, value) in document {
        let id = match parse_stored_key(&key) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(path = ?path, error = %err, "skipping record");
                continue;
            }
        };
        let Some(total_ms) = value.as_u64() else {
            tracing::warn!(path = ?path, %id, value = %value, "skipping record with invalid duration");
            continue;
        };
        // Different spellings of one UUID collapse onto the same identity.
        let stored = records.entry(id).or_insert(0);
        *stored = (*stored).max(total_ms);
    }
    Ok(records)
}

fn write_document(path: &Path, records: &HashMap<Identity, u64>) -> Result<(), DbError> {
    let sorted: BTreeMap<String, u64> = records
        .iter()
        .map(|(id, total)| (id.to_string(), *total))
        .collect();
    let mut json = serde_json::to_string_pretty(&sorted).map_err(|source| DbError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');

    let temp_path = temp_path(path);
    let io_err = |source| DbError::Io {
        path: temp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(|source| DbError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Sibling of `path` with `.tmp` appended, never equal to `path` itself.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Identity {
        text.parse().unwrap()
    }

    const A: &str = "00000000-0000-0000-0000-00000000000a";
    const B: &str = "00000000-0000-0000-0000-00000000000b";

    #[test]
    fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playtime.json");

        let store = FileStore::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.bulk_read().unwrap().is_empty());
        assert!(store.is_healthy());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");

        let store = FileStore::open(&path).unwrap();
        store.write(id(A), 5_000).unwrap();
        store.write(id(B), 7_000).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.read(id(A)).unwrap(), Some(5_000));
        assert_eq!(reopened.read(id(B)).unwrap(), Some(7_000));
    }

    #[test]
    fn document_is_keyed_by_identity_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");

        let store = FileStore::open(&path).unwrap();
        store.write(id(A), 5_000).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let document: BTreeMap<String, u64> = serde_json::from_str(&content).unwrap();
        assert_eq!(document.get(A), Some(&5_000));
        assert!(!dir.path().join("playtime.json.tmp").exists());
    }

    #[test]
    fn merge_keeps_larger_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("playtime.json")).unwrap();

        store.merge(id(A), 9_000).unwrap();
        store.merge(id(A), 4_000).unwrap();
        assert_eq!(store.read(id(A)).unwrap(), Some(9_000));

        store.merge(id(B), 4_000).unwrap();
        store.merge(id(B), 9_000).unwrap();
        assert_eq!(store.read(id(B)).unwrap(), Some(9_000));
    }

    #[test]
    fn write_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("playtime.json")).unwrap();

        store.write(id(A), 9_000).unwrap();
        store.write(id(A), 1_000).unwrap();
        assert_eq!(store.read(id(A)).unwrap(), Some(1_000));
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");
        fs::write(
            &path,
            format!(r#"{{"{A}": 1000, "not-a-uuid": 5, "{B}": "soon"}}"#),
        )
        .unwrap();

        let store = FileStore::open(&path).unwrap();
        let records = store.bulk_read().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(&id(A)), Some(&1_000));
    }

    #[test]
    fn duplicate_spellings_keep_largest_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");
        let upper = A.to_uppercase();
        let braced = format!("{{{A}}}");
        fs::write(
            &path,
            format!(r#"{{"{A}": 100, "{upper}": 9000, "{braced}": 500}}"#),
        )
        .unwrap();

        let store = FileStore::open(&path).unwrap();
        let records = store.bulk_read().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(&id(A)), Some(&9_000));
    }

    #[test]
    fn tmp_suffixed_path_still_writes_through_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.tmp");
        assert_eq!(temp_path(&path), dir.path().join("playtime.tmp.tmp"));

        let store = FileStore::open(&path).unwrap();
        store.write(id(A), 4_000).unwrap();

        assert!(!dir.path().join("playtime.tmp.tmp").exists());
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.read(id(A)).unwrap(), Some(4_000));
    }

    #[test]
    fn empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");
        fs::write(&path, "").unwrap();

        assert!(FileStore::open(&path).unwrap().bulk_read().unwrap().is_empty());
    }

    #[test]
    fn malformed_document_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtime.json");
        fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(FileStore::open(&path), Err(DbError::Json { .. })));
    }

    #[test]
    fn failed_flush_marks_unhealthy_and_keeps_value() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("playtime.json");
        let store = FileStore::open(&path).unwrap();

        fs::remove_dir_all(&data_dir).unwrap();
        let err = store.write(id(A), 3_000).unwrap_err();

        assert!(matches!(err, StoreError::WriteFailure { .. }));
        assert!(!store.is_healthy());
        assert_eq!(store.read(id(A)).unwrap(), Some(3_000));

        fs::create_dir_all(&data_dir).unwrap();
        store.merge(id(B), 1).unwrap();
        assert!(store.is_healthy());
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.read(id(A)).unwrap(), Some(3_000));
    }
}
