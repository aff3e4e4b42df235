//! Dedup filters deciding whether a target identity has been seen
//!
//! Admission is a single check-and-set: of any number of concurrent callers
//! admitting the same key, exactly one gets `true`.

use crate::storage::{SharedStorage, Storage};
use crate::TaskError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Set-membership over target identities
pub trait DedupFilter: Send + Sync {
    /// Records `key` and returns `true` the first time it is seen, `false` after
    ///
    /// Fails with [`TaskError::StoreUnavailable`] when the backing store cannot be
    /// reached; callers must retry rather than treat the key as new.
    fn admit(&self, key: &str) -> Result<bool, TaskError>;

    /// Checks whether `key` has been admitted, without recording it
    fn contains(&self, key: &str) -> Result<bool, TaskError>;

    /// Number of keys admitted so far
    fn len(&self) -> Result<u64, TaskError>;

    fn is_empty(&self) -> Result<bool, TaskError> {
        Ok(self.len()? == 0)
    }
}

/// When a key was first admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupEntry {
    pub first_seen_at: DateTime<Utc>,
}

/// In-process dedup filter living for one run
#[derive(Debug, Default)]
pub struct MemoryDedup {
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the entry recorded for `key`
    pub fn entry(&self, key: &str) -> Result<Option<DedupEntry>, TaskError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).copied())
    }
}

fn poisoned<T>(_: T) -> TaskError {
    TaskError::StoreUnavailable("dedup set lock poisoned".to_string())
}

impl DedupFilter for MemoryDedup {
    fn admit(&self, key: &str) -> Result<bool, TaskError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            DedupEntry {
                first_seen_at: Utc::now(),
            },
        );
        Ok(true)
    }

    fn contains(&self, key: &str) -> Result<bool, TaskError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }

    fn len(&self) -> Result<u64, TaskError> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.len() as u64)
    }
}

/// Dedup filter backed by the `dedup_keys` table
///
/// Several crawler processes sharing the database file see one key set per scope.
pub struct SqliteDedup {
    storage: SharedStorage,
    scope: String,
}

impl SqliteDedup {
    pub fn new(storage: SharedStorage, scope: impl Into<String>) -> Self {
        Self {
            storage,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn with_storage<T>(
        &self,
        op: impl FnOnce(&mut dyn Storage) -> crate::storage::StorageResult<T>,
    ) -> Result<T, TaskError> {
        let mut storage = self.storage.lock().map_err(poisoned)?;
        op(&mut *storage).map_err(|e| TaskError::StoreUnavailable(e.to_string()))
    }
}

impl DedupFilter for SqliteDedup {
    fn admit(&self, key: &str) -> Result<bool, TaskError> {
        self.with_storage(|s| s.admit_key(&self.scope, key))
    }

    fn contains(&self, key: &str) -> Result<bool, TaskError> {
        self.with_storage(|s| s.contains_key(&self.scope, key))
    }

    fn len(&self) -> Result<u64, TaskError> {
        self.with_storage(|s| s.count_keys(&self.scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::sync::Arc;

    fn assert_exactly_one_admission(filter: Arc<dyn DedupFilter>) {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || filter.admit("same-key").unwrap())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(filter.len().unwrap(), 1);
    }

    #[test]
    fn test_memory_admit_once() {
        let filter = MemoryDedup::new();

        assert!(!filter.contains("a").unwrap());
        assert!(filter.admit("a").unwrap());
        assert!(!filter.admit("a").unwrap());
        assert!(filter.contains("a").unwrap());
        assert!(filter.admit("b").unwrap());
        assert_eq!(filter.len().unwrap(), 2);
        assert!(filter.entry("a").unwrap().is_some());
    }

    #[test]
    fn test_contains_does_not_admit() {
        let filter = MemoryDedup::new();
        assert!(!filter.contains("a").unwrap());
        assert!(filter.is_empty().unwrap());
        assert!(filter.admit("a").unwrap());
    }

    #[test]
    fn test_memory_concurrent_admission() {
        assert_exactly_one_admission(Arc::new(MemoryDedup::new()));
    }

    #[test]
    fn test_sqlite_concurrent_admission() {
        let storage = SqliteStorage::new_in_memory().unwrap().into_shared();
        assert_exactly_one_admission(Arc::new(SqliteDedup::new(storage, "run-1")));
    }

    #[test]
    fn test_sqlite_scopes_are_independent() {
        let storage = SqliteStorage::new_in_memory().unwrap().into_shared();
        let first = SqliteDedup::new(Arc::clone(&storage), "run-1");
        let second = SqliteDedup::new(storage, "run-2");

        assert!(first.admit("k").unwrap());
        assert!(second.admit("k").unwrap());
        assert!(!first.admit("k").unwrap());
    }

    #[test]
    fn test_poisoned_store_is_unavailable() {
        let storage = SqliteStorage::new_in_memory().unwrap().into_shared();
        let poison = Arc::clone(&storage);
        let _ = std::thread::spawn(move || {
            let _guard = poison.lock().unwrap();
            panic!("poison the storage lock");
        })
        .join();

        let filter = SqliteDedup::new(storage, "run-1");
        assert!(matches!(
            filter.admit("k"),
            Err(TaskError::StoreUnavailable(_))
        ));
    }
}
