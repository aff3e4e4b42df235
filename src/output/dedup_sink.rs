use crate::model::{CategoryRecord, ItemRecord};
use crate::output::traits::{Delivery, Sink, SinkError, SinkResult};
use crate::storage::{SharedStorage, Storage};
use crate::url::{fingerprint, fingerprint_str};
use std::collections::HashSet;
use std::sync::Mutex;
use url::Url;

/// Key set shared by every run, so records persisted earlier are recognized
pub const RECORD_SCOPE: &str = "records";

/// Membership key of a record: SHA-256 hex of its normalized natural key
pub fn record_key(record: &ItemRecord) -> String {
    url_key(record.natural_key())
}

/// Membership key of a category record: SHA-256 hex of its normalized URL
pub fn category_key(record: &CategoryRecord) -> String {
    url_key(&record.url)
}

fn url_key(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => fingerprint(&url),
        Err(_) => fingerprint_str(raw),
    }
}

/// Suppresses records already delivered by a prior run
///
/// Keys first admitted by this sink instance keep passing through, so a detail page
/// can enrich the record its listing produced earlier in the same run.
pub struct DedupSink {
    storage: SharedStorage,
    scope: String,
    admitted: Mutex<HashSet<String>>,
}

impl DedupSink {
    pub fn new(storage: SharedStorage) -> Self {
        Self::with_scope(storage, RECORD_SCOPE)
    }

    pub fn with_scope(storage: SharedStorage, scope: impl Into<String>) -> Self {
        Self {
            storage,
            scope: scope.into(),
            admitted: Mutex::new(HashSet::new()),
        }
    }

    fn admit(&self, key: String, natural_key: &str) -> SinkResult<Delivery> {
        let mut admitted = self
            .admitted
            .lock()
            .map_err(|_| SinkError::Unavailable("dedup key set lock poisoned".to_string()))?;
        if admitted.contains(&key) {
            return Ok(Delivery::Stored);
        }

        let mut storage = self
            .storage
            .lock()
            .map_err(|_| SinkError::Unavailable("dedup store lock poisoned".to_string()))?;
        if storage.admit_key(&self.scope, &key)? {
            admitted.insert(key);
            Ok(Delivery::Stored)
        } else {
            tracing::debug!(key = natural_key, "Record seen in a prior run");
            Ok(Delivery::Duplicate)
        }
    }
}

impl Sink for DedupSink {
    fn name(&self) -> &str {
        "dedup"
    }

    fn open(&self) -> SinkResult<()> {
        let storage = self
            .storage
            .lock()
            .map_err(|_| SinkError::Unavailable("dedup store lock poisoned".to_string()))?;
        let known = storage.count_keys(&self.scope)?;
        tracing::debug!(scope = %self.scope, known, "Dedup sink opened");
        Ok(())
    }

    fn on_record(&self, record: &ItemRecord) -> SinkResult<Delivery> {
        self.admit(record_key(record), record.natural_key())
    }

    fn on_category(&self, record: &CategoryRecord) -> SinkResult<Delivery> {
        self.admit(category_key(record), &record.url)
    }

    fn close(&self) -> SinkResult<()> {
        Ok(())
    }
}
