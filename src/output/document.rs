use crate::model::{CategoryRecord, ItemRecord};
use crate::output::traits::{Delivery, Sink, SinkError, SinkResult};
use crate::storage::{SharedStorage, SqliteStorage, Storage};
use std::sync::MutexGuard;

/// Upserts records into the `documents` table, keyed by natural key
///
/// Repeated deliveries of one key merge into a single document; empty incoming
/// fields never erase stored values. Category records go to the `categories` table,
/// keyed by category URL.
pub struct DocumentSink {
    storage: SharedStorage,
}

impl DocumentSink {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    fn storage(&self) -> SinkResult<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| SinkError::Unavailable("document store lock poisoned".to_string()))
    }
}

impl Sink for DocumentSink {
    fn name(&self) -> &str {
        "document"
    }

    fn open(&self) -> SinkResult<()> {
        let storage = self.storage()?;
        let existing = storage.count_documents()?;
        let categories = storage.count_categories()?;
        tracing::debug!(documents = existing, categories, "Document sink opened");
        Ok(())
    }

    fn on_record(&self, record: &ItemRecord) -> SinkResult<Delivery> {
        self.storage()?.upsert_document(record)?;
        Ok(Delivery::Stored)
    }

    fn on_category(&self, record: &CategoryRecord) -> SinkResult<Delivery> {
        self.storage()?.upsert_category(record)?;
        Ok(Delivery::Stored)
    }

    fn close(&self) -> SinkResult<()> {
        Ok(())
    }
}
