//! Fan-out of item and category records to the configured sinks

use crate::crawler::summary::SinkStats;
use crate::model::{CategoryRecord, ItemRecord};
use crate::output::{Delivery, Sink, SinkError, SinkResult};
use std::sync::atomic::{AtomicU64, Ordering};

struct SinkSlot {
    sink: Box<dyn Sink>,
    stored: AtomicU64,
    duplicate: AtomicU64,
    failed: AtomicU64,
}

impl SinkSlot {
    fn new(sink: Box<dyn Sink>) -> Self {
        Self {
            sink,
            stored: AtomicU64::new(0),
            duplicate: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

/// Result of routing one record
#[derive(Debug, Default)]
pub struct RouteReport {
    /// Sinks that stored the record
    pub stored: usize,

    /// Name of the sink that reported the record as a duplicate
    pub duplicate_at: Option<String>,

    /// Sinks that failed, with their errors
    pub failures: Vec<(String, SinkError)>,
}

impl RouteReport {
    /// True when every attempted sink failed
    pub fn is_dropped(&self) -> bool {
        self.stored == 0 && self.duplicate_at.is_none() && !self.failures.is_empty()
    }
}

/// Delivers records to an ordered list of sinks
///
/// A failing sink never blocks the sinks after it. A sink reporting
/// [`Delivery::Duplicate`] ends delivery of that record.
pub struct ItemRouter {
    sinks: Vec<SinkSlot>,
}

impl ItemRouter {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self {
            sinks: sinks.into_iter().map(SinkSlot::new).collect(),
        }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|slot| slot.sink.name()).collect()
    }

    /// Opens every sink in order
    ///
    /// If a sink fails to open, the sinks already opened are closed again in reverse
    /// order and the error is returned.
    pub fn open_all(&self) -> SinkResult<()> {
        for (index, slot) in self.sinks.iter().enumerate() {
            if let Err(e) = slot.sink.open() {
                tracing::error!(sink = slot.sink.name(), error = %e, "Failed to open sink");
                for opened in self.sinks[..index].iter().rev() {
                    if let Err(close_err) = opened.sink.close() {
                        tracing::warn!(sink = opened.sink.name(), error = %close_err, "Failed to close sink");
                    }
                }
                return Err(e);
            }
            tracing::debug!(sink = slot.sink.name(), "Sink opened");
        }
        Ok(())
    }

    /// Routes one item record through the sinks
    pub fn route(&self, record: &ItemRecord) -> RouteReport {
        self.deliver(record.natural_key(), |sink| sink.on_record(record))
    }

    /// Routes one category record through the sinks
    ///
    /// Sinks that only take items skip it; a category no sink takes is not dropped.
    pub fn route_category(&self, record: &CategoryRecord) -> RouteReport {
        self.deliver(&record.url, |sink| sink.on_category(record))
    }

    fn deliver<F>(&self, key: &str, on_sink: F) -> RouteReport
    where
        F: Fn(&dyn Sink) -> SinkResult<Delivery>,
    {
        let mut report = RouteReport::default();

        for slot in &self.sinks {
            match on_sink(slot.sink.as_ref()) {
                Ok(Delivery::Stored) => {
                    slot.stored.fetch_add(1, Ordering::Relaxed);
                    report.stored += 1;
                }
                Ok(Delivery::Duplicate) => {
                    slot.duplicate.fetch_add(1, Ordering::Relaxed);
                    report.duplicate_at = Some(slot.sink.name().to_string());
                    break;
                }
                Ok(Delivery::Skipped) => {}
                Err(e) => {
                    slot.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        sink = slot.sink.name(),
                        record = key,
                        error = %e,
                        "Sink failed to accept record"
                    );
                    report.failures.push((slot.sink.name().to_string(), e));
                }
            }
        }

        if report.is_dropped() {
            tracing::error!(record = key, "Record dropped: every sink failed");
        }
        report
    }

    /// Closes every sink in order, logging failures
    ///
    /// # Returns
    ///
    /// Number of sinks that failed to close
    pub fn close_all(&self) -> usize {
        let mut failures = 0;
        for slot in &self.sinks {
            match slot.sink.close() {
                Ok(()) => tracing::debug!(sink = slot.sink.name(), "Sink closed"),
                Err(e) => {
                    failures += 1;
                    tracing::error!(sink = slot.sink.name(), error = %e, "Failed to close sink");
                }
            }
        }
        failures
    }

    /// Current counters of every sink, in delivery order
    pub fn sink_stats(&self) -> Vec<SinkStats> {
        self.sinks
            .iter()
            .map(|slot| SinkStats {
                name: slot.sink.name().to_string(),
                stored: slot.stored.load(Ordering::Relaxed),
                duplicate: slot.duplicate.load(Ordering::Relaxed),
                failed: slot.failed.load(Ordering::Relaxed),
            })
            .collect()
    }
}
