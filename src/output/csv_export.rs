use crate::model::{ExportRow, ItemRecord, EXPORT_COLUMNS};
use crate::output::traits::{Delivery, Sink, SinkError, SinkResult};
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Builds the export file path for a run started now
///
/// # Examples
///
/// ```
/// use kongfz_crawler::output::export_file_path;
/// use std::path::Path;
///
/// let path = export_file_path(Path::new("./data"));
/// let name = path.file_name().unwrap().to_str().unwrap();
/// assert!(name.starts_with("kongfzbooks_") && name.ends_with(".csv"));
/// ```
pub fn export_file_path(export_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    export_dir.join(format!("kongfzbooks_{}.csv", timestamp))
}

/// Appends records to a CSV file in a fixed column order
///
/// Appending is not idempotent: a record delivered twice yields two rows.
pub struct CsvExportSink {
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl CsvExportSink {
    /// Creates a sink writing a new timestamped file under `export_dir`
    pub fn new(export_dir: &Path) -> Self {
        Self::with_path(export_file_path(export_dir))
    }

    /// Creates a sink writing exactly `path`
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> SinkResult<MutexGuard<'_, Option<csv::Writer<File>>>> {
        self.writer
            .lock()
            .map_err(|_| SinkError::Unavailable("export writer lock poisoned".to_string()))
    }
}

impl Sink for CsvExportSink {
    fn name(&self) -> &str {
        "export"
    }

    fn open(&self) -> SinkResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        writer.write_record(EXPORT_COLUMNS)?;
        writer.flush()?;

        *self.writer()? = Some(writer);
        tracing::info!(path = %self.path.display(), "CSV export opened");
        Ok(())
    }

    fn on_record(&self, record: &ItemRecord) -> SinkResult<Delivery> {
        let mut guard = self.writer()?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| SinkError::NotOpen(self.name().to_string()))?;
        writer.serialize(ExportRow::from(record))?;
        Ok(Delivery::Stored)
    }

    fn close(&self) -> SinkResult<()> {
        if let Some(mut writer) = self.writer()?.take() {
            writer.flush()?;
            tracing::info!(path = %self.path.display(), "CSV export closed");
        }
        Ok(())
    }
}
