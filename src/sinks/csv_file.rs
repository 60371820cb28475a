use super::record_cells;
use crate::core::export::SnapshotSink;
use crate::core::snapshot::{COLUMNS, Snapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Local CSV file, replaced atomically on every write.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CsvFileSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_to(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        // Written next to the target so the final rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(COLUMNS)?;
            for record in snapshot.records() {
                writer.write_record(record_cells(record))?;
            }
            writer.flush()?;
        }

        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), rows = snapshot.len(), "CSV written");
        Ok(())
    }
}

#[async_trait]
impl SnapshotSink for CsvFileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        self.write_to(snapshot)
    }
}
