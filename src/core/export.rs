//! Snapshot sinks and the export entry points
use crate::core::snapshot::Snapshot;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

/// A durable destination for the snapshot table.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces the sink content with `snapshot`.
    async fn write(&self, snapshot: &Snapshot) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub sink: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Writes `snapshot` to `sink`, returning whether it succeeded. Failures are
/// logged and never propagated.
pub async fn export(snapshot: &Snapshot, sink: &dyn SnapshotSink) -> bool {
    export_report(snapshot, sink).await.ok
}

async fn export_report(snapshot: &Snapshot, sink: &dyn SnapshotSink) -> ExportReport {
    match sink.write(snapshot).await {
        Ok(()) => {
            info!(sink = sink.name(), records = snapshot.len(), "Snapshot exported");
            ExportReport {
                sink: sink.name().to_string(),
                ok: true,
                error: None,
            }
        }
        Err(e) => {
            let message = format!("{e:#}");
            error!(sink = sink.name(), error = %message, "Snapshot export failed");
            ExportReport {
                sink: sink.name().to_string(),
                ok: false,
                error: Some(message),
            }
        }
    }
}

/// Hands the snapshot to every sink in order. A failing sink does not stop
/// the remaining ones.
pub async fn export_all(snapshot: Snapshot, sinks: &[Box<dyn SnapshotSink>]) -> Vec<ExportReport> {
    let mut reports = Vec::with_capacity(sinks.len());
    for sink in sinks {
        reports.push(export_report(&snapshot, sink.as_ref()).await);
    }
    reports
}
