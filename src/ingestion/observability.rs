use std::time::Duration;

use crate::error::IngestionError;
use crate::types::{ObjectLocation, TableName};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Error-level event (the run failed because of its input).
    Error,
    /// Critical error (object store or database infrastructure failures).
    Critical,
}

impl IngestionSeverity {
    /// Classify a failure. Infrastructure problems are [`IngestionSeverity::Critical`]; problems
    /// with the event or the file contents are [`IngestionSeverity::Error`].
    pub fn for_error(error: &IngestionError) -> Self {
        match error.root() {
            IngestionError::ObjectNotFound { .. }
            | IngestionError::AccessDenied { .. }
            | IngestionError::ObjectStore { .. }
            | IngestionError::Io(_)
            | IngestionError::Connection(_)
            | IngestionError::Config { .. } => IngestionSeverity::Critical,
            IngestionError::Csv(err) => match err.kind() {
                csv_async::ErrorKind::Io(_) => IngestionSeverity::Critical,
                _ => IngestionSeverity::Error,
            },
            IngestionError::MalformedEvent { .. }
            | IngestionError::ParseError { .. }
            | IngestionError::InvalidIdentifier { .. }
            | IngestionError::Load(_)
            | IngestionError::Failed { .. } => IngestionSeverity::Error,
        }
    }
}

/// Context about an ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// The object being ingested; `None` when the event itself could not be read.
    pub location: Option<ObjectLocation>,
    /// Target table.
    pub table: TableName,
}

/// Stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of inserted rows.
    pub rows: u64,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when ingestion succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when ingestion fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when an ingestion failure meets an alert threshold, always after
    /// [`Self::on_failure`] for the same error.
    fn on_alert(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}
}

/// Emits ingestion outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            location = %display_location(ctx),
            table = %ctx.table,
            rows = stats.rows,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "ingestion complete"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::error!(
            location = %display_location(ctx),
            table = %ctx.table,
            ?severity,
            error = %error,
            "ingestion failed"
        );
    }

    // The failure itself was already logged by `on_failure`.
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        tracing::error!(
            alert = true,
            location = %display_location(ctx),
            ?severity,
            "alert raised"
        );
    }
}

fn display_location(ctx: &IngestionContext) -> String {
    ctx.location
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<unknown>".to_string())
}
