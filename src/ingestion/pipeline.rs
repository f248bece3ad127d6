//! Per-invocation orchestration.
//!
//! A run moves through [`IngestionStage`]s strictly in order:
//!
//! `Start → EventParsed → StreamAttached → ConnectionOpen → Loaded → Done`
//!
//! Any failure ends the run. The returned [`IngestionError::Failed`] names the last stage that
//! completed, and wraps the original cause. Nothing is retried here; redelivery belongs to
//! whatever invoked the function.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{Config, DEFAULT_MAX_BATCH_ROWS};
use crate::error::{IngestionError, IngestionResult};
use crate::types::{ObjectLocation, TableName};

use super::event::object_location_from_event;
use super::loader::Database;
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::source::{ObjectStore, RecordReader};

/// Progress marker of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionStage {
    Start,
    EventParsed,
    StreamAttached,
    ConnectionOpen,
    Loaded,
    Done,
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionStage::Start => "start",
            IngestionStage::EventParsed => "event_parsed",
            IngestionStage::StreamAttached => "stream_attached",
            IngestionStage::ConnectionOpen => "connection_open",
            IngestionStage::Loaded => "loaded",
            IngestionStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Settings a [`Pipeline`] needs from the process [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub table: TableName,
    pub delimiter: u8,
    pub max_batch_rows: usize,
    /// Severity at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl PipelineOptions {
    /// Options for `table` with a comma delimiter and default batching.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            delimiter: b',',
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            table: config.table.clone(),
            delimiter: config.delimiter,
            max_batch_rows: config.max_batch_rows,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Result of a successful run, returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub bucket: String,
    pub key: String,
    pub table: String,
    pub rows: u64,
    pub columns: Vec<String>,
}

/// Wires event parsing, the object store and the database together for one file per call.
pub struct Pipeline<S, D> {
    store: S,
    database: D,
    options: PipelineOptions,
    observer: Option<Arc<dyn IngestionObserver>>,
}

impl<S, D> fmt::Debug for Pipeline<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

struct Progress {
    stage: IngestionStage,
    location: Option<ObjectLocation>,
    stage_started: Instant,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: IngestionStage::Start,
            location: None,
            stage_started: Instant::now(),
        }
    }

    fn advance(&mut self, next: IngestionStage) {
        let elapsed = self.stage_started.elapsed();
        tracing::debug!(
            from = %self.stage,
            to = %next,
            elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
            "stage complete"
        );
        self.stage = next;
        self.stage_started = Instant::now();
    }
}

impl<S, D> Pipeline<S, D>
where
    S: ObjectStore,
    D: Database,
{
    pub fn new(store: S, database: D, options: PipelineOptions) -> Self {
        Self {
            store,
            database,
            options,
            observer: None,
        }
    }

    /// Attach an observer for outcomes (logging/alerts).
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ingest the file named by an S3 notification payload.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_success` on success, with row count and elapsed time
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the severity is >= `options.alert_at_or_above`
    #[tracing::instrument(skip_all, fields(table = %self.options.table))]
    pub async fn handle(&self, payload: &serde_json::Value) -> IngestionResult<IngestionReport> {
        let started = Instant::now();
        let mut progress = Progress::new();

        let result = self.run(payload, &mut progress).await;

        let ctx = IngestionContext {
            location: progress.location.clone(),
            table: self.options.table.clone(),
        };

        match result {
            Ok(report) => {
                if let Some(obs) = self.observer.as_ref() {
                    obs.on_success(
                        &ctx,
                        IngestionStats {
                            rows: report.rows,
                            elapsed: started.elapsed(),
                        },
                    );
                }
                Ok(report)
            }
            Err(source) => {
                let err = IngestionError::Failed {
                    stage: progress.stage,
                    source: Box::new(source),
                };
                self.report_failure(&ctx, &err, started.elapsed());
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        payload: &serde_json::Value,
        progress: &mut Progress,
    ) -> IngestionResult<IngestionReport> {
        let location = object_location_from_event(payload)?;
        tracing::info!(bucket = %location.bucket, key = %location.key, "ingesting object");
        progress.location = Some(location.clone());
        progress.advance(IngestionStage::EventParsed);

        let body = self.store.open(&location).await?;
        let mut reader = RecordReader::open(body, self.options.delimiter).await?;
        let columns: Vec<String> = reader.schema().field_names().map(str::to_owned).collect();
        progress.advance(IngestionStage::StreamAttached);

        // Dropped on every early return below, which releases the connection.
        let mut conn = self.database.connect().await?;
        progress.advance(IngestionStage::ConnectionOpen);

        let rows = self
            .database
            .load(
                &mut conn,
                &self.options.table,
                &mut reader,
                self.options.max_batch_rows,
            )
            .await?;
        progress.advance(IngestionStage::Loaded);

        self.database.close(conn).await?;
        progress.advance(IngestionStage::Done);

        Ok(IngestionReport {
            bucket: location.bucket,
            key: location.key,
            table: self.options.table.to_string(),
            rows,
            columns,
        })
    }

    fn report_failure(&self, ctx: &IngestionContext, err: &IngestionError, elapsed: Duration) {
        tracing::debug!(elapsed_ms = elapsed.as_secs_f64() * 1_000.0, "run aborted");
        let Some(obs) = self.observer.as_ref() else {
            return;
        };
        let severity = IngestionSeverity::for_error(err);
        obs.on_failure(ctx, severity, err);
        if severity >= self.options.alert_at_or_above {
            obs.on_alert(ctx, severity, err);
        }
    }
}
