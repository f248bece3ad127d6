//! Ingestion pipeline and its parts.
//!
//! Most callers should use [`Pipeline::handle`] (from [`pipeline`]) which:
//!
//! - reads the object location out of an S3 notification ([`event`])
//! - opens the object as a lazy record stream ([`source`])
//! - bulk inserts every record into the configured table and commits ([`loader`])
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]

pub mod event;
pub mod loader;
pub mod observability;
pub mod pipeline;
pub mod source;

pub use event::object_location_from_event;
pub use loader::{BatchWriter, Database, InsertBatch, MySqlDatabase, bulk_load};
pub use observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, TracingObserver,
};
pub use pipeline::{IngestionReport, IngestionStage, Pipeline, PipelineOptions};
pub use source::{ObjectBody, ObjectStore, RecordReader, S3ObjectStore, strip_bom};
