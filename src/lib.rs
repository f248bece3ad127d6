//! `csv-ingest-lambda` loads one delimited file from S3 into one MySQL table per invocation.
//!
//! The primary entrypoint is [`ingestion::Pipeline::handle`], which takes the raw S3 notification
//! payload and:
//!
//! 1. extracts the bucket and key of the uploaded object
//! 2. opens the object as a byte stream and reads its header row into a [`types::FieldSchema`]
//! 3. opens a database connection
//! 4. inserts every following row with batched multi-row `INSERT` statements inside one
//!    transaction, then commits
//! 5. closes the connection
//!
//! The file is never held in memory as a whole: rows are pulled from the network stream one at
//! a time and only a single statement's worth of rows is buffered.
//!
//! ## Data handling
//!
//! - The first line names the columns. Column order in the `INSERT` follows the header, not the
//!   table definition.
//! - Values are inserted as the strings found in the file; conversion is left to the database.
//! - A leading UTF-8 byte-order mark is dropped.
//! - A row with fewer fields than the header inserts `NULL` for the missing ones. A row with more
//!   fields is a [`IngestionError::ParseError`] and fails the run.
//!
//! ## Example
//!
//! ```no_run
//! use csv_ingest_lambda::config::Config;
//! use csv_ingest_lambda::ingestion::{MySqlDatabase, Pipeline, PipelineOptions, S3ObjectStore};
//!
//! # async fn run(s3: aws_sdk_s3::Client, event: serde_json::Value) -> Result<(), csv_ingest_lambda::IngestionError> {
//! let config = Config::from_env()?;
//! let pipeline = Pipeline::new(
//!     S3ObjectStore::new(s3),
//!     MySqlDatabase::new(config.database.clone()),
//!     PipelineOptions::from(&config),
//! );
//! let report = pipeline.handle(&event).await?;
//! println!("rows={}", report.rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: event adapter, record source, bulk loader and the pipeline tying them together
//! - [`types`]: schema, record and location types
//! - [`config`]: environment-driven configuration
//! - [`logging`]: log subscriber setup
//! - [`error`]: error types used across ingestion

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod types;

pub use error::{IngestionError, IngestionResult};
