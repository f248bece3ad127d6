use thiserror::Error;

use crate::ingestion::IngestionStage;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by every stage of an ingestion run.
///
/// A failed [`crate::ingestion::Pipeline::handle`] call always returns [`IngestionError::Failed`],
/// wrapping the underlying cause together with the last stage the run reached.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The notification payload does not carry a bucket name and object key.
    #[error("malformed event: {message}")]
    MalformedEvent { message: String },

    /// The object store has no object at the given location.
    #[error("object not found: s3://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// The object store refused access to the object.
    #[error("access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    /// Any other object store failure (throttling, network, service error).
    #[error("object store error for s3://{bucket}/{key}: {message}")]
    ObjectStore {
        bucket: String,
        key: String,
        message: String,
    },

    /// Underlying I/O error while reading the object body.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The delimited reader failed (invalid UTF-8, broken quoting, I/O underneath).
    #[error("csv error: {0}")]
    Csv(#[from] csv_async::Error),

    /// The header or a data row cannot be mapped onto the field schema.
    #[error("failed to parse record at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// A table or column name falls outside the allowed identifier characters.
    #[error("invalid {kind} identifier '{name}'")]
    InvalidIdentifier { kind: &'static str, name: String },

    /// A required configuration value is missing or malformed.
    #[error("config error: {message}")]
    Config { message: String },

    /// The database could not be reached or rejected the credentials.
    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// The insert or the commit failed.
    #[error("load error: {0}")]
    Load(#[source] sqlx::Error),

    /// A run failed; `stage` is the last stage that completed before the failure.
    #[error("ingestion failed after stage {stage}: {source}")]
    Failed {
        stage: IngestionStage,
        #[source]
        source: Box<IngestionError>,
    },
}

impl IngestionError {
    /// Returns the innermost cause, unwrapping any [`IngestionError::Failed`] layers.
    pub fn root(&self) -> &IngestionError {
        match self {
            IngestionError::Failed { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        IngestionError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn parse(line: u64, message: impl Into<String>) -> Self {
        IngestionError::ParseError {
            line,
            message: message.into(),
        }
    }
}
