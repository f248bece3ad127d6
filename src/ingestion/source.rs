//! Record source: fetch an object as a byte stream and read it as delimited records.
//!
//! Nothing here buffers the whole object. [`RecordReader::open`] consumes only as much of the
//! body as it takes to read the header row; every later row is pulled on demand through
//! [`RecordReader::next_record`].

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{FieldSchema, ObjectLocation, Record};

/// Streaming object body.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Read-only access to an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the object at `location` as a byte stream.
    ///
    /// Implementations map a missing object to [`IngestionError::ObjectNotFound`] and a refused
    /// request to [`IngestionError::AccessDenied`].
    async fn open(&self, location: &ObjectLocation) -> IngestionResult<ObjectBody>;
}

/// [`ObjectStore`] backed by S3.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    inner: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(inner: aws_sdk_s3::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(skip(self), fields(bucket = %location.bucket, key = %location.key))]
    async fn open(&self, location: &ObjectLocation) -> IngestionResult<ObjectBody> {
        let resp = self
            .inner
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|err| classify_get_error(location, err))?;

        tracing::debug!(content_length = ?resp.content_length(), "object attached");
        Ok(Box::pin(resp.body.into_async_read()))
    }
}

fn classify_get_error(location: &ObjectLocation, err: SdkError<GetObjectError>) -> IngestionError {
    let status = err.raw_response().map(|r| r.status().as_u16());
    let service_err = err.into_service_error();

    if service_err.is_no_such_key() || status == Some(404) {
        IngestionError::ObjectNotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        }
    } else if service_err.code() == Some("AccessDenied") || status == Some(403) {
        IngestionError::AccessDenied {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        }
    } else {
        IngestionError::ObjectStore {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            message: DisplayErrorContext(&service_err).to_string(),
        }
    }
}

/// Drop a leading UTF-8 byte-order mark, if present.
///
/// Reads at most three bytes; anything that is not a BOM is put back in front of the stream.
pub async fn strip_bom(mut body: ObjectBody) -> std::io::Result<ObjectBody> {
    let mut prefix = Vec::with_capacity(UTF8_BOM.len());
    (&mut body)
        .take(UTF8_BOM.len() as u64)
        .read_to_end(&mut prefix)
        .await?;

    if prefix == UTF8_BOM {
        Ok(body)
    } else {
        Ok(Box::pin(Cursor::new(prefix).chain(body)))
    }
}

/// Forward-only reader yielding [`Record`]s keyed by the header row.
pub struct RecordReader {
    inner: AsyncReader<ObjectBody>,
    schema: Arc<FieldSchema>,
    buffer: StringRecord,
    rows_read: u64,
}

impl RecordReader {
    /// Strip any BOM, then read the header row into a [`FieldSchema`].
    ///
    /// Rules:
    ///
    /// - the first non-empty line is the header; an input without one is a parse error
    /// - fields are split on `delimiter`; `"` quotes fields containing it
    /// - blank lines are skipped
    pub async fn open(body: ObjectBody, delimiter: u8) -> IngestionResult<Self> {
        let body = strip_bom(body).await?;
        let mut inner = AsyncReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .create_reader(body);

        let schema = FieldSchema::from_header(inner.headers().await?.iter())?;
        tracing::debug!(columns = ?schema.field_names().collect::<Vec<_>>(), "read header row");

        Ok(Self {
            inner,
            schema: Arc::new(schema),
            buffer: StringRecord::new(),
            rows_read: 0,
        })
    }

    /// Schema read from the header row.
    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    /// Number of data rows returned so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Pull the next record, or `None` once the body is exhausted.
    ///
    /// A row shorter than the header leaves its trailing fields unset. A row longer than the
    /// header is an error: its extra values have no column to go to.
    pub async fn next_record(&mut self) -> Option<IngestionResult<Record>> {
        match self.inner.read_record(&mut self.buffer).await {
            Ok(false) => None,
            Ok(true) => {
                let record = self.current_record();
                if record.is_ok() {
                    self.rows_read += 1;
                }
                Some(record)
            }
            Err(e) => Some(Err(e.into())),
        }
    }

    fn current_record(&self) -> IngestionResult<Record> {
        let width = self.schema.len();
        if self.buffer.len() > width {
            let line = self.buffer.position().map(|p| p.line()).unwrap_or_default();
            return Err(IngestionError::parse(
                line,
                format!(
                    "expected at most {width} fields, found {}",
                    self.buffer.len()
                ),
            ));
        }

        let values = (0..width)
            .map(|idx| self.buffer.get(idx).map(str::to_owned))
            .collect();
        Ok(Record::new(Arc::clone(&self.schema), values))
    }
}
