#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use csv_ingest_lambda::ingestion::{
    BatchWriter, Database, InsertBatch, ObjectBody, ObjectStore, Pipeline, PipelineOptions,
    RecordReader, bulk_load,
};
use csv_ingest_lambda::types::{ObjectLocation, TableName};
use csv_ingest_lambda::{IngestionError, IngestionResult};
use serde_json::json;
use tokio::io::{AsyncRead, ReadBuf};

pub const TEST_BUCKET: &str = "test_bucket";
pub const TEST_KEY: &str = "some_file.csv";
pub const TEST_TABLE: &str = "test_table";
pub const FIELDS: [&str; 4] = ["this", "that", "the", "other"];

/// A committed row: `(column, value)` pairs in insert order.
pub type Row = Vec<(String, Option<String>)>;

/// `n` rows where every field of row `i` is `i`.
pub fn test_records(n: usize) -> Vec<Vec<String>> {
    (0..n).map(|i| vec![i.to_string(); FIELDS.len()]).collect()
}

/// The rows `test_records(n)` should turn into once loaded.
pub fn expected_rows(header: &[&str], rows: &[Vec<String>]) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            header
                .iter()
                .zip(row)
                .map(|(h, v)| (h.to_string(), Some(v.clone())))
                .collect()
        })
        .collect()
}

/// Serialize a header and rows as delimited text, the way a producer would.
pub fn csv_bytes(header: &[&str], rows: &[Vec<String>], delimiter: u8) -> Vec<u8> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    wtr.write_record(header).unwrap();
    for row in rows {
        wtr.write_record(row).unwrap();
    }
    wtr.into_inner().unwrap()
}

/// Notification payload as S3 sends it for a single put.
pub fn s3_event(bucket: &str, key: &str) -> serde_json::Value {
    json!({
        "Records": [
            {
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "2024-03-01T12:00:00.000Z",
                "eventName": "ObjectCreated:Put",
                "userIdentity": { "principalId": "AWS:EXAMPLE" },
                "requestParameters": { "sourceIPAddress": "127.0.0.1" },
                "responseElements": { "x-amz-request-id": "C3D13FE58DE4C810" },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "ingest",
                    "bucket": {
                        "name": bucket,
                        "ownerIdentity": { "principalId": "EXAMPLE" },
                        "arn": format!("arn:aws:s3:::{bucket}")
                    },
                    "object": { "key": key, "size": 0 }
                }
            }
        ]
    })
}

pub fn options() -> PipelineOptions {
    PipelineOptions::new(TableName::parse(TEST_TABLE).unwrap())
}

pub fn pipeline(
    store: &MemoryStore,
    db: &MemoryDatabase,
    options: PipelineOptions,
) -> Pipeline<MemoryStore, MemoryDatabase> {
    Pipeline::new(store.clone(), db.clone(), options)
}

/// Hands out one byte per read, so nothing downstream can rely on chunk boundaries.
struct Trickle {
    bytes: Vec<u8>,
    pos: usize,
}

impl AsyncRead for Trickle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pos < self.bytes.len() && buf.remaining() > 0 {
            let byte = self.bytes[self.pos];
            buf.put_slice(&[byte]);
            self.pos += 1;
        }
        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<(String, String), Vec<u8>>,
    denied: HashSet<(String, String)>,
    opens: usize,
}

/// In-memory object store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    trickle: bool,
}

impl MemoryStore {
    /// Bodies are served one byte per read.
    pub fn trickling() -> Self {
        Self {
            trickle: true,
            ..Self::default()
        }
    }

    pub fn put(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn deny(&self, bucket: &str, key: &str) {
        self.state
            .lock()
            .unwrap()
            .denied
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open(&self, location: &ObjectLocation) -> IngestionResult<ObjectBody> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;

        let id = (location.bucket.clone(), location.key.clone());
        if state.denied.contains(&id) {
            return Err(IngestionError::AccessDenied {
                bucket: id.0,
                key: id.1,
            });
        }

        let bytes = state
            .objects
            .get(&id)
            .cloned()
            .ok_or(IngestionError::ObjectNotFound {
                bucket: id.0,
                key: id.1,
            })?;

        if self.trickle {
            Ok(Box::pin(Trickle { bytes, pos: 0 }))
        } else {
            Ok(Box::pin(Cursor::new(bytes)))
        }
    }
}

#[derive(Default)]
pub struct DbState {
    pub committed: Vec<Row>,
    pub statements: Vec<String>,
    pub connects: usize,
    pub closes: usize,
    pub released: usize,
}

/// In-memory stand-in for the target database.
///
/// Rows written by a connection are staged and only become visible in `committed` once the load
/// finishes without error, mirroring one transaction per run.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DbState>>,
    reject_value: Option<String>,
    refuse_connections: bool,
}

impl MemoryDatabase {
    /// Any batch containing `value` fails, like a constraint violation would.
    pub fn rejecting(value: &str) -> Self {
        Self {
            reject_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            refuse_connections: true,
            ..Self::default()
        }
    }

    pub fn committed(&self) -> Vec<Row> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.connects, state.closes, state.released)
    }
}

pub struct MemoryConnection {
    state: Arc<Mutex<DbState>>,
    staged: Vec<Row>,
    reject_value: Option<String>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.lock().unwrap().released += 1;
    }
}

#[async_trait]
impl BatchWriter for MemoryConnection {
    async fn write_batch(&mut self, batch: InsertBatch<'_>) -> IngestionResult<u64> {
        let sql = batch.to_query().sql().to_string();
        self.state.lock().unwrap().statements.push(sql);

        if let Some(bad) = self.reject_value.as_deref() {
            let hit = batch
                .rows
                .iter()
                .any(|r| r.values().iter().any(|v| v.as_deref() == Some(bad)));
            if hit {
                return Err(IngestionError::Load(sqlx::Error::Protocol(format!(
                    "constraint violated by value '{bad}'"
                ))));
            }
        }

        for record in batch.rows {
            self.staged.push(
                record
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.map(str::to_owned)))
                    .collect(),
            );
        }
        Ok(batch.rows.len() as u64)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Connection = MemoryConnection;

    async fn connect(&self) -> IngestionResult<MemoryConnection> {
        if self.refuse_connections {
            return Err(IngestionError::Connection(sqlx::Error::PoolTimedOut));
        }
        self.state.lock().unwrap().connects += 1;
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
            reject_value: self.reject_value.clone(),
        })
    }

    async fn load(
        &self,
        conn: &mut MemoryConnection,
        table: &TableName,
        reader: &mut RecordReader,
        max_batch_rows: usize,
    ) -> IngestionResult<u64> {
        conn.staged.clear();
        match bulk_load(conn, table, reader, max_batch_rows).await {
            Ok(rows) => {
                let staged = std::mem::take(&mut conn.staged);
                self.state.lock().unwrap().committed.extend(staged);
                Ok(rows)
            }
            Err(err) => {
                conn.staged.clear();
                Err(err)
            }
        }
    }

    async fn close(&self, conn: MemoryConnection) -> IngestionResult<()> {
        self.state.lock().unwrap().closes += 1;
        drop(conn);
        Ok(())
    }
}
