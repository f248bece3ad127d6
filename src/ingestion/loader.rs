//! Bulk loader: turn a record stream into batched multi-row INSERT statements.
//!
//! The column list of every statement is the file's header, in header order. Every value is a
//! bind parameter; only the table and column identifiers are spliced into SQL text, and both are
//! validated first.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, MySql, QueryBuilder};

use crate::config::DatabaseConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::types::{FieldSchema, Record, TableName, quote_identifier};

use super::source::RecordReader;

/// MySQL refuses prepared statements with more placeholders than this.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// A run of rows destined for a single INSERT statement.
#[derive(Debug, Clone, Copy)]
pub struct InsertBatch<'a> {
    pub table: &'a TableName,
    pub schema: &'a FieldSchema,
    pub rows: &'a [Record],
}

impl<'a> InsertBatch<'a> {
    /// Build the `INSERT INTO ... VALUES (...), (...)` statement for this batch.
    ///
    /// Unset values bind as `NULL`.
    pub fn to_query(&self) -> QueryBuilder<'a, MySql> {
        let columns = self
            .schema
            .field_names()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(",");

        let mut query = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            self.table.quoted(),
            columns
        ));
        query.push_values(self.rows, |mut b, record| {
            for value in record.values() {
                b.push_bind(value.as_deref());
            }
        });
        query
    }
}

/// Something that can execute one [`InsertBatch`] and report how many rows it wrote.
#[async_trait]
pub trait BatchWriter: Send {
    async fn write_batch(&mut self, batch: InsertBatch<'_>) -> IngestionResult<u64>;
}

#[async_trait]
impl BatchWriter for MySqlConnection {
    async fn write_batch(&mut self, batch: InsertBatch<'_>) -> IngestionResult<u64> {
        let result = batch
            .to_query()
            .build()
            .execute(&mut *self)
            .await
            .map_err(IngestionError::Load)?;
        Ok(result.rows_affected())
    }
}

/// Rows per statement: `max_batch_rows`, capped so the placeholder count stays under
/// [`MAX_BIND_PARAMETERS`].
pub fn rows_per_statement(columns: usize, max_batch_rows: usize) -> usize {
    (MAX_BIND_PARAMETERS / columns.max(1)).min(max_batch_rows).max(1)
}

/// Drain `reader` into `writer`, one statement per batch.
///
/// Column identifiers are validated before the first row is read. A header-only file issues no
/// statement at all. Commit is left to the caller so that every batch of the file shares one
/// transaction.
pub async fn bulk_load<W>(
    writer: &mut W,
    table: &TableName,
    reader: &mut RecordReader,
    max_batch_rows: usize,
) -> IngestionResult<u64>
where
    W: BatchWriter + ?Sized,
{
    let schema = reader.schema().clone();
    schema.validate_identifiers()?;

    let batch_rows = rows_per_statement(schema.len(), max_batch_rows);
    let mut pending: Vec<Record> = Vec::with_capacity(batch_rows);
    let mut written = 0u64;
    let mut statements = 0usize;

    while let Some(record) = reader.next_record().await {
        pending.push(record?);
        if pending.len() == batch_rows {
            written += flush(writer, table, &schema, &pending).await?;
            statements += 1;
            pending.clear();
        }
    }

    if !pending.is_empty() {
        written += flush(writer, table, &schema, &pending).await?;
        statements += 1;
    }

    tracing::debug!(rows = written, statements, batch_rows, "bulk insert finished");
    Ok(written)
}

async fn flush<W>(
    writer: &mut W,
    table: &TableName,
    schema: &FieldSchema,
    rows: &[Record],
) -> IngestionResult<u64>
where
    W: BatchWriter + ?Sized,
{
    tracing::trace!(rows = rows.len(), "writing batch");
    writer
        .write_batch(InsertBatch {
            table,
            schema,
            rows,
        })
        .await
}

/// Access to the target database, one exclusively owned connection per run.
#[async_trait]
pub trait Database: Send + Sync {
    type Connection: Send;

    /// Open a connection. Failures map to [`IngestionError::Connection`].
    async fn connect(&self) -> IngestionResult<Self::Connection>;

    /// Insert every record of `reader` into `table` and commit, as one transaction.
    async fn load(
        &self,
        conn: &mut Self::Connection,
        table: &TableName,
        reader: &mut RecordReader,
        max_batch_rows: usize,
    ) -> IngestionResult<u64>;

    /// Release the connection. Dropping it without calling this also releases it.
    async fn close(&self, conn: Self::Connection) -> IngestionResult<()>;
}

/// [`Database`] backed by a single MySQL connection.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    config: DatabaseConfig,
}

impl MySqlDatabase {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    type Connection = MySqlConnection;

    #[tracing::instrument(skip(self), fields(host = %self.config.host, database = %self.config.database))]
    async fn connect(&self) -> IngestionResult<MySqlConnection> {
        self.connect_options()
            .connect()
            .await
            .map_err(IngestionError::Connection)
    }

    #[tracing::instrument(skip(self, conn, table, reader), fields(table = %table))]
    async fn load(
        &self,
        conn: &mut MySqlConnection,
        table: &TableName,
        reader: &mut RecordReader,
        max_batch_rows: usize,
    ) -> IngestionResult<u64> {
        let mut tx = conn.begin().await.map_err(IngestionError::Load)?;
        // An early return drops `tx`, which rolls it back.
        let rows = bulk_load(&mut *tx, table, reader, max_batch_rows).await?;
        tx.commit().await.map_err(IngestionError::Load)?;
        Ok(rows)
    }

    async fn close(&self, conn: MySqlConnection) -> IngestionResult<()> {
        conn.close().await.map_err(IngestionError::Connection)
    }
}
