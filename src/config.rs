use std::fmt;

use tracing::level_filters::LevelFilter;

use crate::error::{IngestionError, IngestionResult};
use crate::logging;
use crate::types::TableName;

/// Default number of rows bound into one INSERT statement.
pub const DEFAULT_MAX_BATCH_ROWS: usize = 1_000;

/// Connection parameters for the target MySQL database.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// The configuration parameters for the function.
///
/// Read once at startup from environment variables and passed explicitly to the components that
/// need it:
///
/// | variable         | required | default |
/// |------------------|----------|---------|
/// | `mysql_endpoint` | yes      |         |
/// | `mysql_port`     | yes      |         |
/// | `mysql_username` | yes      |         |
/// | `mysql_password` | yes, may be empty | |
/// | `mysql_db`       | yes      |         |
/// | `mysql_table`    | yes      |         |
/// | `csv_delimiter`  | no       | `,`     |
/// | `log_level`      | no       | `INFO`  |
/// | `max_batch_rows` | no       | `1000`  |
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Target table, already validated.
    pub table: TableName,
    /// Single-byte field delimiter.
    pub delimiter: u8,
    pub log_level: LevelFilter,
    /// Upper bound on rows per INSERT statement.
    pub max_batch_rows: usize,
}

impl Config {
    pub fn from_env() -> IngestionResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> IngestionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| {
            lookup(name).ok_or_else(|| IngestionError::config(format!("{name} must be provided")))
        };
        let required = |name: &str| {
            let value = present(name)?;
            if value.is_empty() {
                return Err(IngestionError::config(format!("{name} must not be empty")));
            }
            Ok(value)
        };

        let port = required("mysql_port")?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| IngestionError::config(format!("mysql_port '{port}' is invalid: {e}")))?;

        let database = DatabaseConfig {
            host: required("mysql_endpoint")?,
            port,
            username: required("mysql_username")?,
            // An empty password is a valid MySQL credential.
            password: present("mysql_password")?,
            database: required("mysql_db")?,
        };

        let table = required("mysql_table")?;
        let table = TableName::parse(&table)
            .map_err(|e| IngestionError::config(format!("mysql_table: {e}")))?;

        let delimiter = match lookup("csv_delimiter") {
            Some(raw) => parse_delimiter(&raw)?,
            None => b',',
        };

        let log_level = match lookup("log_level") {
            Some(raw) => logging::parse_level(&raw)
                .ok_or_else(|| IngestionError::config(format!("log_level '{raw}' is not a level")))?,
            None => LevelFilter::INFO,
        };

        let max_batch_rows = match lookup("max_batch_rows") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    IngestionError::config(format!("max_batch_rows '{raw}' must be a positive integer"))
                })?,
            None => DEFAULT_MAX_BATCH_ROWS,
        };

        Ok(Config {
            database,
            table,
            delimiter,
            log_level,
            max_batch_rows,
        })
    }
}

fn parse_delimiter(raw: &str) -> IngestionResult<u8> {
    if matches!(raw, "\\t" | "tab" | "TAB") {
        return Ok(b'\t');
    }

    match raw.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
        _ => Err(IngestionError::config(format!(
            "csv_delimiter {raw:?} must be a single ASCII character"
        ))),
    }
}
