//! Core data model types for ingestion.
//!
//! A run reads one object ([`ObjectLocation`]), derives a [`FieldSchema`] from its header row and
//! streams [`Record`]s aligned with that schema into a table named by a [`TableName`].

use std::fmt;
use std::sync::Arc;

use crate::error::{IngestionError, IngestionResult};

/// The object a notification points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Bucket (container) name.
    pub bucket: String,
    /// Object key within the bucket, already URL-decoded.
    pub key: String,
}

impl ObjectLocation {
    /// Create a new location.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// MySQL's limit on table and column name length.
const MAX_IDENTIFIER_CHARS: usize = 64;

/// Ordered, unique column names taken from the header row of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    names: Vec<String>,
}

impl FieldSchema {
    /// Build a schema from header names.
    ///
    /// Rejects empty headers, empty names and duplicate names. Names are not checked against the
    /// identifier allowlist here; see [`FieldSchema::validate_identifiers`].
    pub fn from_header<I, S>(names: I) -> IngestionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(IngestionError::parse(1, "missing header row"));
        }

        for (idx, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(IngestionError::parse(
                    1,
                    format!("empty column name at position {}", idx + 1),
                ));
            }
            if names[..idx].contains(name) {
                return Err(IngestionError::parse(
                    1,
                    format!("duplicate column name '{name}'"),
                ));
            }
        }

        Ok(Self { names })
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false` for a schema built through [`FieldSchema::from_header`].
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Check every column name before it reaches SQL text.
    ///
    /// Names are backtick-quoted, so anything MySQL accepts inside a quoted identifier passes:
    /// at most 64 characters from the Basic Multilingual Plane, no trailing space. Backticks and
    /// control characters (NUL included) are refused, as are blank names.
    pub fn validate_identifiers(&self) -> IngestionResult<()> {
        for name in &self.names {
            let allowed = name
                .chars()
                .all(|c| c != '`' && !c.is_control() && u32::from(c) <= 0xFFFF);
            if !allowed
                || name.trim().is_empty()
                || name.ends_with(' ')
                || name.chars().count() > MAX_IDENTIFIER_CHARS
            {
                return Err(IngestionError::InvalidIdentifier {
                    kind: "column",
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One data row, positionally aligned with its [`FieldSchema`].
///
/// Values are passed through exactly as parsed. `None` marks a field the row did not supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: Arc<FieldSchema>,
    values: Vec<Option<String>>,
}

impl Record {
    pub(crate) fn new(schema: Arc<FieldSchema>, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self { schema, values }
    }

    /// Value for `name`, or `None` if the column is unknown or the row did not supply it.
    pub fn get(&self, name: &str) -> Option<&str> {
        let idx = self.schema.index_of(name)?;
        self.values[idx].as_deref()
    }

    /// Values in schema order.
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.schema
            .field_names()
            .zip(self.values.iter().map(|v| v.as_deref()))
    }
}

/// A validated `table` or `database.table` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    parts: Vec<String>,
}

impl TableName {
    /// Parse and validate a table name. Each dot-separated part must match `[A-Za-z0-9_$]+`.
    pub fn parse(raw: &str) -> IngestionResult<Self> {
        let parts: Vec<String> = raw.split('.').map(str::to_owned).collect();
        let valid = parts.len() <= 2
            && parts.iter().all(|p| {
                !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            });
        if !valid {
            return Err(IngestionError::InvalidIdentifier {
                kind: "table",
                name: raw.to_owned(),
            });
        }
        Ok(Self { parts })
    }

    /// Backtick-quoted form for use in SQL text.
    pub fn quoted(&self) -> String {
        self.parts
            .iter()
            .map(|p| quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

/// Quote an identifier that has already passed the allowlist.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{name}`")
}
