//! S3 notification payload → [`ObjectLocation`].

use aws_lambda_events::event::s3::S3Event;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::error::{IngestionError, IngestionResult};
use crate::types::ObjectLocation;

fn malformed(message: impl Into<String>) -> IngestionError {
    IngestionError::MalformedEvent {
        message: message.into(),
    }
}

/// Extract the object to ingest from an S3 notification payload.
///
/// Only `Records[0]` is used. A single upload produces a single notification, so any further
/// records are logged and ignored rather than loaded. Object keys arrive form-encoded and are
/// decoded here.
pub fn object_location_from_event(payload: &serde_json::Value) -> IngestionResult<ObjectLocation> {
    let event = S3Event::deserialize(payload).map_err(|e| malformed(e.to_string()))?;

    let mut records = event.records.into_iter();
    let first = records
        .next()
        .ok_or_else(|| malformed("event contains no records"))?;

    let ignored = records.count();
    if ignored > 0 {
        tracing::warn!(ignored, "event carries more than one record, only the first is ingested");
    }

    let bucket = first
        .s3
        .bucket
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("bucket name is missing or empty"))?;

    let raw_key = first
        .s3
        .object
        .key
        .ok_or_else(|| malformed("object key is missing"))?;
    let key = decode_key(&raw_key)?;
    if key.is_empty() {
        return Err(malformed("object key is empty"));
    }

    Ok(ObjectLocation { bucket, key })
}

fn decode_key(raw: &str) -> IngestionResult<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| malformed(format!("object key '{raw}' is not valid UTF-8 once decoded: {e}")))
}
