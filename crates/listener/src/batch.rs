//! Batch decoding: stream JSON to change events.

use reconcile::{ChangeEvent, EventId, Operation, TableName, Timestamp};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::wire::{image, StreamRecord};

/// The batch as a whole could not be read.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot read change batch from {source_name}: {source}")]
    Read {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("change batch is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why one record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("unknown event name '{0}'")]
    UnknownEventName(String),

    #[error("cannot derive a table name from '{0}'")]
    UnknownTable(String),

    #[error("{operation} record without {image} image")]
    MissingImage { operation: Operation, image: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position of the record in the batch.
    pub index: usize,
    pub event_id: Option<String>,
    pub error: RecordError,
}

#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub events: Vec<ChangeEvent>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Records", default)]
    records: Vec<Value>,
}

/// Extracts the table name from a stream ARN
/// (`arn:aws:dynamodb:<region>:<account>:table/<name>/stream/<label>`).
pub fn table_from_arn(arn: &str) -> Option<TableName> {
    let (_, rest) = arn.split_once(":table/")?;
    let name = rest.split('/').next()?;
    TableName::new(name)
}

/// Parses a batch, keeping every record that converts cleanly.
pub fn parse_batch(raw: &[u8]) -> Result<ParsedBatch, ListenerError> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    let mut batch = ParsedBatch::default();

    for (index, record) in envelope.records.into_iter().enumerate() {
        let event_id = record.get("eventID").and_then(Value::as_str).map(str::to_string);
        match convert(index, record) {
            Ok(event) => batch.events.push(event),
            Err(error) => {
                warn!(index, event_id = ?event_id, error = %error, "rejected stream record");
                batch.rejected.push(RejectedRecord { index, event_id, error });
            }
        }
    }

    debug!(events = batch.events.len(), rejected = batch.rejected.len(), "parsed change batch");
    Ok(batch)
}

fn convert(index: usize, record: Value) -> Result<ChangeEvent, RecordError> {
    let record: StreamRecord =
        serde_json::from_value(record).map_err(|e| RecordError::Malformed(e.to_string()))?;

    let operation =
        Operation::parse(&record.event_name).ok_or_else(|| RecordError::UnknownEventName(record.event_name.clone()))?;
    let table = table_from_arn(&record.event_source_arn)
        .ok_or_else(|| RecordError::UnknownTable(record.event_source_arn.clone()))?;
    // Records without an id still need one for attribution.
    let event_id = record
        .event_id
        .and_then(EventId::new)
        .or_else(|| EventId::new(format!("record-{index}")))
        .ok_or_else(|| RecordError::Malformed("empty event id".to_string()))?;

    let payload = record.dynamodb;
    let before = payload.old_image.map(image);
    let after = payload.new_image.map(image);
    match operation {
        Operation::Insert | Operation::Modify if after.is_none() => {
            return Err(RecordError::MissingImage { operation, image: "new" })
        }
        Operation::Modify | Operation::Remove if before.is_none() => {
            return Err(RecordError::MissingImage { operation, image: "old" })
        }
        _ => {}
    }

    Ok(ChangeEvent {
        event_id,
        table,
        operation,
        before,
        after,
        approximate_creation: payload.approximate_creation_date_time.and_then(Timestamp::from_epoch_seconds),
    })
}
