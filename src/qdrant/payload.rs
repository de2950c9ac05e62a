//! Mapping between vector records and Qdrant points.

use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::store::{RecordMetadata, ScoredRecord, StoreError, VectorRecord};

/// Payload field holding the chunk id, indexed as a keyword.
pub(crate) const CHUNK_ID_FIELD: &str = "chunk_id";

/// Qdrant point ids must be UUIDs or integers; derive a UUID v5 from the chunk id so
/// re-inserting a chunk overwrites the same point.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// Build the point object for a record.
pub(crate) fn build_point(record: &VectorRecord) -> Value {
    let meta = &record.metadata;
    json!({
        "id": point_id(&record.id),
        "vector": record.vector,
        "payload": {
            CHUNK_ID_FIELD: record.id,
            "text": record.content,
            "source": meta.source,
            "page": meta.page,
            "sequence_in_page": meta.sequence_in_page,
            "content_hash": meta.content_hash,
            "ingested_at": meta.ingested_at,
            "inserted_at_micros": meta.inserted_at_micros,
            "batch_position": meta.batch_position,
        }
    })
}

/// Chunk id stored in a payload, if present.
pub(crate) fn chunk_id(payload: &Map<String, Value>) -> Option<&str> {
    payload.get(CHUNK_ID_FIELD).and_then(Value::as_str)
}

/// Rebuild a scored record from a query hit.
pub(crate) fn scored_record(
    score: f32,
    payload: Option<Map<String, Value>>,
) -> Result<ScoredRecord, StoreError> {
    let payload =
        payload.ok_or_else(|| StoreError::MalformedRecord("query hit without payload".into()))?;
    let id = chunk_id(&payload)
        .ok_or_else(|| StoreError::MalformedRecord(format!("missing {CHUNK_ID_FIELD}")))?
        .to_string();

    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::MalformedRecord(format!("{id}: missing {key}")))
    };
    let number = |key: &str| payload.get(key).and_then(Value::as_u64).unwrap_or_default();

    Ok(ScoredRecord {
        score,
        content: text("text")?,
        metadata: RecordMetadata {
            source: text("source")?,
            page: payload
                .get("page")
                .and_then(Value::as_u64)
                .and_then(|page| u32::try_from(page).ok()),
            sequence_in_page: u32::try_from(number("sequence_in_page")).unwrap_or_default(),
            content_hash: text("content_hash").unwrap_or_default(),
            ingested_at: text("ingested_at").unwrap_or_default(),
            inserted_at_micros: number("inserted_at_micros"),
            batch_position: u32::try_from(number("batch_position")).unwrap_or_default(),
        },
        id,
    })
}
