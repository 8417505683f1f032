//! Tagged-variant wire codec for task payloads.
//!
//! Every domain record that crosses a process boundary (the Redis task
//! queue, the K/V store, the event bus) is wrapped in an [`Envelope`]
//! carrying the record's fully qualified type tag, so the receiver can
//! reconstitute the right type.
//!
//! Plain JSON rather than a binary format: every consumer here (Redis, the
//! task queue, the chat stream) already speaks JSON and the debuggability
//! is worth the few extra bytes on the wire.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KollektivError, Result};
use crate::models::{
    Chunk, ContentProcessingEvent, Conversation, ConversationHistory, ConversationMessage,
    Document, Job, ProcessingTask, Source, SourceSummary,
};

/// A type that can be identified on the wire by a stable tag.
///
/// Implemented for every in-scope domain record. New record types just need
/// a `const TAG` naming them uniquely; the impl block at the bottom of this
/// module enumerates all of them.
pub trait Tagged: Serialize + DeserializeOwned {
    const TAG: &'static str;
}

macro_rules! tagged {
    ($ty:ty, $tag:literal) => {
        impl Tagged for $ty {
            const TAG: &'static str = $tag;
        }
    };
}

tagged!(Source, "kollektiv.core.models.Source");
tagged!(Job, "kollektiv.core.models.Job");
tagged!(Document, "kollektiv.core.models.Document");
tagged!(Chunk, "kollektiv.core.models.Chunk");
tagged!(SourceSummary, "kollektiv.core.models.SourceSummary");
tagged!(Conversation, "kollektiv.core.models.Conversation");
tagged!(
    ConversationMessage,
    "kollektiv.core.models.ConversationMessage"
);
tagged!(
    ConversationHistory,
    "kollektiv.core.models.ConversationHistory"
);
tagged!(
    ContentProcessingEvent,
    "kollektiv.core.models.ContentProcessingEvent"
);
tagged!(ProcessingTask, "kollektiv.core.models.ProcessingTask");

/// The on-wire envelope: a type tag plus the record's own JSON
/// representation.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "__tag__")]
    tag: String,
    data: serde_json::Value,
}

/// Encode a tagged record to bytes.
///
/// Fails only when the value cannot be represented as JSON at all (e.g. it
/// contains a `NaN`/`Infinity` float).
pub fn encode<T: Tagged>(value: &T) -> Result<Vec<u8>> {
    let data = serde_json::to_value(value)
        .map_err(|e| KollektivError::Serialization(format!("encode {}: {e}", T::TAG)))?;
    let envelope = Envelope {
        tag: T::TAG.to_string(),
        data,
    };
    serde_json::to_vec(&envelope)
        .map_err(|e| KollektivError::Serialization(format!("encode envelope: {e}")))
}

/// Decode bytes previously produced by [`encode`], checking that the wire
/// tag matches the type requested.
pub fn decode<T: Tagged>(bytes: &[u8]) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| KollektivError::Serialization(format!("decode envelope: {e}")))?;
    if envelope.tag != T::TAG {
        return Err(KollektivError::Serialization(format!(
            "tag mismatch: expected {}, got {}",
            T::TAG,
            envelope.tag
        )));
    }
    serde_json::from_value(envelope.data)
        .map_err(|e| KollektivError::Serialization(format!("decode {}: {e}", T::TAG)))
}

/// The result of decoding a payload of unknown origin. Used by generic
/// consumers (the task queue's dequeue loop) that must dispatch on the tag
/// rather than assume a single type.
#[derive(Debug)]
pub enum DecodedValue {
    /// The tag matched a record type this build knows about.
    Known { tag: String, data: serde_json::Value },
    /// The tag was not recognised. Decode still succeeds; the caller gets
    /// the raw mapping back, with a logged warning.
    Unknown { tag: String, data: serde_json::Value },
}

const KNOWN_TAGS: &[&str] = &[
    Source::TAG,
    Job::TAG,
    Document::TAG,
    Chunk::TAG,
    SourceSummary::TAG,
    Conversation::TAG,
    ConversationMessage::TAG,
    ConversationHistory::TAG,
    ContentProcessingEvent::TAG,
    ProcessingTask::TAG,
];

/// Decode bytes without knowing the concrete type up front.
pub fn decode_dynamic(bytes: &[u8]) -> Result<DecodedValue> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| KollektivError::Serialization(format!("decode envelope: {e}")))?;
    if KNOWN_TAGS.contains(&envelope.tag.as_str()) {
        Ok(DecodedValue::Known {
            tag: envelope.tag,
            data: envelope.data,
        })
    } else {
        tracing::warn!(tag = %envelope.tag, "decoding unrecognised tag to raw mapping");
        Ok(DecodedValue::Unknown {
            tag: envelope.tag,
            data: envelope.data,
        })
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// A timestamp that remembers whether it carried a timezone, so that
/// timezone-naive and timezone-aware instants round-trip distinctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__ts__", rename_all = "snake_case")]
pub enum Timestamp {
    Naive { value: NaiveDateTime },
    Aware { value: DateTime<Utc> },
}

impl Timestamp {
    pub fn naive(value: NaiveDateTime) -> Self {
        Self::Naive { value }
    }

    pub fn aware(value: DateTime<Utc>) -> Self {
        Self::Aware { value }
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, Timestamp::Aware { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_summary() -> SourceSummary {
        SourceSummary {
            summary_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            summary: "a summary".into(),
            keywords: vec!["rag".into(), "chunking".into()],
        }
    }

    #[test]
    fn round_trip_equality() {
        let original = sample_summary();
        let bytes = encode(&original).expect("encode");
        let decoded: SourceSummary = decode(&bytes).expect("decode");
        assert_eq!(decoded.summary_id, original.summary_id);
        assert_eq!(decoded.summary, original.summary);
        assert_eq!(decoded.keywords, original.keywords);
    }

    #[test]
    fn unknown_tag_falls_back_to_raw_mapping() {
        let envelope = Envelope {
            tag: "some.future.Type".into(),
            data: serde_json::json!({"a": 1}),
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();
        match decode_dynamic(&bytes).unwrap() {
            DecodedValue::Unknown { tag, data } => {
                assert_eq!(tag, "some.future.Type");
                assert_eq!(data["a"], 1);
            }
            DecodedValue::Known { .. } => panic!("expected unknown tag"),
        }
    }

    #[test]
    fn tag_mismatch_is_rejected() {
        let original = sample_summary();
        let bytes = encode(&original).expect("encode");
        let result: Result<Document> = decode(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn naive_and_aware_timestamps_round_trip_distinctly() {
        let naive = Timestamp::naive(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let aware = Timestamp::aware(Utc::now());

        let naive_json = serde_json::to_string(&naive).unwrap();
        let aware_json = serde_json::to_string(&aware).unwrap();

        let naive_back: Timestamp = serde_json::from_str(&naive_json).unwrap();
        let aware_back: Timestamp = serde_json::from_str(&aware_json).unwrap();

        assert!(!naive_back.is_aware());
        assert!(aware_back.is_aware());
    }
}
