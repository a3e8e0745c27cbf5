use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::ClientError;

// ════════════════════════════════════════════════════════════════
//  Event
// ════════════════════════════════════════════════════════════════

/// A single ingested record: any JSON object.
///
/// Top-level members are kept as raw JSON text in wire order, so numbers
/// outside the f64 range, trailing zeros and explicit nulls come back out
/// byte for byte. `eventId`, `eventType` and `timestamp` are read on demand
/// and only when they hold a JSON string.
#[derive(Debug, Clone, Default)]
pub struct Event {
    fields: Vec<(String, Box<RawValue>)>,
}

impl Event {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: impl Into<String>,
        payload: Value,
    ) -> Result<Self, ClientError> {
        let mut event = Self::default();
        event.set("eventId", &event_id.into())?;
        event.set("eventType", &event_type.into())?;
        event.set("timestamp", &timestamp.into())?;
        event.set("payload", &payload)?;
        Ok(event)
    }

    /// Decode a raw broker message body.
    ///
    /// Any JSON object is accepted. An empty body (tombstone / null value),
    /// malformed JSON and non-object JSON are format errors.
    pub fn decode(bytes: &[u8]) -> Result<Self, ClientError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ClientError::format_err("empty message body"));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_ref())
    }

    /// Replace the member in place, or append it when absent.
    pub fn set(&mut self, key: &str, value: &impl Serialize) -> Result<(), ClientError> {
        let raw = serde_json::value::to_raw_value(value)?;
        self.insert_raw(key.to_owned(), raw);
        Ok(())
    }

    pub fn insert_raw(&mut self, key: String, value: Box<RawValue>) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn event_id(&self) -> Option<String> {
        self.string_field("eventId")
    }

    pub fn event_type(&self) -> Option<String> {
        self.string_field("eventType")
    }

    pub fn timestamp(&self) -> Option<String> {
        self.string_field("timestamp")
    }

    pub fn payload(&self) -> Option<&RawValue> {
        self.get("payload")
    }

    fn string_field(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
    }
}

/// Compact JSON, as it goes on the wire.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Members compare by key order and raw text.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((ka, va), (kb, vb))| ka == kb && va.get() == vb.get())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EventVisitor;

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = Event;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Event, A::Error> {
                let mut event = Event::default();
                // Duplicate keys: last one wins, at the first one's position.
                while let Some((key, value)) = map.next_entry::<String, Box<RawValue>>()? {
                    event.insert_raw(key, value);
                }
                Ok(event)
            }
        }

        deserializer.deserialize_map(EventVisitor)
    }
}

// ════════════════════════════════════════════════════════════════
//  Dead-letter envelope
// ════════════════════════════════════════════════════════════════

/// What lands on the dead-letter topic once every store attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEnvelope {
    pub original_event: Event,
    pub failed_reason: String,
    #[serde(with = "crate::util::iso_millis")]
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEnvelope {
    /// Stamp the envelope with the current time.
    pub fn new(original_event: Event, failed_reason: impl Into<String>) -> Self {
        Self {
            original_event,
            failed_reason: failed_reason.into(),
            failed_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ════════════════════════════════════════════════════════════════
//  Read side
// ════════════════════════════════════════════════════════════════

/// Event as returned by the read API, with the id the store assigned.
/// Serializes as one flat object, `_id` first.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: String,
    pub event: Event,
}

impl Serialize for StoredEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_id", &self.id)?;
        for (key, value) in self.event.fields().filter(|(k, _)| *k != "_id") {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Filter + pagination for listing stored events, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub event_type: Option<String>,
    /// Inclusive lower bound, compared as a string against `timestamp`.
    pub start_time: Option<String>,
    /// Inclusive upper bound, compared as a string against `timestamp`.
    pub end_time: Option<String>,
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            event_type: None,
            start_time: None,
            end_time: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl EventQuery {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.event_type
            && event.event_type().as_ref() != Some(t)
        {
            return false;
        }
        if self.start_time.is_none() && self.end_time.is_none() {
            return true;
        }
        // Non-string timestamps never fall inside a range.
        let Some(ts) = event.timestamp() else {
            return false;
        };
        if let Some(start) = &self.start_time
            && ts.as_str() < start.as_str()
        {
            return false;
        }
        if let Some(end) = &self.end_time
            && ts.as_str() > end.as_str()
        {
            return false;
        }
        true
    }
}
