use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

use event_api::{ClientError, Event, EventQuery, EventReader, EventStore, StoredEvent};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

fn default_uri() -> String {
    "mongodb://localhost:27017".into()
}
fn default_database() -> String {
    "eventsDB".into()
}
fn default_collection() -> String {
    "events".into()
}
fn default_server_selection_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MongoStoreConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// How long an operation waits for a usable server before failing.
    #[serde(default = "default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
}

impl Default for MongoStoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
            server_selection_timeout_ms: default_server_selection_timeout_ms(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MongoEventStore
// ═══════════════════════════════════════════════════════════════

/// MongoDB-backed store: one document per event, `_id` generated by the
/// server-side driver.
pub struct MongoEventStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoEventStore {
    /// Build the client and ping the database. Fails if the server is not
    /// reachable within the selection timeout.
    pub async fn connect(config: &MongoStoreConfig) -> Result<Self, ClientError> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| ClientError::config(format!("mongo uri: {e}")))?;
        options.app_name = Some("event-ingest".into());
        options.server_selection_timeout = Some(Duration::from_millis(config.server_selection_timeout_ms));

        let client = Client::with_options(options).map_err(|e| ClientError::config(format!("mongo client: {e}")))?;
        let db = client.database(&config.database);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ClientError::config(format!("mongo ping: {e}")))?;

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "connected to MongoDB"
        );

        Ok(Self {
            collection: db.collection(&config.collection),
            client,
        })
    }
}

impl EventStore for MongoEventStore {
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let document = event_to_document(event)?;
            let result = self.collection.insert_one(document).await.map_err(from_mongo)?;
            Ok(id_to_string(&result.inserted_id))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            self.client.clone().shutdown().await;
            tracing::info!("MongoDB client closed");
            Ok(())
        })
    }
}

impl EventReader for MongoEventStore {
    fn find<'a>(
        &'a self,
        query: &'a EventQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
            let mut cursor = self
                .collection
                .find(query_filter(query))
                .sort(doc! { "_id": -1 })
                .skip(query.skip())
                .limit(limit)
                .await
                .map_err(from_mongo)?;

            let mut out = Vec::new();
            while cursor.advance().await.map_err(from_mongo)? {
                let document = cursor.deserialize_current().map_err(from_mongo)?;
                out.push(document_to_stored(document)?);
            }
            Ok(out)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Conversions
// ═══════════════════════════════════════════════════════════════

fn from_mongo(e: mongodb::error::Error) -> ClientError {
    match *e.kind {
        mongodb::error::ErrorKind::Write(_) => ClientError::rejected(e.to_string()),
        _ => ClientError::io(e.to_string()),
    }
}

/// Member by member, in wire order. Integers that fit in 64 bits stay
/// integers; anything else numeric becomes a double.
fn event_to_document(event: &Event) -> Result<Document, ClientError> {
    let mut document = Document::new();
    for (key, raw) in event.fields() {
        let json: serde_json::Value = serde_json::from_str(raw.get())?;
        let value = Bson::try_from(json).map_err(|e| ClientError::format_err(format!("{key} to bson: {e}")))?;
        document.insert(key, value);
    }
    Ok(document)
}

fn document_to_stored(mut document: Document) -> Result<StoredEvent, ClientError> {
    let id = document.remove("_id").map(|id| id_to_string(&id)).unwrap_or_default();
    let mut event = Event::default();
    for (key, value) in document {
        let raw = serde_json::value::to_raw_value(&value.into_relaxed_extjson())?;
        event.insert_raw(key, raw);
    }
    Ok(StoredEvent { id, event })
}

fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `eventType` equality plus inclusive `timestamp` range.
fn query_filter(query: &EventQuery) -> Document {
    let mut filter = Document::new();
    if let Some(t) = &query.event_type {
        filter.insert("eventType", t.as_str());
    }
    if query.start_time.is_some() || query.end_time.is_some() {
        let mut range = Document::new();
        if let Some(start) = &query.start_time {
            range.insert("$gte", start.as_str());
        }
        if let Some(end) = &query.end_time {
            range.insert("$lte", end.as_str());
        }
        filter.insert("timestamp", range);
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    fn signup() -> Event {
        Event::new("e1", "user_signup", "2024-01-01T00:00:00Z", json!({"randomValue": 42})).unwrap()
    }

    #[test]
    fn event_document_uses_wire_field_names() {
        let d = event_to_document(&signup()).unwrap();
        assert_eq!(d.get_str("eventId").unwrap(), "e1");
        assert_eq!(d.get_str("eventType").unwrap(), "user_signup");
        assert!(d.get_document("payload").is_ok());
    }

    #[test]
    fn stored_document_round_trips_with_hex_id() {
        let oid = ObjectId::new();
        let mut d = event_to_document(&signup()).unwrap();
        d.insert("_id", oid);

        let stored = document_to_stored(d).unwrap();
        assert_eq!(stored.id, oid.to_hex());
        assert_eq!(stored.event, signup());
        assert_eq!(stored.event.payload().map(|p| p.get()), Some(r#"{"randomValue":42}"#));
    }

    #[test]
    fn loose_events_keep_their_shape() {
        let raw = br#"{"eventId":"n","timestamp":1700000000,"payload":null,"source":"web","tags":["a",{"b":2}]}"#;
        let event = Event::decode(raw).unwrap();

        let d = event_to_document(&event).unwrap();
        assert_eq!(d.keys().collect::<Vec<_>>(), ["eventId", "timestamp", "payload", "source", "tags"]);
        assert_eq!(d.get("timestamp"), Some(&Bson::Int32(1_700_000_000)));
        assert_eq!(d.get("payload"), Some(&Bson::Null));

        let stored = document_to_stored(d).unwrap();
        assert_eq!(stored.event.to_bytes().unwrap(), raw.to_vec());
    }

    #[test]
    fn unrepresentable_integers_are_stored_as_doubles() {
        let event = Event::decode(br#"{"eventId":"big","payload":{"amount":123456789012345678901234567890}}"#).unwrap();
        let d = event_to_document(&event).unwrap();
        let amount = d.get_document("payload").unwrap().get("amount");
        assert!(matches!(amount, Some(Bson::Double(_))), "{amount:?}");
    }

    #[test]
    fn filter_only_includes_given_bounds() {
        let q = EventQuery {
            event_type: Some("user_signup".into()),
            start_time: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert_eq!(
            query_filter(&q),
            doc! { "eventType": "user_signup", "timestamp": { "$gte": "2024-01-01" } }
        );
        assert_eq!(query_filter(&EventQuery::default()), Document::new());
    }
}
