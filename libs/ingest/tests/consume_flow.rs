//! End-to-end run of the consumption loop over in-memory collaborators.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use event_api::{
    ClientError, DeadLetterEnvelope, Event, EventStore, InboundMessage, MessageSource, TopicProducer,
};
use ingest::{DeadLetterPublisher, RetryController, spawn_consumer};

/// Rejects every insert of the listed event ids; the first `flaky` inserts
/// of any other id fail once each.
#[derive(Default)]
struct Store {
    rejected: HashSet<String>,
    flaky_failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<Vec<String>>,
    stored: Mutex<Vec<Event>>,
}

impl Store {
    fn rejecting(ids: &[&str]) -> Self {
        Self {
            rejected: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn flaky(self, id: &str, failures: u32) -> Self {
        self.flaky_failures.lock().unwrap().insert(id.to_string(), failures);
        self
    }

    fn attempts_for(&self, id: &str) -> usize {
        self.attempts.lock().unwrap().iter().filter(|a| *a == id).count()
    }

    fn stored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stored.lock().unwrap().iter().map(|e| e.event_id().unwrap_or_default()).collect();
        ids.sort();
        ids
    }
}

impl EventStore for Store {
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let id = event.event_id().unwrap_or_default();
            self.attempts.lock().unwrap().push(id.clone());
            if self.rejected.contains(&id) {
                return Err(ClientError::io("connection reset"));
            }
            if let Some(left) = self.flaky_failures.lock().unwrap().get_mut(&id)
                && *left > 0
            {
                *left -= 1;
                return Err(ClientError::io("timeout"));
            }
            let mut stored = self.stored.lock().unwrap();
            stored.push(event.clone());
            Ok(format!("{:024x}", stored.len()))
        })
    }
}

#[derive(Default)]
struct DeadLetters {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl TopicProducer for DeadLetters {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        _key: Option<&'a str>,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push((topic.to_string(), value.to_vec()));
            Ok(())
        })
    }
}

struct Source {
    pending: Mutex<VecDeque<InboundMessage>>,
    commits: Mutex<Vec<(i32, i64)>>,
}

impl Source {
    fn new(messages: Vec<InboundMessage>) -> Self {
        Self {
            pending: Mutex::new(messages.into()),
            commits: Mutex::new(Vec::new()),
        }
    }

    fn commits_for(&self, partition: i32) -> Vec<i64> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == partition)
            .map(|(_, o)| *o)
            .collect()
    }
}

impl MessageSource for Source {
    fn recv(&self) -> Pin<Box<dyn Future<Output = Option<Result<InboundMessage, ClientError>>> + Send + '_>> {
        Box::pin(async move { self.pending.lock().unwrap().pop_front().map(Ok) })
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), ClientError> {
        self.commits.lock().unwrap().push((message.partition, message.offset));
        Ok(())
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

fn event(id: &str) -> Event {
    Event::new(id, "user_signup", "2024-01-01T00:00:00.000Z", json!({"randomValue": 42})).unwrap()
}

fn msg(partition: i32, offset: i64, body: Vec<u8>) -> InboundMessage {
    InboundMessage {
        topic: "events".into(),
        partition,
        offset,
        payload: Some(body),
    }
}

fn body(id: &str) -> Vec<u8> {
    event(id).to_bytes().unwrap()
}

async fn run(store: Arc<Store>, dead_letters: Arc<DeadLetters>, source: Arc<Source>) {
    let retry = RetryController::new(store, DeadLetterPublisher::new(dead_letters, "events-dlq"), 3);
    spawn_consumer(source, Arc::new(retry), 8, CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn exhausted_event_is_dead_lettered_and_the_rest_are_stored() {
    let store = Arc::new(Store::rejecting(&["p1-bad"]));
    let dead_letters = Arc::new(DeadLetters::default());
    let source = Arc::new(Source::new(vec![
        msg(0, 0, body("p0-a")),
        msg(1, 0, body("p1-a")),
        msg(1, 1, body("p1-bad")),
        msg(0, 1, body("p0-b")),
        msg(1, 2, body("p1-c")),
    ]));

    run(store.clone(), dead_letters.clone(), source.clone()).await;

    assert_eq!(store.stored_ids(), vec!["p0-a", "p0-b", "p1-a", "p1-c"]);
    assert_eq!(store.attempts_for("p1-bad"), 3);

    let sent = dead_letters.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "events-dlq");
    let envelope = DeadLetterEnvelope::from_bytes(&sent[0].1).unwrap();
    assert_eq!(envelope.original_event, event("p1-bad"));
    assert_eq!(envelope.failed_reason, "connection reset");

    assert_eq!(source.commits_for(0), vec![0, 1]);
    assert_eq!(source.commits_for(1), vec![0, 1, 2]);
}

#[tokio::test]
async fn transient_failures_recover_without_dead_letter() {
    let store = Arc::new(Store::default().flaky("e1", 2));
    let dead_letters = Arc::new(DeadLetters::default());
    let source = Arc::new(Source::new(vec![msg(0, 5, body("e1"))]));

    run(store.clone(), dead_letters.clone(), source.clone()).await;

    assert_eq!(store.attempts_for("e1"), 3);
    assert_eq!(store.stored_ids(), vec!["e1"]);
    assert!(dead_letters.sent.lock().unwrap().is_empty());
    assert_eq!(source.commits_for(0), vec![5]);
}

#[tokio::test]
async fn undecodable_messages_are_committed_and_skipped() {
    let store = Arc::new(Store::default());
    let dead_letters = Arc::new(DeadLetters::default());
    let source = Arc::new(Source::new(vec![
        msg(2, 0, b"not json".to_vec()),
        msg(2, 1, body("ok")),
        InboundMessage { payload: None, ..msg(2, 2, Vec::new()) },
    ]));

    run(store.clone(), dead_letters.clone(), source.clone()).await;

    assert_eq!(store.stored_ids(), vec!["ok"]);
    assert!(dead_letters.sent.lock().unwrap().is_empty());
    assert_eq!(source.commits_for(2), vec![0, 1, 2]);
}

#[tokio::test]
async fn dead_letter_carries_the_original_json_text() {
    let raw = r#"{"eventId":"big","eventType":"payment","timestamp":1700000000,"payload":{"amount":123456789012345678901234567890,"rate":1.10,"memo":null}}"#;
    let store = Arc::new(Store::rejecting(&["big"]));
    let dead_letters = Arc::new(DeadLetters::default());
    let source = Arc::new(Source::new(vec![msg(0, 0, raw.as_bytes().to_vec())]));

    run(store.clone(), dead_letters.clone(), source.clone()).await;

    let sent = dead_letters.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let wire = String::from_utf8(sent[0].1.clone()).unwrap();
    assert!(wire.contains(&format!(r#""originalEvent":{raw}"#)), "{wire}");
    assert_eq!(source.commits_for(0), vec![0]);
}
