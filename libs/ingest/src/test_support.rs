//! In-process doubles for the collaborator traits.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use event_api::{ClientError, Event, EventStore, InboundMessage, MessageSource, TopicProducer};
use serde_json::json;
use tokio::sync::watch;

pub fn signup_event() -> Event {
    Event::new("e1", "user_signup", "2024-01-01T00:00:00Z", json!({"randomValue": 42})).unwrap()
}

pub fn message(partition: i32, offset: i64, body: &[u8]) -> InboundMessage {
    InboundMessage {
        topic: "events".into(),
        partition,
        offset,
        payload: Some(body.to_vec()),
    }
}

pub fn event_body(event_id: &str) -> Vec<u8> {
    let mut event = signup_event();
    event.set("eventId", &event_id).unwrap();
    event.to_bytes().unwrap()
}

/// Ordered record of side effects shared between doubles.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ── Store ──

/// Fails the first `fail_first` inserts with "insert failed on attempt N".
pub struct ScriptedStore {
    fail_first: u32,
    calls: AtomicU32,
    inserted: Mutex<Vec<Event>>,
    journal: Journal,
}

impl ScriptedStore {
    pub fn new(fail_first: u32) -> Self {
        Self::with_journal(fail_first, Journal::default())
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn with_journal(fail_first: u32, journal: Journal) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
            inserted: Mutex::new(Vec::new()),
            journal,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> Vec<Event> {
        self.inserted.lock().unwrap().clone()
    }
}

impl EventStore for ScriptedStore {
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.journal.push(format!("insert:{}", event.event_id().unwrap_or_default()));
            if n <= self.fail_first {
                return Err(ClientError::io(format!("insert failed on attempt {n}")));
            }
            let mut inserted = self.inserted.lock().unwrap();
            inserted.push(event.clone());
            Ok(format!("id-{}", inserted.len()))
        })
    }
}

/// Holds every insert until [`GatedStore::open`] is called, then accepts.
pub struct GatedStore {
    gate: watch::Sender<bool>,
    held: Vec<String>,
    calls: AtomicU32,
    inserted: Mutex<Vec<String>>,
}

impl GatedStore {
    /// Gate every event.
    pub fn closed() -> Self {
        Self::holding(&[])
    }

    /// Gate only the listed event ids; an empty list gates all of them.
    pub fn holding(event_ids: &[&str]) -> Self {
        Self {
            gate: watch::channel(false).0,
            held: event_ids.iter().map(|id| id.to_string()).collect(),
            calls: AtomicU32::new(0),
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids of stored events, in insert order.
    pub fn inserted(&self) -> Vec<String> {
        self.inserted.lock().unwrap().clone()
    }
}

impl EventStore for GatedStore {
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = event.event_id().unwrap_or_default();
            if self.held.is_empty() || self.held.contains(&id) {
                let mut gate = self.gate.subscribe();
                let _ = gate.wait_for(|open| *open).await;
            }
            self.inserted.lock().unwrap().push(id.clone());
            Ok(id)
        })
    }
}

// ── Producer ──

pub struct RecordingProducer {
    fail_with: Option<String>,
    attempts: AtomicU32,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self {
            fail_with: None,
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::new()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl TopicProducer for RecordingProducer {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        _key: Option<&'a str>,
        value: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.fail_with {
                return Err(ClientError::io(msg.clone()));
            }
            self.sent.lock().unwrap().push((topic.to_string(), value.to_vec()));
            Ok(())
        })
    }
}

// ── Source ──

/// Hands out a fixed list of messages, then reports the subscription closed.
pub struct ScriptedSource {
    pending: Mutex<VecDeque<InboundMessage>>,
    commits: Mutex<Vec<(i32, i64)>>,
    flow: Mutex<Vec<String>>,
    journal: Journal,
}

impl ScriptedSource {
    pub fn new(messages: Vec<InboundMessage>, journal: Journal) -> Self {
        Self {
            pending: Mutex::new(messages.into()),
            commits: Mutex::new(Vec::new()),
            flow: Mutex::new(Vec::new()),
            journal,
        }
    }

    pub fn commits(&self) -> Vec<(i32, i64)> {
        self.commits.lock().unwrap().clone()
    }

    /// Pause / resume calls as `pause:<partition>` and `resume:<partition>`.
    pub fn flow(&self) -> Vec<String> {
        self.flow.lock().unwrap().clone()
    }
}

impl MessageSource for ScriptedSource {
    fn recv(&self) -> Pin<Box<dyn Future<Output = Option<Result<InboundMessage, ClientError>>> + Send + '_>> {
        Box::pin(async move { self.pending.lock().unwrap().pop_front().map(Ok) })
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), ClientError> {
        self.journal.push(format!("commit:{}:{}", message.partition, message.offset));
        self.commits.lock().unwrap().push((message.partition, message.offset));
        Ok(())
    }

    fn pause(&self, _topic: &str, partition: i32) -> Result<(), ClientError> {
        self.flow.lock().unwrap().push(format!("pause:{partition}"));
        Ok(())
    }

    fn resume(&self, _topic: &str, partition: i32) -> Result<(), ClientError> {
        self.flow.lock().unwrap().push(format!("resume:{partition}"));
        Ok(())
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
