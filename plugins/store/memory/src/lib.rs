use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use event_api::{ClientError, Event, EventQuery, EventReader, EventStore, StoredEvent};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MemoryStoreConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryEventStore
// ═══════════════════════════════════════════════════════════════

struct Inner {
    records: VecDeque<StoredEvent>,
    next_id: u64,
}

/// In-process ring-buffer store for local runs without MongoDB.
/// Oldest events are evicted once `max_records` is reached.
pub struct MemoryEventStore {
    inner: RwLock<Inner>,
    max_records: usize,
}

impl MemoryEventStore {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            inner: RwLock::new(Inner {
                records: VecDeque::with_capacity(max_records.min(65536)),
                next_id: 1,
            }),
            max_records,
        }
    }

    pub fn from_config(config: &MemoryStoreConfig) -> Self {
        Self::new(config.max_records)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::from_config(&MemoryStoreConfig::default())
    }
}

impl EventStore for MemoryEventStore {
    fn insert<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let id = format!("{:024x}", inner.next_id);
            inner.next_id += 1;
            if inner.records.len() >= self.max_records {
                inner.records.pop_front();
            }
            inner.records.push_back(StoredEvent {
                id: id.clone(),
                event: event.clone(),
            });
            Ok(id)
        })
    }
}

impl EventReader for MemoryEventStore {
    fn find<'a>(
        &'a self,
        query: &'a EventQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let skip = usize::try_from(query.skip()).unwrap_or(usize::MAX);
            let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
            Ok(inner
                .records
                .iter()
                .rev()
                .filter(|r| query.matches(&r.event))
                .skip(skip)
                .take(limit)
                .cloned()
                .collect())
        })
    }
}
