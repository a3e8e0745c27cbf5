use std::sync::Arc;

use event_api::{EventReader, EventStore};
use store_memory::MemoryEventStore;
use store_mongo::MongoEventStore;

use crate::config::StoreSettings;
use crate::error::ServerError;

/// Store backend opened from [`StoreSettings`].
pub enum OpenedStore {
    Mongo(Arc<MongoEventStore>),
    Memory(Arc<MemoryEventStore>),
}

impl OpenedStore {
    pub async fn open(settings: &StoreSettings) -> Result<Self, ServerError> {
        match settings {
            StoreSettings::Mongo(cfg) => {
                let store = MongoEventStore::connect(cfg)
                    .await
                    .map_err(ServerError::connect("connect to MongoDB"))?;
                Ok(OpenedStore::Mongo(Arc::new(store)))
            }
            StoreSettings::Memory(cfg) => {
                tracing::warn!(max_records = cfg.max_records, "using in-memory store, events are not durable");
                Ok(OpenedStore::Memory(Arc::new(MemoryEventStore::from_config(cfg))))
            }
        }
    }

    pub fn writer(&self) -> Arc<dyn EventStore> {
        match self {
            OpenedStore::Mongo(s) => s.clone(),
            OpenedStore::Memory(s) => s.clone(),
        }
    }

    pub fn reader(&self) -> Arc<dyn EventReader> {
        match self {
            OpenedStore::Mongo(s) => s.clone(),
            OpenedStore::Memory(s) => s.clone(),
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.writer().close().await {
            tracing::warn!(error = %e, "store close failed");
        }
    }
}
