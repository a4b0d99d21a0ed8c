use serde::Serialize;
use tracing::{info, warn};

use mirage_protocol::{ExchangeRecord, HealthRecord};
use mirage_storage::{SharedObjectStore, put_json};

use crate::background::BackgroundTasks;

/// Fire-and-forget writer in front of the object store.
///
/// Writes run on tracked background tasks; failures are logged with the
/// record's identifier and dropped. Nothing is retried.
#[derive(Clone)]
pub struct RecordEmitter {
    store: SharedObjectStore,
    tasks: BackgroundTasks,
}

impl RecordEmitter {
    pub fn new(store: SharedObjectStore, tasks: BackgroundTasks) -> Self {
        Self { store, tasks }
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn save_exchange(&self, record: ExchangeRecord) {
        let key = record.storage_key();
        let request_id = record.request_id.clone();
        self.spawn_put(key, request_id, record);
    }

    pub fn save_health(&self, record: HealthRecord) {
        let key = record.storage_key();
        self.spawn_put(key, "health-check".to_string(), record);
    }

    fn spawn_put<T>(&self, key: String, request_id: String, value: T)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let store = self.store.clone();
        self.tasks.spawn(async move {
            match put_json(store.as_ref(), &key, &value).await {
                Ok(()) => info!(event = "record_saved", request_id = %request_id, key = %key),
                Err(err) => warn!(
                    event = "record_save_failed",
                    request_id = %request_id,
                    key = %key,
                    error = %err
                ),
            }
        });
    }
}
