use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;

use mirage_common::RelayConfig;
use mirage_storage::SharedObjectStore;

use crate::background::BackgroundTasks;
use crate::dispatch::Dispatcher;
use crate::handler::proxy_handler;
use crate::health::{HealthChecker, health_api, health_page};
use crate::record::RecordEmitter;
use crate::upstream_client::UpstreamClient;

/// Request bodies larger than this are rejected before capture.
pub const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct CoreState {
    pub dispatcher: Dispatcher,
    pub store: SharedObjectStore,
}

pub struct Core {
    state: Arc<CoreState>,
    health: HealthChecker,
    tasks: BackgroundTasks,
}

impl Core {
    pub fn new(
        config: Arc<RelayConfig>,
        client: Arc<dyn UpstreamClient>,
        store: SharedObjectStore,
    ) -> Self {
        let tasks = BackgroundTasks::new();
        let records = RecordEmitter::new(store.clone(), tasks.clone());
        let dispatcher = Dispatcher::new(config.clone(), client.clone(), records.clone());
        let health = HealthChecker::new(config, client, records);
        Self {
            state: Arc::new(CoreState { dispatcher, store }),
            health,
            tasks,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_page))
            .route("/health/api", get(health_api))
            .fallback(proxy_handler)
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
            .with_state(self.state.clone())
    }

    pub fn health_checker(&self) -> HealthChecker {
        self.health.clone()
    }

    /// Observation pipelines, sink writes and stream pumps still in flight.
    pub fn background(&self) -> BackgroundTasks {
        self.tasks.clone()
    }
}
