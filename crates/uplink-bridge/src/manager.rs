use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uplink_core::errors::TransportError;
use uplink_core::events::UploadEvent;
use uplink_core::ids::TaskId;
use uplink_core::options::UploadOptions;
use uplink_router::router::EventRouter;
use uplink_router::transport::UploadTransport;
use uplink_store::SavedEventStore;

use crate::multiplexer::{Subscription, UploadMultiplexer};
use crate::subscribers::UploadSubscriber;

/// Process-scoped facade wiring the router, store, multiplexer, and
/// transport together. Construct once at startup and share by reference —
/// the background session and its delegate must survive for the whole
/// process lifetime.
pub struct UploadManager {
    transport: Arc<dyn UploadTransport>,
    router: Arc<EventRouter>,
    multiplexer: Arc<UploadMultiplexer>,
}

impl UploadManager {
    pub fn new(transport: Arc<dyn UploadTransport>, router: Arc<EventRouter>) -> Self {
        let multiplexer = UploadMultiplexer::new(router.clone());
        Self {
            transport,
            router,
            multiplexer,
        }
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    fn store(&self) -> &Arc<SavedEventStore> {
        self.router.store()
    }

    /// Start an upload. The task ID in the options is the correlation key
    /// the caller reuses for `subscribe` and `retrieve_saved_events`.
    pub async fn start_upload(&self, options: UploadOptions) -> Result<TaskId, TransportError> {
        let method = options.method.as_str();
        let task_id = self.transport.start_upload(options).await?;
        info!(task_id = %task_id, "Upload started");
        if let Some(metrics) = self.router.metrics() {
            metrics.counter_inc("uplink_uploads_started_total", &[("method", method)], 1);
        }
        Ok(task_id)
    }

    /// Consume and return saved events for the given task IDs. Absence
    /// means the task never produced a saved event or it was already
    /// retrieved.
    pub fn retrieve_saved_events(&self, ids: &[TaskId]) -> HashMap<TaskId, Option<UploadEvent>> {
        self.store().take_many(ids)
    }

    /// Subscribe to a task's events. The returned handle unsubscribes;
    /// terminal events unsubscribe automatically.
    pub fn subscribe(&self, task_id: TaskId, subscriber: Arc<dyn UploadSubscriber>) -> Subscription {
        self.multiplexer.subscribe(task_id, subscriber)
    }

    /// Flush the saved-event snapshot. Call on orderly teardown.
    pub fn shutdown(&self) {
        if let Err(e) = self.store().persist() {
            warn!(error = %e, "Failed to flush saved events on shutdown");
        } else {
            info!(entries = self.store().len(), "Flushed saved events");
        }
    }
}
