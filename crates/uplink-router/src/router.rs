use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use uplink_core::errors::TransportError;
use uplink_core::events::UploadEvent;
use uplink_core::ids::TaskId;
use uplink_store::SavedEventStore;
use uplink_telemetry::MetricsRecorder;

use crate::accumulator::ResponseAccumulator;
use crate::dispatch::EventSink;

type DrainedHandler = Box<dyn Fn() + Send + Sync>;

/// Translates raw transport callbacks into classified `UploadEvent`s and
/// routes each one to either live delivery or the saved-event store.
///
/// The sink slot is an explicit attached/detached state: when no sink is
/// attached (or the attached sink reports no listener), events fall back to
/// durable storage for later retrieval.
pub struct EventRouter {
    accumulator: ResponseAccumulator,
    store: Arc<SavedEventStore>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    drained_handler: Mutex<Option<DrainedHandler>>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl EventRouter {
    pub fn new(store: Arc<SavedEventStore>) -> Self {
        Self {
            accumulator: ResponseAccumulator::new(),
            store,
            sink: RwLock::new(None),
            drained_handler: Mutex::new(None),
            metrics: None,
        }
    }

    /// Like `new`, but each routed event also bumps the delivered/saved
    /// counters on the recorder.
    pub fn with_metrics(store: Arc<SavedEventStore>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new(store)
        }
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.metrics.as_ref()
    }

    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = Some(sink);
    }

    pub fn detach_sink(&self) {
        *self.sink.write() = None;
    }

    pub fn store(&self) -> &Arc<SavedEventStore> {
        &self.store
    }

    /// Response headers arrived for a task.
    pub fn did_receive_headers(&self, task_id: &TaskId) {
        self.accumulator.on_headers(task_id);
    }

    /// A response-body chunk arrived for a task.
    pub fn did_receive_chunk(&self, task_id: &TaskId, chunk: &[u8]) {
        self.accumulator.on_chunk(task_id, chunk);
    }

    /// Upload progress: total bytes sent so far for a task.
    pub fn did_send_bytes(&self, task_id: &TaskId, total_sent: u64) {
        self.route(UploadEvent::Progress {
            task_id: task_id.clone(),
            bytes_sent: total_sent,
        });
    }

    /// The transport finished a task, successfully or not. Builds the
    /// terminal event and retires the task's response buffer.
    pub fn did_complete(
        &self,
        task_id: &TaskId,
        error: Option<TransportError>,
        status: Option<u16>,
    ) {
        let body = self.accumulator.take_and_clear(task_id);
        let event = classify(task_id, error, status, body);
        self.route(event);
    }

    /// The background session has no more events to deliver. Hands off to
    /// the completion callback registered by the transport collaborator.
    pub fn session_drained(&self) {
        let handler = self.drained_handler.lock();
        if let Some(handler) = handler.as_ref() {
            handler();
        } else {
            debug!("Session drained with no handler registered");
        }
    }

    pub fn set_drained_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.drained_handler.lock() = Some(Box::new(handler));
    }

    /// Try live delivery first; persist only when nothing accepted the event.
    fn route(&self, event: UploadEvent) {
        // Clone the sink out of the lock: deliver() may detach the sink
        // (listener population dropping to zero) and must not re-enter it.
        let sink = self.sink.read().clone();
        let delivered = match sink {
            Some(sink) => sink.deliver(&event),
            None => false,
        };

        if delivered {
            debug!(
                task_id = %event.task_id(),
                event_type = event.event_type(),
                "Delivered event live"
            );
            if let Some(metrics) = &self.metrics {
                metrics.counter_inc(
                    "uplink_events_delivered_total",
                    &[("event_type", event.event_type())],
                    1,
                );
            }
        } else {
            debug!(
                task_id = %event.task_id(),
                event_type = event.event_type(),
                "No listener, saving event"
            );
            if let Some(metrics) = &self.metrics {
                metrics.counter_inc(
                    "uplink_events_saved_total",
                    &[("event_type", event.event_type())],
                    1,
                );
            }
            self.store.upsert(event.task_id().clone(), event);
        }
    }
}

/// Classify a completion callback into the terminal event for the task.
fn classify(
    task_id: &TaskId,
    error: Option<TransportError>,
    status: Option<u16>,
    body: Option<bytes::Bytes>,
) -> UploadEvent {
    // Non-UTF-8 bodies are replaced lossily rather than dropped.
    let body_text = body.map(|b| String::from_utf8_lossy(&b).into_owned());

    match error {
        Some(e) if e.is_cancellation() => UploadEvent::Cancelled {
            task_id: task_id.clone(),
        },
        Some(e) => UploadEvent::Failed {
            task_id: task_id.clone(),
            status,
            body: body_text,
            error: e.to_string(),
        },
        None => match status {
            Some(s) if s < 300 => UploadEvent::Completed {
                task_id: task_id.clone(),
                status: s,
                body: body_text.unwrap_or_default(),
            },
            Some(s) => UploadEvent::Failed {
                task_id: task_id.clone(),
                status: Some(s),
                body: body_text,
                error: "non-2xx status".into(),
            },
            None => {
                warn!(task_id = %task_id, "Completion with no error and no status");
                UploadEvent::Failed {
                    task_id: task_id.clone(),
                    status: None,
                    body: body_text,
                    error: "missing response status".into(),
                }
            }
        },
    }
}
