use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use uplink_core::events::UploadEvent;
use uplink_core::ids::{SubscriberId, TaskId};
use uplink_router::dispatch::EventSink;
use uplink_router::router::EventRouter;

use crate::subscribers::{SubscriberRegistry, UploadSubscriber};

/// Client-facing subscriber registry plus the on/off lifecycle of the
/// routing channel.
///
/// The multiplexer attaches itself to the router as the event sink when the
/// first subscriber appears and detaches when the last one goes (explicit
/// unsubscribe or terminal auto-unsubscribe), so the router falls back to
/// persistence whenever nobody is listening.
pub struct UploadMultiplexer {
    registry: SubscriberRegistry,
    router: Arc<EventRouter>,
    active: AtomicBool,
}

impl UploadMultiplexer {
    pub fn new(router: Arc<EventRouter>) -> Arc<Self> {
        Arc::new(Self {
            registry: SubscriberRegistry::new(),
            router,
            active: AtomicBool::new(false),
        })
    }

    /// Register a subscriber for a task. The first subscriber across all
    /// tasks activates the channel. Resubscribing appends; callbacks fan
    /// out in registration order.
    pub fn subscribe(
        self: &Arc<Self>,
        task_id: TaskId,
        subscriber: Arc<dyn UploadSubscriber>,
    ) -> Subscription {
        let subscriber_id = self.registry.add(task_id.clone(), subscriber);
        if !self.active.swap(true, Ordering::AcqRel) {
            self.router.attach_sink(self.clone() as Arc<dyn EventSink>);
            debug!("Activated subscriber channel");
        }
        Subscription {
            multiplexer: self.clone(),
            task_id,
            subscriber_id,
        }
    }

    fn unsubscribe(&self, task_id: &TaskId, subscriber_id: &SubscriberId) {
        self.registry.remove(task_id, subscriber_id);
        self.deactivate_if_idle();
    }

    fn deactivate_if_idle(&self) {
        if self.registry.is_empty() && self.active.swap(false, Ordering::AcqRel) {
            self.router.detach_sink();
            debug!("Deactivated subscriber channel");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn has_subscribers(&self, task_id: &TaskId) -> bool {
        self.registry.has_subscribers(task_id)
    }
}

impl EventSink for UploadMultiplexer {
    fn deliver(&self, event: &UploadEvent) -> bool {
        let delivered = self.registry.dispatch(event);
        if delivered && event.is_terminal() {
            // Terminal dispatch emptied that task's subscriber set; the
            // channel goes down with the last one.
            self.deactivate_if_idle();
        }
        delivered
    }
}

/// Handle returned by `subscribe`; invoking it removes the subscriber.
/// Dropping the handle without calling `unsubscribe` leaves the
/// subscription in place until its terminal event arrives.
pub struct Subscription {
    multiplexer: Arc<UploadMultiplexer>,
    task_id: TaskId,
    subscriber_id: SubscriberId,
}

impl Subscription {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn unsubscribe(self) {
        self.multiplexer.unsubscribe(&self.task_id, &self.subscriber_id);
    }
}
