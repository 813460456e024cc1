use std::sync::Arc;

use dashmap::DashMap;
use uplink_core::events::UploadEvent;
use uplink_core::ids::{SubscriberId, TaskId};

/// Per-event-type callbacks for one upload task. All callbacks default to
/// no-ops so a subscriber only implements the ones it cares about.
///
/// A subscriber receives zero or more `on_progress` calls followed by
/// exactly one terminal callback, after which it is automatically removed
/// from the registry.
pub trait UploadSubscriber: Send + Sync {
    fn on_progress(&self, _task_id: &TaskId, _bytes_sent: u64) {}
    fn on_completed(&self, _task_id: &TaskId, _status: u16, _body: &str) {}
    fn on_error(&self, _task_id: &TaskId, _status: Option<u16>, _body: Option<&str>, _error: &str) {
    }
    fn on_cancelled(&self, _task_id: &TaskId) {}
}

/// Task-keyed subscriber sets. Multiple subscribers may watch one task;
/// resubscribing appends, and fan-out runs in registration order.
pub struct SubscriberRegistry {
    subscribers: DashMap<TaskId, Vec<(SubscriberId, Arc<dyn UploadSubscriber>)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Register a subscriber under a task ID and return its handle ID.
    pub fn add(&self, task_id: TaskId, subscriber: Arc<dyn UploadSubscriber>) -> SubscriberId {
        let id = SubscriberId::new();
        self.subscribers
            .entry(task_id)
            .or_default()
            .push((id.clone(), subscriber));
        id
    }

    /// Remove one subscriber. The task entry is dropped when its last
    /// subscriber goes. Returns false if the subscriber was already gone.
    pub fn remove(&self, task_id: &TaskId, subscriber_id: &SubscriberId) -> bool {
        let Some(mut entry) = self.subscribers.get_mut(task_id) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(id, _)| id != subscriber_id);
        let removed = entry.len() < before;
        let now_empty = entry.is_empty();
        drop(entry);
        if now_empty {
            self.subscribers.remove_if(task_id, |_, subs| subs.is_empty());
        }
        removed
    }

    /// Fan an event out to the task's subscribers in registration order.
    /// Terminal events remove the task's whole subscriber set afterwards.
    /// Returns false if no subscriber was registered for the task.
    pub fn dispatch(&self, event: &UploadEvent) -> bool {
        let task_id = event.task_id();

        // Snapshot the subscriber list so no map lock is held during
        // callbacks (a callback may subscribe or unsubscribe).
        let subs: Vec<Arc<dyn UploadSubscriber>> = match self.subscribers.get(task_id) {
            Some(entry) if !entry.is_empty() => {
                entry.iter().map(|(_, s)| Arc::clone(s)).collect()
            }
            _ => return false,
        };

        for sub in &subs {
            match event {
                UploadEvent::Progress { task_id, bytes_sent } => {
                    sub.on_progress(task_id, *bytes_sent)
                }
                UploadEvent::Completed { task_id, status, body } => {
                    sub.on_completed(task_id, *status, body)
                }
                UploadEvent::Failed { task_id, status, body, error } => {
                    sub.on_error(task_id, *status, body.as_deref(), error)
                }
                UploadEvent::Cancelled { task_id } => sub.on_cancelled(task_id),
            }
        }

        if event.is_terminal() {
            self.subscribers.remove(task_id);
            tracing::debug!(task_id = %task_id, "Auto-unsubscribed after terminal event");
        }
        true
    }

    pub fn has_subscribers(&self, task_id: &TaskId) -> bool {
        self.subscribers
            .get(task_id)
            .map(|e| !e.is_empty())
            .unwrap_or(false)
    }

    /// Number of task IDs with at least one subscriber.
    pub fn task_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records callback invocations as (kind, detail) pairs.
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl UploadSubscriber for Recorder {
        fn on_progress(&self, _task_id: &TaskId, bytes_sent: u64) {
            self.calls.lock().push(format!("progress:{bytes_sent}"));
        }
        fn on_completed(&self, _task_id: &TaskId, status: u16, body: &str) {
            self.calls.lock().push(format!("completed:{status}:{body}"));
        }
        fn on_error(
            &self,
            _task_id: &TaskId,
            status: Option<u16>,
            _body: Option<&str>,
            error: &str,
        ) {
            self.calls.lock().push(format!("error:{status:?}:{error}"));
        }
        fn on_cancelled(&self, _task_id: &TaskId) {
            self.calls.lock().push("cancelled".into());
        }
    }

    fn progress(id: &str, sent: u64) -> UploadEvent {
        UploadEvent::Progress {
            task_id: TaskId::from_raw(id),
            bytes_sent: sent,
        }
    }

    fn completed(id: &str) -> UploadEvent {
        UploadEvent::Completed {
            task_id: TaskId::from_raw(id),
            status: 200,
            body: "ok".into(),
        }
    }

    #[test]
    fn dispatch_without_subscriber_reports_no_listener() {
        let registry = SubscriberRegistry::new();
        assert!(!registry.dispatch(&progress("t1", 10)));
    }

    #[test]
    fn dispatch_routes_to_variant_callback() {
        let registry = SubscriberRegistry::new();
        let rec = Recorder::new();
        let t1 = TaskId::from_raw("t1");
        registry.add(t1.clone(), rec.clone());

        assert!(registry.dispatch(&progress("t1", 512)));
        assert!(registry.dispatch(&completed("t1")));
        assert_eq!(rec.calls(), vec!["progress:512", "completed:200:ok"]);
    }

    #[test]
    fn dispatch_is_task_scoped() {
        let registry = SubscriberRegistry::new();
        let rec = Recorder::new();
        registry.add(TaskId::from_raw("t1"), rec.clone());

        assert!(!registry.dispatch(&progress("t2", 10)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn fan_out_runs_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct Tagged(u8, Arc<Mutex<Vec<u8>>>);
        impl UploadSubscriber for Tagged {
            fn on_progress(&self, _task_id: &TaskId, _bytes_sent: u64) {
                self.1.lock().push(self.0);
            }
        }

        let t1 = TaskId::from_raw("t1");
        registry.add(t1.clone(), Arc::new(Tagged(1, order.clone())));
        registry.add(t1.clone(), Arc::new(Tagged(2, order.clone())));
        registry.add(t1, Arc::new(Tagged(3, order.clone())));

        registry.dispatch(&progress("t1", 1));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn terminal_removes_all_subscribers_for_the_task() {
        let registry = SubscriberRegistry::new();
        let a = Recorder::new();
        let b = Recorder::new();
        let t1 = TaskId::from_raw("t1");
        registry.add(t1.clone(), a.clone());
        registry.add(t1.clone(), b.clone());

        assert!(registry.dispatch(&completed("t1")));
        assert_eq!(a.calls().len(), 1);
        assert_eq!(b.calls().len(), 1);
        assert!(!registry.has_subscribers(&t1));

        // Duplicate terminal finds nobody.
        assert!(!registry.dispatch(&completed("t1")));
        assert_eq!(a.calls().len(), 1);
    }

    #[test]
    fn remove_drops_task_entry_when_last_subscriber_goes() {
        let registry = SubscriberRegistry::new();
        let t1 = TaskId::from_raw("t1");
        let id_a = registry.add(t1.clone(), Recorder::new());
        let id_b = registry.add(t1.clone(), Recorder::new());

        assert!(registry.remove(&t1, &id_a));
        assert!(registry.has_subscribers(&t1));

        assert!(registry.remove(&t1, &id_b));
        assert!(!registry.has_subscribers(&t1));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unknown_subscriber_is_false() {
        let registry = SubscriberRegistry::new();
        let t1 = TaskId::from_raw("t1");
        assert!(!registry.remove(&t1, &SubscriberId::new()));

        registry.add(t1.clone(), Recorder::new());
        assert!(!registry.remove(&t1, &SubscriberId::new()));
        assert!(registry.has_subscribers(&t1));
    }
}
