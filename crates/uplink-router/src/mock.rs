use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uplink_core::errors::TransportError;
use uplink_core::ids::TaskId;
use uplink_core::options::UploadOptions;

use crate::router::EventRouter;
use crate::transport::UploadTransport;

/// Pre-programmed upload outcomes for deterministic testing without a
/// network.
#[derive(Clone)]
pub enum MockOutcome {
    /// Emit the given progress values, buffer the body, then complete with
    /// the status.
    Complete {
        progress: Vec<u64>,
        status: u16,
        body: Vec<u8>,
    },
    /// Complete with a transport error.
    Fail(TransportError),
    /// Reject the start call itself (usage error, no events produced).
    RejectStart(TransportError),
    /// Accept the upload but emit nothing; the test drives the router.
    Pending,
    /// Wait a duration, then resolve the inner outcome.
    Delay(Duration, Box<MockOutcome>),
}

impl MockOutcome {
    /// Convenience: a successful upload with one progress tick.
    pub fn complete_with_body(status: u16, body: &str) -> Self {
        Self::Complete {
            progress: vec![body.len() as u64],
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn delayed(delay: Duration, inner: MockOutcome) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock transport that resolves pre-programmed outcomes in call order,
/// driving the router exactly as the real transport would.
pub struct MockTransport {
    router: Arc<EventRouter>,
    outcomes: Mutex<Vec<MockOutcome>>,
    call_count: AtomicUsize,
    started: Mutex<Vec<UploadOptions>>,
}

impl MockTransport {
    pub fn new(router: Arc<EventRouter>, outcomes: Vec<MockOutcome>) -> Self {
        Self {
            router,
            outcomes: Mutex::new(outcomes),
            call_count: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Options of every accepted upload, in start order.
    pub fn started(&self) -> Vec<UploadOptions> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn start_upload(&self, options: UploadOptions) -> Result<TaskId, TransportError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let outcome = self.outcomes.lock().get(idx).cloned();
        let Some(outcome) = outcome else {
            return Err(TransportError::InvalidRequest(format!(
                "MockTransport: no outcome configured for call {idx}"
            )));
        };

        let task_id = options.task_id.clone();
        let mut current = outcome;
        loop {
            match current {
                MockOutcome::Complete { progress, status, body } => {
                    for sent in progress {
                        self.router.did_send_bytes(&task_id, sent);
                    }
                    self.router.did_receive_headers(&task_id);
                    if !body.is_empty() {
                        self.router.did_receive_chunk(&task_id, &body);
                    }
                    self.router.did_complete(&task_id, None, Some(status));
                    break;
                }
                MockOutcome::Fail(e) => {
                    self.router.did_complete(&task_id, Some(e), None);
                    break;
                }
                MockOutcome::RejectStart(e) => return Err(e),
                MockOutcome::Pending => break,
                MockOutcome::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }

        self.started.lock().push(options);
        Ok(task_id)
    }
}
