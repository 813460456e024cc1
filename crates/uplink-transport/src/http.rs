use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::{Body, Client, Url};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uplink_core::errors::TransportError;
use uplink_core::ids::TaskId;
use uplink_core::options::{HttpMethod, UploadOptions};
use uplink_router::router::EventRouter;
use uplink_router::transport::UploadTransport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Streaming HTTP upload transport. Validates the request up front, then
/// runs the upload on a background task, driving the router's callbacks as
/// bytes go out and the response comes back.
pub struct HttpTransport {
    client: Client,
    router: Arc<EventRouter>,
    timeout: Duration,
    inflight: Arc<DashMap<TaskId, CancellationToken>>,
}

impl HttpTransport {
    pub fn new(router: Arc<EventRouter>) -> Result<Self, TransportError> {
        Self::with_timeout(router, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        router: Arc<EventRouter>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            router,
            timeout,
            inflight: Arc::new(DashMap::new()),
        })
    }

    /// Cancel an in-flight upload. The task completes with a `Cancelled`
    /// event through the usual routing path. Returns false if the task is
    /// not in flight.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.inflight.get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

/// Retire a finished task; the last one out signals the drained session.
fn finish_task(
    inflight: &DashMap<TaskId, CancellationToken>,
    router: &EventRouter,
    task_id: &TaskId,
) {
    inflight.remove(task_id);
    if inflight.is_empty() {
        router.session_drained();
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn start_upload(&self, options: UploadOptions) -> Result<TaskId, TransportError> {
        let task_id = options.task_id.clone();

        // Usage errors are rejected here, before any event can exist.
        let url = Url::parse(&options.url)
            .map_err(|e| TransportError::InvalidRequest(format!("bad url: {e}")))?;
        let file = tokio::fs::File::open(&options.path)
            .await
            .map_err(|e| TransportError::Io(format!("open {}: {e}", options.path)))?;
        let file_len = file
            .metadata()
            .await
            .map_err(|e| TransportError::Io(format!("stat {}: {e}", options.path)))?
            .len();
        if let Some(metrics) = self.router.metrics() {
            metrics.histogram_observe("uplink_upload_size_bytes", &[], file_len as f64);
        }

        let mut request = match options.method {
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Post => self.client.post(url),
        };
        request = request.header(reqwest::header::CONTENT_LENGTH, file_len);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.to_header_string());
        }

        // Count bytes as they stream out so the router sees progress.
        let progress_router = self.router.clone();
        let progress_tid = task_id.clone();
        let mut total_sent: u64 = 0;
        let body_stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                total_sent += bytes.len() as u64;
                progress_router.did_send_bytes(&progress_tid, total_sent);
            }
            chunk
        });
        let request = request.body(Body::wrap_stream(body_stream));

        let token = CancellationToken::new();
        self.inflight.insert(task_id.clone(), token.clone());

        let router = self.router.clone();
        let inflight = self.inflight.clone();
        let timeout = self.timeout;
        let tid = task_id.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    debug!(task_id = %tid, "Upload cancelled");
                    router.did_complete(&tid, Some(TransportError::Cancelled), None);
                    finish_task(&inflight, &router, &tid);
                    return;
                }
                result = request.send() => result,
            };

            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    router.did_receive_headers(&tid);
                    let mut stream = response.bytes_stream();
                    loop {
                        let next = tokio::select! {
                            _ = token.cancelled() => {
                                router.did_complete(&tid, Some(TransportError::Cancelled), None);
                                finish_task(&inflight, &router, &tid);
                                return;
                            }
                            chunk = stream.next() => chunk,
                        };
                        match next {
                            Some(Ok(chunk)) => router.did_receive_chunk(&tid, &chunk),
                            Some(Err(e)) => {
                                warn!(task_id = %tid, error = %e, "Response body read failed");
                                let err = if e.is_timeout() {
                                    TransportError::Timeout(timeout)
                                } else {
                                    TransportError::Network(e.to_string())
                                };
                                router.did_complete(&tid, Some(err), Some(status));
                                finish_task(&inflight, &router, &tid);
                                return;
                            }
                            None => break,
                        }
                    }
                    router.did_complete(&tid, None, Some(status));
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        TransportError::Timeout(timeout)
                    } else {
                        TransportError::Network(e.to_string())
                    };
                    router.did_complete(&tid, Some(err), None);
                }
            }
            finish_task(&inflight, &router, &tid);
        });

        Ok(task_id)
    }
}
