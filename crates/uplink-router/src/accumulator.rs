use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use uplink_core::ids::TaskId;

/// Buffers partial response-body chunks per task until the terminal event
/// is built. Pure accumulation, no network semantics.
#[derive(Default)]
pub struct ResponseAccumulator {
    buffers: Mutex<HashMap<TaskId, BytesMut>>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize an empty buffer for the task if one doesn't exist yet.
    pub fn on_headers(&self, task_id: &TaskId) {
        let mut buffers = self.buffers.lock();
        buffers.entry(task_id.clone()).or_default();
    }

    /// Append a chunk, creating the buffer if the headers callback was
    /// skipped by the transport.
    pub fn on_chunk(&self, task_id: &TaskId, chunk: &[u8]) {
        let mut buffers = self.buffers.lock();
        buffers
            .entry(task_id.clone())
            .or_default()
            .extend_from_slice(chunk);
    }

    /// Atomically return and remove the buffer for a task. `None` means no
    /// buffer was ever created, e.g. the request failed before any response.
    pub fn take_and_clear(&self, task_id: &TaskId) -> Option<Bytes> {
        let mut buffers = self.buffers.lock();
        buffers.remove(task_id).map(BytesMut::freeze)
    }

    pub fn pending_count(&self) -> usize {
        self.buffers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_then_chunks_accumulate() {
        let acc = ResponseAccumulator::new();
        let t1 = TaskId::from_raw("t1");

        acc.on_headers(&t1);
        acc.on_chunk(&t1, b"hel");
        acc.on_chunk(&t1, b"lo");

        assert_eq!(acc.take_and_clear(&t1), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn chunk_without_headers_creates_buffer() {
        let acc = ResponseAccumulator::new();
        let t1 = TaskId::from_raw("t1");

        acc.on_chunk(&t1, b"ok");
        assert_eq!(acc.take_and_clear(&t1), Some(Bytes::from_static(b"ok")));
    }

    #[test]
    fn headers_with_no_chunks_yields_empty_buffer() {
        let acc = ResponseAccumulator::new();
        let t1 = TaskId::from_raw("t1");

        acc.on_headers(&t1);
        assert_eq!(acc.take_and_clear(&t1), Some(Bytes::new()));
    }

    #[test]
    fn take_without_any_callback_is_none() {
        let acc = ResponseAccumulator::new();
        assert_eq!(acc.take_and_clear(&TaskId::from_raw("never")), None);
    }

    #[test]
    fn take_removes_the_buffer() {
        let acc = ResponseAccumulator::new();
        let t1 = TaskId::from_raw("t1");

        acc.on_chunk(&t1, b"once");
        assert!(acc.take_and_clear(&t1).is_some());
        assert_eq!(acc.take_and_clear(&t1), None);
        assert_eq!(acc.pending_count(), 0);
    }

    #[test]
    fn tasks_are_independent() {
        let acc = ResponseAccumulator::new();
        let t1 = TaskId::from_raw("t1");
        let t2 = TaskId::from_raw("t2");

        acc.on_chunk(&t1, b"one");
        acc.on_chunk(&t2, b"two");

        assert_eq!(acc.take_and_clear(&t2), Some(Bytes::from_static(b"two")));
        assert_eq!(acc.take_and_clear(&t1), Some(Bytes::from_static(b"one")));
    }
}
