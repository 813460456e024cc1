pub mod accumulator;
pub mod dispatch;
pub mod mock;
pub mod router;
pub mod transport;

pub use accumulator::ResponseAccumulator;
pub use dispatch::EventSink;
pub use router::EventRouter;
pub use transport::UploadTransport;
