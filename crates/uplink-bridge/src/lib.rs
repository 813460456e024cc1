pub mod manager;
pub mod multiplexer;
pub mod subscribers;

pub use manager::UploadManager;
pub use multiplexer::{Subscription, UploadMultiplexer};
pub use subscribers::{SubscriberRegistry, UploadSubscriber};
