pub mod errors;
pub mod events;
pub mod ids;
pub mod options;

pub use errors::TransportError;
pub use events::UploadEvent;
pub use ids::{SubscriberId, TaskId};
pub use options::{HeaderValue, HttpMethod, UploadOptions};
