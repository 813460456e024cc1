pub mod error;
pub mod saved_events;

pub use error::StoreError;
pub use saved_events::SavedEventStore;
