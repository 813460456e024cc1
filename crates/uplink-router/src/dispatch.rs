use uplink_core::events::UploadEvent;

/// The single seam between the router and the subscriber side.
///
/// `deliver` returns `true` only if a subscriber actually accepted the
/// event. A missing listener is a normal return value, never an error —
/// the router persists the event instead.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &UploadEvent) -> bool;
}
