use async_trait::async_trait;
use uplink_core::errors::TransportError;
use uplink_core::ids::TaskId;
use uplink_core::options::UploadOptions;

/// The transport collaborator that actually performs the upload and drives
/// the router's callbacks as it goes.
///
/// `start_upload` returns once the upload has been accepted; progress and
/// the terminal outcome arrive through the router the transport was
/// constructed with. Errors here are usage errors caught before the upload
/// begins (bad URL, unreadable payload) — they never produce events.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn start_upload(&self, options: UploadOptions) -> Result<TaskId, TransportError>;
}
