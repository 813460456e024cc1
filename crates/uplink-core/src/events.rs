use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// Classified upload outcome events, correlated by task ID.
/// Field names match the wire format consumed by clients, so renames are
/// explicit rather than derived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum UploadEvent {
    #[serde(rename = "progress")]
    Progress {
        #[serde(rename = "ID")]
        task_id: TaskId,
        #[serde(rename = "bytesSent")]
        bytes_sent: u64,
    },

    #[serde(rename = "completed")]
    Completed {
        #[serde(rename = "ID")]
        task_id: TaskId,
        status: u16,
        body: String,
    },

    #[serde(rename = "error")]
    Failed {
        #[serde(rename = "ID")]
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        error: String,
    },

    #[serde(rename = "cancelled")]
    Cancelled {
        #[serde(rename = "ID")]
        task_id: TaskId,
    },
}

impl UploadEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Progress { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id, .. } => task_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// A terminal event is the last event a task ever produces.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
