use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};
use uplink_core::events::UploadEvent;
use uplink_core::ids::TaskId;

use crate::error::StoreError;

/// Durable per-task event snapshot backing the replay contract.
///
/// The in-memory map is the source of truth once loaded; the file on disk is
/// a write-behind copy of it. Load failures degrade to an empty map and
/// persist failures leave the in-memory state authoritative, so storage
/// trouble never blocks startup or loses the current process's view.
pub struct SavedEventStore {
    state: Mutex<HashMap<TaskId, UploadEvent>>,
    path: PathBuf,
    // Serializes whole persist cycles: without it, two concurrent persists
    // could interleave on the shared temp file and rename a stale snapshot
    // over a newer one.
    persist_lock: Mutex<()>,
}

impl SavedEventStore {
    /// Open the store, loading any prior snapshot from `path`.
    /// A missing or unreadable snapshot yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load(&path);
        info!(path = %path.display(), entries = state.len(), "Opened saved-event store");
        Self {
            state: Mutex::new(state),
            path,
            persist_lock: Mutex::new(()),
        }
    }

    fn load(path: &Path) -> HashMap<TaskId, UploadEvent> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read saved events, starting empty");
                return HashMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt saved-event snapshot, starting empty");
                HashMap::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite any prior record for the task. Later events supersede
    /// earlier ones; ordering is the router's job, not the store's.
    pub fn upsert(&self, task_id: TaskId, event: UploadEvent) {
        {
            let mut state = self.state.lock();
            state.insert(task_id, event);
        }
        self.persist_logged();
    }

    /// Remove and return the stored record for each requested task ID.
    /// Absence means no event was saved, or it was already retrieved —
    /// a record is handed out at most once.
    pub fn take_many(&self, ids: &[TaskId]) -> HashMap<TaskId, Option<UploadEvent>> {
        let (result, removed_any) = {
            let mut state = self.state.lock();
            let mut result = HashMap::with_capacity(ids.len());
            let mut removed_any = false;
            for id in ids {
                let event = state.remove(id);
                removed_any |= event.is_some();
                result.insert(id.clone(), event);
            }
            (result, removed_any)
        };
        if removed_any {
            self.persist_logged();
        }
        result
    }

    /// Read-only copy of the current map, for inspection tooling.
    pub fn snapshot(&self) -> HashMap<TaskId, UploadEvent> {
        self.state.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    /// Write the current map to disk, atomically (temp file + rename) so a
    /// crash mid-write never leaves a partial snapshot.
    pub fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock();
        let json = {
            let state = self.state.lock();
            serde_json::to_vec_pretty(&*state)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist saved events");
        }
    }
}
