use serde::{Deserialize, Serialize};

/// Singleton batch cursor persisted between scheduler invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchState {
    pub current_batch: u32,
    pub total_batches: u32,
    /// Epoch seconds of the last completed pass over all tracked users.
    pub last_full_sync: i64,
    pub users_synced: u64,
}

/// Field-level partial update for [`FetchState`]. Absent fields are
/// preserved on write, so a writer can never reset a field by accident.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStatePatch {
    pub current_batch: Option<u32>,
    pub total_batches: Option<u32>,
    pub last_full_sync: Option<i64>,
    pub users_synced: Option<u64>,
}

impl FetchState {
    pub fn apply(&mut self, patch: FetchStatePatch) {
        if let Some(current_batch) = patch.current_batch {
            self.current_batch = current_batch;
        }
        if let Some(total_batches) = patch.total_batches {
            self.total_batches = total_batches;
        }
        if let Some(last_full_sync) = patch.last_full_sync {
            self.last_full_sync = last_full_sync;
        }
        if let Some(users_synced) = patch.users_synced {
            self.users_synced = users_synced;
        }
    }
}
