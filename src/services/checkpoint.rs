//! Conversational checkpoints keyed by (thread, step).

use crate::models::Checkpoint;
use crate::storage::RecordStore;
use crate::Result;
use std::sync::Arc;

/// Short-term memory: saves and restores per-thread conversation state.
///
/// Each checkpoint stores an opaque JSON state payload under a step
/// identifier; `rewind` restores any earlier step without deleting the
/// steps after it.
pub struct ShortTermMemory {
    thread_id: String,
    store: Arc<dyn RecordStore>,
}

impl ShortTermMemory {
    /// Creates a checkpoint handle for one thread.
    #[must_use]
    pub fn new(thread_id: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            thread_id: thread_id.into(),
            store,
        }
    }

    /// Saves a checkpoint at `step_id`, replacing any prior state there.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save(&self, step_id: &str, state: serde_json::Value) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::new(self.thread_id.clone(), step_id, state);
        self.store.save_checkpoint(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// Loads the most recent checkpoint state, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn load_latest(&self) -> Result<Option<serde_json::Value>> {
        Ok(self
            .store
            .latest_checkpoint(&self.thread_id)
            .await?
            .map(|cp| cp.state))
    }

    /// Loads the state saved at `step_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn rewind(&self, step_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .store
            .checkpoint_at(&self.thread_id, step_id)
            .await?
            .map(|cp| cp.state))
    }

    /// Lists this thread's step identifiers in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn list_steps(&self) -> Result<Vec<String>> {
        self.store.list_checkpoint_steps(&self.thread_id).await
    }
}
