//! Cleanup / Interrupt Handler (C7) — spec §4.7.

use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{DispatchError, TaskChunk};
use redwork_store::StoreFacade;
use std::sync::Arc;
use tracing::info;

pub struct Cleanup;

impl Cleanup {
    /// Runs on normal completion, caller interrupt, or collection error:
    /// snapshots `Q`, deletes `Q` and the job's start markers atomically,
    /// re-pushes every chunk belonging to *other* jobs, then deletes
    /// `Q.env.J` and `Q.out.J` — spec §4.7 steps 1–3. Restoring the
    /// master-side RNG state (step 4) is the caller's responsibility since
    /// this function doesn't own the `StreamSource`.
    pub async fn run(store: &Arc<dyn StoreFacade>, queue: &str, job_id: &str) -> Result<(), DispatchError> {
        let keys = QueueKeys::new(queue);

        let snapshot = store.lrange(&keys.tasks(), 0, -1).await?;
        let start_markers = store.keys(&keys.start_pattern(job_id)).await?;

        let mut batch = store.batch();
        batch.del(&keys.tasks());
        for marker in &start_markers {
            batch.del(marker);
        }

        let mut preserved = 0usize;
        let mut dropped = 0usize;
        for raw in &snapshot {
            match serde_json::from_slice::<TaskChunk>(raw) {
                Ok(chunk) if chunk.id != job_id => {
                    batch.rpush(&keys.tasks(), raw.clone());
                    preserved += 1;
                }
                Ok(_) => dropped += 1,
                Err(_) => {
                    // A chunk we can't decode isn't ours to judge; preserve
                    // it rather than silently discarding another master's data.
                    batch.rpush(&keys.tasks(), raw.clone());
                    preserved += 1;
                }
            }
        }
        store.execute_batch(batch).await?;

        store.del(&[keys.env(job_id), keys.out(job_id)]).await?;

        info!(job_id, preserved, dropped, "cleanup complete");
        Ok(())
    }
}
