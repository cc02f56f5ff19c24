//! Fault Detector & Resubmitter (C6) — spec §4.6.

use crate::producer::ProducedJob;
use redwork_protocol::naming::{strip_marker_token, MarkerKind, QueueKeys};
use redwork_protocol::{DispatchError, TaskChunk};
use redwork_store::StoreFacade;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;

pub struct FaultDetector;

impl FaultDetector {
    /// Runs one reconciliation pass, triggered by the collector on every
    /// `brpop` timeout. Procedure is spec §4.6 steps 1–5 verbatim.
    pub async fn tick(
        store: &Arc<dyn StoreFacade>,
        queue: &str,
        job_id: &str,
        produced: &ProducedJob,
        done: &HashSet<u64>,
    ) -> Result<(), DispatchError> {
        let keys = QueueKeys::new(queue);

        let started = store.keys(&keys.start_pattern(job_id)).await?;
        let alive = store.keys(&keys.alive_pattern(job_id)).await?;
        let alive_tokens: HashSet<&str> =
            alive.iter().filter_map(|k| strip_marker_token(k, queue, job_id, MarkerKind::Alive)).collect();

        let faulted: Vec<&String> = started
            .iter()
            .filter(|key| {
                strip_marker_token(key, queue, job_id, MarkerKind::Start)
                    .map(|token| !alive_tokens.contains(token))
                    .unwrap_or(false)
            })
            .collect();

        if !faulted.is_empty() {
            Self::resubmit_faulted(store, queue, job_id, produced, &faulted).await?;
            return Ok(());
        }

        // Step 5: queue empty, no active claims, job incomplete — the
        // "silently lost result" case.
        let queue_len = store.llen(&keys.tasks()).await?;
        if queue_len == 0 && started.is_empty() {
            Self::resubmit_missing_slots(store, queue, job_id, produced, done).await?;
        }

        Ok(())
    }

    async fn resubmit_faulted(
        store: &Arc<dyn StoreFacade>,
        queue: &str,
        job_id: &str,
        produced: &ProducedJob,
        faulted: &[&String],
    ) -> Result<(), DispatchError> {
        let keys = QueueKeys::new(queue);
        let marker_keys: Vec<String> = faulted.iter().map(|k| k.to_string()).collect();
        let values = store.mget(&marker_keys).await?;

        let mut batch = store.batch();
        let mut resubmitted = Vec::new();

        for (key, value) in marker_keys.iter().zip(values) {
            batch.del(key);
            let Some(raw) = value else { continue };
            let Ok(indices) = serde_json::from_slice::<Vec<u64>>(&raw) else { continue };
            if indices.is_empty() {
                continue;
            }

            let args_list: BTreeMap<_, _> = indices
                .iter()
                .filter_map(|idx| produced.retained_args.get(idx).map(|tuple| (*idx, tuple.clone())))
                .collect();
            let slot = produced
                .chunk_by_slot
                .iter()
                .find(|(_, chunk_indices)| chunk_indices.as_slice() == indices.as_slice())
                .map(|(slot, _)| *slot);

            let chunk = TaskChunk { id: job_id.to_string(), args_list, slot };
            batch.rpush(&keys.tasks(), serde_json::to_vec(&chunk)?);
            resubmitted.extend(indices);
        }

        store.execute_batch(batch).await?;
        warn!(job_id, tokens = faulted.len(), indices = ?resubmitted, "resubmitted tasks from faulted workers");
        Ok(())
    }

    async fn resubmit_missing_slots(
        store: &Arc<dyn StoreFacade>,
        queue: &str,
        job_id: &str,
        produced: &ProducedJob,
        done: &HashSet<u64>,
    ) -> Result<(), DispatchError> {
        if produced.expected_outputs == 0 {
            return Ok(());
        }
        let missing: Vec<u64> = (1..=produced.expected_outputs).filter(|slot| !done.contains(slot)).collect();
        if missing.is_empty() {
            return Ok(());
        }

        let keys = QueueKeys::new(queue);
        let mut batch = store.batch();
        for slot in &missing {
            let indices = produced.chunk_by_slot.get(slot).cloned().unwrap_or_else(|| vec![*slot]);
            let args_list: BTreeMap<_, _> = indices
                .iter()
                .filter_map(|idx| produced.retained_args.get(idx).map(|tuple| (*idx, tuple.clone())))
                .collect();
            let slot_field = produced.chunk_by_slot.contains_key(slot).then_some(*slot);
            let chunk = TaskChunk { id: job_id.to_string(), args_list, slot: slot_field };
            batch.rpush(&keys.tasks(), serde_json::to_vec(&chunk)?);
        }
        store.execute_batch(batch).await?;
        warn!(job_id, slots = ?missing, "resubmitted missing slots: queue empty, no active workers");
        Ok(())
    }
}
