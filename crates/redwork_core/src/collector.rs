//! Result Collector & Reducer (C5) — spec §4.5.

use crate::accumulator::Accumulator;
use crate::fault::FaultDetector;
use crate::producer::ProducedJob;
use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{DispatchError, ErrorPolicy, ResultChunk};
use redwork_store::StoreFacade;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Collector;

pub struct CollectResult {
    pub delivered: HashSet<u64>,
    pub errors: Vec<(u64, String)>,
}

impl Collector {
    /// Loops `brpop(Q.out.J, ftInterval)` until every expected slot has
    /// arrived, handing control to the fault detector on each timeout —
    /// spec §4.5.
    pub async fn run(
        store: &Arc<dyn StoreFacade>,
        queue: &str,
        job_id: &str,
        produced: &ProducedJob,
        accumulator: &mut dyn Accumulator,
        ft_interval: Duration,
        on_error: ErrorPolicy,
        cancellation: &CancellationToken,
    ) -> Result<CollectResult, DispatchError> {
        let keys = QueueKeys::new(queue);
        let out_key = keys.out(job_id);

        let mut done = HashSet::new();
        let mut errors = Vec::new();
        let expected = produced.expected_outputs;

        while (done.len() as u64) < expected {
            let popped = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(DispatchError::Interrupt { job: job_id.to_string() });
                }
                result = store.brpop(&out_key, ft_interval) => result?,
            };
            match popped {
                None => {
                    FaultDetector::tick(store, queue, job_id, produced, &done).await?;
                }
                Some(raw) => {
                    let chunk: ResultChunk = serde_json::from_slice(&raw)?;
                    if done.contains(&chunk.slot) {
                        debug!(job_id, slot = chunk.slot, "dropping duplicate delivery");
                        continue;
                    }
                    match accumulator.combine(chunk.slot, chunk.value) {
                        Ok(()) => {
                            done.insert(chunk.slot);
                        }
                        Err(message) => {
                            warn!(job_id, slot = chunk.slot, error = %message, "combine error");
                            done.insert(chunk.slot);
                            if matches!(on_error, ErrorPolicy::Stop) {
                                return Err(DispatchError::CombineError { slot: chunk.slot, message });
                            }
                            errors.push((chunk.slot, message));
                        }
                    }
                }
            }
        }

        Ok(CollectResult { delivered: done, errors })
    }
}
