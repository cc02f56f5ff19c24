//! Task Producer (C4) — spec §4.4.

use crate::external::{ArgsProducer, StreamSource};
use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{ArgsTuple, DispatchError, TaskChunk};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use redwork_store::StoreFacade;

/// Everything the job's producer materialized, retained for resubmission —
/// spec §4.6 needs to reconstruct a lost chunk from the original `argsList`.
pub struct ProducedJob {
    /// Task index → its argument tuple (with RNG stream appended).
    pub retained_args: BTreeMap<u64, ArgsTuple>,
    /// Output slot → the task indices that fold into it. Populated only
    /// under two-level reduction; under single-level reduction each index
    /// is its own slot, so this stays empty and callers fall back to
    /// treating the slot number as the index.
    pub chunk_by_slot: BTreeMap<u64, Vec<u64>>,
    /// Number of distinct results the collector should expect (`M` in
    /// spec §4.5): chunk count under two-level reduction, else task count.
    pub expected_outputs: u64,
}

pub struct TaskProducer;

impl TaskProducer {
    /// Materializes the iteration into a finite, 1-indexed task sequence,
    /// chunks it, and pushes the chunks onto `Q` in index order via a
    /// single pipelined batch — spec §4.4.
    pub async fn produce(
        mut producer: Box<dyn ArgsProducer>,
        stream: &mut dyn StreamSource,
        job_id: &str,
        chunk_size: NonZeroUsize,
        two_level: bool,
        store: &Arc<dyn StoreFacade>,
        queue: &str,
    ) -> Result<ProducedJob, DispatchError> {
        let mut retained_args = BTreeMap::new();
        let mut index: u64 = 1;
        while let Some(args) = producer.next() {
            let tuple = ArgsTuple { args, stream: stream.next_stream() };
            retained_args.insert(index, tuple);
            index += 1;
        }
        let n = index - 1;

        let mut chunks = Vec::new();
        let mut chunk_by_slot = BTreeMap::new();
        let mut slot_counter: u64 = 0;
        let mut i = 1u64;
        while i <= n {
            let end = (i + chunk_size.get() as u64 - 1).min(n);
            let indices: Vec<u64> = (i..=end).collect();
            let args_list: BTreeMap<u64, ArgsTuple> = indices
                .iter()
                .map(|idx| (*idx, retained_args[idx].clone()))
                .collect();

            let slot = if two_level {
                slot_counter += 1;
                chunk_by_slot.insert(slot_counter, indices);
                Some(slot_counter)
            } else {
                None
            };

            chunks.push(TaskChunk { id: job_id.to_string(), args_list, slot });
            i = end + 1;
        }

        let keys = QueueKeys::new(queue);
        let mut batch = store.batch();
        for chunk in &chunks {
            let encoded = serde_json::to_vec(chunk)?;
            batch.rpush(&keys.tasks(), encoded);
        }
        store.execute_batch(batch).await?;

        let expected_outputs = if two_level { slot_counter } else { n };

        Ok(ProducedJob { retained_args, chunk_by_slot, expected_outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::VecArgsProducer;
    use crate::rng::DefaultStreamSource;
    use redwork_protocol::Blob;
    use redwork_store::StoreFacade as _;

    fn args(n: usize) -> Vec<Vec<Blob>> {
        (1..=n).map(|i| vec![Blob::new(i.to_string().into_bytes())]).collect()
    }

    #[tokio::test]
    async fn chunks_single_level_by_index() {
        let store: Arc<dyn StoreFacade> = crate::testkit::FakeStore::new();
        let produced = TaskProducer::produce(
            Box::new(VecArgsProducer::new(args(10))),
            &mut DefaultStreamSource::new(1),
            "job1",
            NonZeroUsize::new(3).unwrap(),
            false,
            &store,
            "q",
        )
        .await
        .unwrap();

        assert_eq!(produced.expected_outputs, 10);
        assert_eq!(produced.retained_args.len(), 10);
        assert!(produced.chunk_by_slot.is_empty());
        assert_eq!(store.llen("q").await.unwrap(), 4); // 3+3+3+1
    }

    #[tokio::test]
    async fn two_level_reduction_groups_indices_per_slot() {
        let store: Arc<dyn StoreFacade> = crate::testkit::FakeStore::new();
        let produced = TaskProducer::produce(
            Box::new(VecArgsProducer::new(args(7))),
            &mut DefaultStreamSource::new(1),
            "job1",
            NonZeroUsize::new(3).unwrap(),
            true,
            &store,
            "q",
        )
        .await
        .unwrap();

        assert_eq!(produced.expected_outputs, 3); // ceil(7/3)
        assert_eq!(produced.chunk_by_slot.len(), 3);
        assert_eq!(produced.chunk_by_slot[&1], vec![1, 2, 3]);
        assert_eq!(produced.chunk_by_slot[&3], vec![7]);
    }
}
