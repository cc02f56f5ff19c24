//! End-to-end coverage for the master-side coordinator, driven entirely
//! against the in-memory [`redwork_core::testkit::FakeStore`] so these run
//! without a live Redis server. Each test wires the real `TaskProducer` /
//! `Collector` / `FaultDetector` / `Cleanup` components together the way
//! `dispatcher::submit` does, but stays off the process-wide registry
//! singleton so tests can run concurrently.

use redwork_core::cleanup::Cleanup;
use redwork_core::collector::Collector;
use redwork_core::envelope::EnvelopeBuilder;
use redwork_core::external::VecArgsProducer;
use redwork_core::fault::FaultDetector;
use redwork_core::producer::TaskProducer;
use redwork_core::rng::DefaultStreamSource;
use redwork_core::testkit::{FakeStore, SimulatedWorker};
use redwork_core::{Accumulator, Blob, DispatchError, JobSpec, SubmitContext};
use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{ArgsTuple, ErrorPolicy, ReduceSpec, TaskChunk};
use redwork_store::StoreFacade;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

struct SumAccumulator {
    total: i64,
}

impl SumAccumulator {
    fn new() -> Self {
        Self { total: 0 }
    }
}

impl Accumulator for SumAccumulator {
    fn combine(&mut self, _slot: u64, value: Blob) -> Result<(), String> {
        let n: i64 = std::str::from_utf8(value.as_bytes())
            .map_err(|e| e.to_string())?
            .parse()
            .map_err(|e: std::num::ParseIntError| e.to_string())?;
        self.total += n;
        Ok(())
    }

    fn into_result(self: Box<Self>) -> Blob {
        Blob::new(self.total.to_string().into_bytes())
    }
}

struct ConcatAccumulator {
    chunks: BTreeMap<u64, Blob>,
}

impl ConcatAccumulator {
    fn new() -> Self {
        Self { chunks: BTreeMap::new() }
    }
}

impl Accumulator for ConcatAccumulator {
    fn combine(&mut self, slot: u64, value: Blob) -> Result<(), String> {
        self.chunks.insert(slot, value);
        Ok(())
    }

    fn into_result(self: Box<Self>) -> Blob {
        let mut out = Vec::new();
        for value in self.chunks.into_values() {
            out.extend_from_slice(value.as_bytes());
        }
        Blob::new(out)
    }
}

fn letters(n: usize) -> Vec<Vec<Blob>> {
    (0..n).map(|i| vec![Blob::new(vec![b'a' + i as u8])]).collect()
}

fn integers(from: i64, to: i64) -> Vec<Vec<Blob>> {
    (from..=to).map(|i| vec![Blob::new(i.to_string().into_bytes())]).collect()
}

fn identity_process(_idx: u64, tuple: &ArgsTuple) -> Vec<u8> {
    tuple.args[0].as_bytes().to_vec()
}

#[tokio::test]
async fn single_level_reduce_sums_ten_tasks() {
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let produced = TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 10))),
        &mut DefaultStreamSource::new(1),
        "job-sum",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();
    assert_eq!(produced.expected_outputs, 10);

    let worker = SimulatedWorker::new(store.clone(), "q", "tok1");
    let pushed = worker.drain(identity_process).await;
    assert_eq!(pushed, 10);

    let mut accumulator = SumAccumulator::new();
    let result = Collector::run(
        &store,
        "q",
        "job-sum",
        &produced,
        &mut accumulator,
        Duration::from_millis(200),
        ErrorPolicy::Pass,
        &tokio_util::sync::CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.delivered.len(), 10);
    assert!(result.errors.is_empty());
    assert_eq!(Box::new(accumulator).into_result(), Blob::new(b"55".to_vec()));
}

#[tokio::test]
async fn two_level_reduce_concatenates_chunks_in_slot_order() {
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let produced = TaskProducer::produce(
        Box::new(VecArgsProducer::new(letters(10))),
        &mut DefaultStreamSource::new(2),
        "job-concat",
        NonZeroUsize::new(3).unwrap(),
        true,
        &store,
        "q",
    )
    .await
    .unwrap();
    assert_eq!(produced.expected_outputs, 4); // ceil(10/3)

    let worker = SimulatedWorker::new(store.clone(), "q", "tok1");
    let pushed = worker.drain(identity_process).await;
    assert_eq!(pushed, 4); // one result per chunk, not per task

    let mut accumulator = ConcatAccumulator::new();
    let result = Collector::run(
        &store,
        "q",
        "job-concat",
        &produced,
        &mut accumulator,
        Duration::from_millis(200),
        ErrorPolicy::Pass,
        &tokio_util::sync::CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.delivered.len(), 4);
    assert_eq!(Box::new(accumulator).into_result(), Blob::new(b"abcdefghij".to_vec()));
}

#[tokio::test]
async fn fault_detector_resubmits_tasks_from_a_crashed_worker() {
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let produced = TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 3))),
        &mut DefaultStreamSource::new(3),
        "job-fault",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();

    let keys = QueueKeys::new("q");

    // Worker pops one chunk, claims it, then vanishes before finishing —
    // start marker present, no matching alive marker, nothing pushed back.
    let raw = store.brpop(&keys.tasks(), Duration::from_millis(50)).await.unwrap().unwrap();
    let chunk: TaskChunk = serde_json::from_slice(&raw).unwrap();
    let lost_index = *chunk.args_list.keys().next().unwrap();
    store
        .set(&keys.start("job-fault", "crashed-tok"), serde_json::to_vec(&vec![lost_index]).unwrap())
        .await
        .unwrap();

    let done = std::collections::HashSet::new();
    FaultDetector::tick(&store, "q", "job-fault", &produced, &done).await.unwrap();

    // The crashed worker's start marker is gone and its task is back on the queue.
    assert!(store.keys(&keys.start_pattern("job-fault")).await.unwrap().is_empty());
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 3); // 2 untouched + 1 resubmitted

    let worker = SimulatedWorker::new(store.clone(), "q", "tok-retry");
    let pushed = worker.drain(identity_process).await;
    assert_eq!(pushed, 3);

    let mut accumulator = SumAccumulator::new();
    let result = Collector::run(
        &store,
        "q",
        "job-fault",
        &produced,
        &mut accumulator,
        Duration::from_millis(200),
        ErrorPolicy::Pass,
        &tokio_util::sync::CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(result.delivered.len(), 3);
    assert_eq!(Box::new(accumulator).into_result(), Blob::new(b"6".to_vec()));
}

#[tokio::test]
async fn cleanup_preserves_other_jobs_and_is_idempotent() {
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let keys = QueueKeys::new("q");

    TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 3))),
        &mut DefaultStreamSource::new(4),
        "job-a",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();
    TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 2))),
        &mut DefaultStreamSource::new(5),
        "job-b",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();
    store.set(&keys.env("job-a"), b"env-a".to_vec()).await.unwrap();
    store.set(&keys.start("job-a", "tok1"), b"[1]".to_vec()).await.unwrap();

    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 5);

    Cleanup::run(&store, "q", "job-a").await.unwrap();

    // job-a's chunks, start marker and envelope are gone...
    assert!(store.keys(&keys.start_pattern("job-a")).await.unwrap().is_empty());
    assert!(store.get(&keys.env("job-a")).await.unwrap().is_none());
    // ...but job-b's three remain on the shared queue untouched.
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 2);

    // Running it again is a no-op, not an error.
    Cleanup::run(&store, "q", "job-a").await.unwrap();
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 2);
}

#[tokio::test]
async fn missing_export_is_rejected_before_anything_is_queued() {
    let scope = std::collections::HashMap::new();
    let err = EnvelopeBuilder::build(
        Blob::new(b"expr".to_vec()),
        &scope,
        &Default::default(),
        &Default::default(),
        &["undefined_symbol".to_string()],
        &Default::default(),
        vec![],
        None,
        1024,
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::ExportNotFound(name) if name == "undefined_symbol"));
}

#[tokio::test]
async fn oversized_envelope_is_rejected_before_anything_is_queued() {
    let mut scope = std::collections::HashMap::new();
    scope.insert("payload".to_string(), Blob::new(vec![0u8; 4096]));
    let auto: std::collections::HashSet<String> = ["payload".to_string()].into_iter().collect();
    let err = EnvelopeBuilder::build(
        Blob::new(b"expr".to_vec()),
        &scope,
        &auto,
        &Default::default(),
        &[],
        &Default::default(),
        vec![],
        None,
        100,
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::EnvelopeTooLarge { cap: 100, .. }));
}

#[tokio::test]
async fn silently_lost_result_is_resubmitted_once_queue_drains() {
    // Queue empties and no worker holds a claim, but a slot never arrived —
    // the "worse than a crash" case spec's fault detector step 5 covers.
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let produced = TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 2))),
        &mut DefaultStreamSource::new(6),
        "job-silent",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();

    let worker = SimulatedWorker::new(store.clone(), "q", "tok1");
    // Drain and discard task 2's result (simulating it being dropped in flight).
    let keys = QueueKeys::new("q");
    worker.drain(identity_process).await;
    // Keep only slot 1's delivery, discard slot 2's so it looks never-arrived.
    while let Some(raw) = store.brpop(&keys.out("job-silent"), Duration::from_millis(10)).await.unwrap() {
        let result: redwork_protocol::ResultChunk = serde_json::from_slice(&raw).unwrap();
        if result.slot == 1 {
            store.rpush(&keys.out("job-silent"), raw).await.unwrap();
        }
    }

    let mut done = std::collections::HashSet::new();
    done.insert(1u64);
    FaultDetector::tick(&store, "q", "job-silent", &produced, &done).await.unwrap();

    // Slot 2 should be back on the task queue for a retry.
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_collection_without_waiting_for_ft_interval() {
    // A caller-triggered cancellation (spec §5) must win over an in-flight
    // `brpop`, even one with a long timeout, and surface as `Interrupt`.
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let produced = TaskProducer::produce(
        Box::new(VecArgsProducer::new(integers(1, 1))),
        &mut DefaultStreamSource::new(7),
        "job-cancel",
        NonZeroUsize::new(1).unwrap(),
        false,
        &store,
        "q",
    )
    .await
    .unwrap();

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let mut accumulator = SumAccumulator::new();
    let err = Collector::run(
        &store,
        "q",
        "job-cancel",
        &produced,
        &mut accumulator,
        Duration::from_secs(3600),
        ErrorPolicy::Pass,
        &token,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DispatchError::Interrupt { job } if job == "job-cancel"));
}

fn sum_job_spec(n: usize, cancellation: tokio_util::sync::CancellationToken) -> JobSpec {
    JobSpec {
        expr: Blob::new(b"expr".to_vec()),
        caller_scope: std::collections::HashMap::new(),
        auto_discovered: std::collections::HashSet::new(),
        noexport: std::collections::HashSet::new(),
        export: Vec::new(),
        packages: Vec::new(),
        reduce: None,
        combine: None,
        on_error: ErrorPolicy::Pass,
        chunk_size: Some(NonZeroUsize::new(1).unwrap()),
        producer: Box::new(VecArgsProducer::new(integers(1, n as i64))),
        stream: Box::new(DefaultStreamSource::new(11)),
        accumulator: Box::new(SumAccumulator::new()),
        cancellation,
    }
}

fn sum_submit_context(store: Arc<dyn StoreFacade>) -> SubmitContext {
    SubmitContext {
        store,
        queue: "q".to_string(),
        chunk_size: NonZeroUsize::new(1).unwrap(),
        export: std::collections::HashSet::new(),
        packages: Vec::new(),
        reduce: ReduceSpec::None,
        ft_interval: Duration::from_secs(5),
        envelope_cap_bytes: 1024 * 1024,
    }
}

#[tokio::test]
async fn submit_with_drives_the_full_pipeline_and_cleans_up() {
    // Exercises `dispatcher::submit_with` end to end — envelope build, task
    // production, collection, and cleanup — the path that previously had no
    // test coverage at all because `submit` could only be driven through the
    // registry singleton and a live store connection.
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let token = tokio_util::sync::CancellationToken::new();

    let worker_store = store.clone();
    let worker = tokio::spawn(async move {
        SimulatedWorker::new(worker_store, "q", "tok1").drain(identity_process).await
    });

    let outcome =
        redwork_core::submit_with(sum_submit_context(store.clone()), sum_job_spec(5, token))
            .await
            .unwrap();

    assert_eq!(worker.await.unwrap(), 5);
    assert_eq!(outcome.delivered, 5);
    assert!(outcome.errors.is_empty());
    assert_eq!(std::str::from_utf8(outcome.result.as_bytes()).unwrap(), "15");

    // Cleanup ran: no trace of the job's envelope, results, or queue left behind.
    let keys = QueueKeys::new("q");
    assert!(store.get(&keys.env(&outcome.job_id)).await.unwrap().is_none());
    assert!(store.get(&keys.out(&outcome.job_id)).await.unwrap().is_none());
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 0);
}

#[tokio::test]
async fn submit_with_honors_pre_cancelled_token_and_still_cleans_up() {
    // The `bail_if_cancelled!` phase check — added alongside the
    // `SubmissionGuard` cancellation fix — must short-circuit before any
    // task is ever dispatched, and still run cleanup before returning.
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let err = redwork_core::submit_with(sum_submit_context(store.clone()), sum_job_spec(5, token))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Interrupt { .. }));
    let keys = QueueKeys::new("q");
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 0);
}

#[tokio::test]
async fn submit_with_cancelled_mid_collection_cleans_up_dispatched_tasks() {
    // No worker ever picks these tasks up; cancelling partway through
    // collection must still drain `Q` of this job's chunks via `Cleanup`,
    // exercising the unconditional post-collection cleanup call rather than
    // the `bail_if_cancelled!` macro's early-phase check.
    let store: Arc<dyn StoreFacade> = FakeStore::new();
    let token = tokio_util::sync::CancellationToken::new();
    let canceller = token.clone();

    let submit_store = store.clone();
    let handle = tokio::spawn(async move {
        redwork_core::submit_with(sum_submit_context(submit_store), sum_job_spec(3, token)).await
    });

    // Give `submit_with` time to build the envelope and dispatch chunks
    // before pulling the rug out.
    tokio::time::sleep(Duration::from_millis(20)).await;
    canceller.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Interrupt { .. }));

    let keys = QueueKeys::new("q");
    assert_eq!(store.llen(&keys.tasks()).await.unwrap(), 0);
}
