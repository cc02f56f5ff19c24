//! Ties C2–C7 together into the public `submit` operation — spec §6.

use crate::accumulator::Accumulator;
use crate::cleanup::Cleanup;
use crate::collector::Collector;
use crate::envelope::EnvelopeBuilder;
use crate::producer::TaskProducer;
use crate::registry;
use crate::types::{InfoItem, InfoValue, JobSpec, SubmitOutcome};
use redwork_ids::JobId;
use redwork_protocol::defaults::PRODUCT_NAME;
use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{ConfigError, DispatchError, ReduceSpec};
use redwork_store::StoreFacade;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Everything [`submit_with`] needs beyond the job itself — the slice of
/// `Registry` state a submission actually reads. Split out from the
/// singleton-backed `submit` so the guard/cancellation wiring can be driven
/// directly against a test store (e.g. `testkit::FakeStore`) without going
/// through the process-wide registry, which a concurrently-running test
/// suite can't safely share.
pub struct SubmitContext {
    pub store: Arc<dyn StoreFacade>,
    pub queue: String,
    pub chunk_size: NonZeroUsize,
    pub export: HashSet<String>,
    pub packages: Vec<String>,
    pub reduce: ReduceSpec,
    pub ft_interval: Duration,
    pub envelope_cap_bytes: u64,
}

/// Fires [`Cleanup::run`] if a submission is dropped without having
/// disarmed it first — the caller being interrupted between any two store
/// operations (spec §5 "Cancellation") still leaves no partial state for
/// job `J`. Async cleanup can't run inside a synchronous `Drop`, so this
/// spawns it as a detached task on the ambient runtime, same as the normal
/// completion path does explicitly.
struct SubmissionGuard {
    store: Arc<dyn StoreFacade>,
    queue: String,
    job_id: String,
    armed: bool,
}

impl SubmissionGuard {
    fn new(store: Arc<dyn StoreFacade>, queue: String, job_id: String) -> Self {
        Self { store, queue, job_id, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let queue = self.queue.clone();
        let job_id = self.job_id.clone();
        tokio::spawn(async move {
            if let Err(err) = Cleanup::run(&store, &queue, &job_id).await {
                error!(job_id, error = %err, "cleanup after dropped submission failed");
            }
        });
    }
}

/// Drives C3 → C4 → C5 → C7 for one job and returns the reduced result —
/// spec §6's `submit(job)`. Reads the process-wide registry singleton once,
/// up front, then hands off to [`submit_with`] for the actual work.
pub async fn submit(job: JobSpec) -> Result<SubmitOutcome, DispatchError> {
    let ctx = {
        let registry = registry::global().lock().unwrap();
        SubmitContext {
            store: registry.store()?,
            queue: registry.queue_name()?,
            chunk_size: job.chunk_size.unwrap_or(registry.chunk_size),
            export: registry.export.clone(),
            packages: registry.packages.clone(),
            reduce: registry.reduce.clone(),
            ft_interval: registry.ft_interval,
            envelope_cap_bytes: registry.envelope_cap_bytes,
        }
    };
    submit_with(ctx, job).await
}

/// The actual C3 → C4 → C5 → C7 pipeline, parameterized over an explicit
/// [`SubmitContext`] instead of the global registry singleton. `submit` is
/// the public, registry-backed entry point; tests that want to exercise the
/// guard/cancellation wiring against `testkit::FakeStore` call this directly.
pub async fn submit_with(ctx: SubmitContext, job: JobSpec) -> Result<SubmitOutcome, DispatchError> {
    let SubmitContext {
        store,
        queue,
        chunk_size,
        export: registry_export,
        packages: registry_packages,
        reduce: registry_reduce,
        ft_interval,
        envelope_cap_bytes: envelope_cap,
    } = ctx;
    let mut packages = registry_packages;
    packages.extend(job.packages.clone());

    let job_id = JobId::new();
    let mut guard = SubmissionGuard::new(store.clone(), queue.clone(), job_id.to_string());
    let cancellation = job.cancellation;
    let mut stream = job.stream;

    // The caller may be interrupted between any two store operations (spec
    // §5). Checked explicitly at each phase boundary so an interrupt caught
    // here still runs `Cleanup` before returning, same as `Collector`'s
    // in-loop check — rather than relying solely on `SubmissionGuard`'s
    // best-effort detached cleanup on drop.
    macro_rules! bail_if_cancelled {
        () => {
            if cancellation.is_cancelled() {
                let cleanup_result = Cleanup::run(&store, &queue, job_id.as_str()).await;
                guard.disarm();
                cleanup_result?;
                return Err(DispatchError::Interrupt { job: job_id.to_string() });
            }
        };
    }

    let reduce = job.reduce.clone().unwrap_or(registry_reduce);
    let two_level = !matches!(reduce, ReduceSpec::None);
    let resolved_combine = match &reduce {
        ReduceSpec::None => None,
        ReduceSpec::Same => job.combine.clone(),
        ReduceSpec::Explicit(blob) => Some(blob.clone()),
    };
    if two_level && resolved_combine.is_none() {
        return Err(ConfigError::MissingCombine.into());
    }

    bail_if_cancelled!();

    let envelope = EnvelopeBuilder::build(
        job.expr,
        &job.caller_scope,
        &job.auto_discovered,
        &job.noexport,
        &job.export,
        &registry_export,
        packages,
        resolved_combine,
        envelope_cap,
    )?;

    let keys = QueueKeys::new(&queue);
    store.set(&keys.env(job_id.as_str()), serde_json::to_vec(&envelope)?).await?;

    bail_if_cancelled!();

    // Checkpointed so cleanup can restore the caller's stream to its
    // pre-submission position regardless of how this job ends — spec §4.7
    // step 4.
    let stream_checkpoint = stream.checkpoint();

    let produced = TaskProducer::produce(
        job.producer,
        stream.as_mut(),
        job_id.as_str(),
        chunk_size,
        two_level,
        &store,
        &queue,
    )
    .await?;

    let mut accumulator = job.accumulator;
    let collect_result = Collector::run(
        &store,
        &queue,
        job_id.as_str(),
        &produced,
        accumulator.as_mut(),
        ft_interval,
        job.on_error,
        &cancellation,
    )
    .await;

    // Cleanup runs regardless of how collection ended — spec §4.7 runs "on
    // normal exit, interrupt, or error".
    let cleanup_result = Cleanup::run(&store, &queue, job_id.as_str()).await;
    stream.restore(&stream_checkpoint);
    guard.disarm();

    let collected = collect_result?;
    cleanup_result?;

    Ok(SubmitOutcome {
        job_id: job_id.to_string(),
        result: accumulator.into_result(),
        delivered: collected.delivered.len(),
        errors: collected.errors,
    })
}

/// `info(item)` — spec §6: advisory worker counter, constant identifier,
/// build version.
pub async fn info(item: InfoItem) -> Result<InfoValue, DispatchError> {
    match item {
        InfoItem::Name => Ok(InfoValue::Name(PRODUCT_NAME.to_string())),
        InfoItem::Version => Ok(InfoValue::Version(env!("CARGO_PKG_VERSION").to_string())),
        InfoItem::Workers => {
            let (store, queue) = {
                let registry = registry::global().lock().unwrap();
                (registry.store()?, registry.queue_name()?)
            };
            let keys = QueueKeys::new(&queue);
            let count = match store.get(&keys.count()).await? {
                Some(raw) => String::from_utf8_lossy(&raw).trim().parse().unwrap_or(0),
                None => 0,
            };
            Ok(InfoValue::Workers(count))
        }
    }
}
