//! Caller-facing types for the public API — spec §6.

use crate::accumulator::Accumulator;
use crate::external::{ArgsProducer, StreamSource};
use redwork_protocol::{Blob, ErrorPolicy, ReduceSpec};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use tokio_util::sync::CancellationToken;

/// One submission — everything `submit` needs beyond the process-wide
/// `Registry`.
pub struct JobSpec {
    /// The opaque, pre-serialized user expression.
    pub expr: Blob,
    /// Every binding resolvable in the caller's scope, keyed by name.
    pub caller_scope: HashMap<String, Blob>,
    /// Free symbols discovered by walking `expr` (auto-discovery input;
    /// parsing `expr` itself is an external concern — see spec §4.3 step 2).
    pub auto_discovered: HashSet<String>,
    /// Symbols excluded from auto-discovery.
    pub noexport: HashSet<String>,
    /// Per-job explicit export names, merged with the registry's.
    pub export: Vec<String>,
    /// Per-job extra packages, merged with the registry's.
    pub packages: Vec<String>,
    /// Per-job reduce override; falls back to the registry's `reduce` when `None`.
    pub reduce: Option<ReduceSpec>,
    /// The combine function body, used directly under `ReduceSpec::Same`.
    pub combine: Option<Blob>,
    pub on_error: ErrorPolicy,
    /// Per-job chunk size override; falls back to the registry's when `None`.
    pub chunk_size: Option<NonZeroUsize>,
    pub producer: Box<dyn ArgsProducer>,
    pub stream: Box<dyn StreamSource>,
    pub accumulator: Box<dyn Accumulator>,
    /// Cancelled by the caller to interrupt collection early — spec §5's
    /// "Cancellation" case. Async analogue of the teacher's stop-channel
    /// shutdown signal, since this crate's event loop is all `.await`-based
    /// rather than a polled `try_recv`.
    pub cancellation: CancellationToken,
}

/// What `submit` returns once every expected slot has arrived and cleanup
/// has run.
pub struct SubmitOutcome {
    pub job_id: String,
    pub result: Blob,
    pub delivered: usize,
    /// Combine errors captured under `ErrorPolicy::Pass` — empty under
    /// `ErrorPolicy::Stop`, since the first one there aborts the submission.
    pub errors: Vec<(u64, String)>,
}

/// `info(item)` — spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoItem {
    Workers,
    Name,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Workers(u64),
    Name(String),
    Version(String),
}
