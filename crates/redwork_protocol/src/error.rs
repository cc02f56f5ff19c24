//! Shared error type for the dispatcher, covering every kind in spec §7.

use thiserror::Error;

/// Errors surfaced by the public API (`register`, `submit`, `remove_queue`, ...).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The store could not be reached or a command against it failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    /// An explicit `export` name could not be resolved in the caller's scope.
    #[error("export not found: {0}")]
    ExportNotFound(String),

    /// The serialized job envelope exceeded the configured cap.
    #[error("envelope too large: {size} bytes exceeds cap of {cap} bytes")]
    EnvelopeTooLarge { size: u64, cap: u64 },

    /// A worker's start marker had no corresponding alive key; its tasks were
    /// resubmitted. Non-fatal — the job continues.
    #[error("worker fault: resubmitted indices {indices:?} from token {token}")]
    WorkerFault { token: String, indices: Vec<u64> },

    /// The user combine function failed on a delivered result.
    #[error("combine error at slot {slot}: {message}")]
    CombineError { slot: u64, message: String },

    /// The caller was interrupted; cleanup ran before this was raised.
    #[error("interrupted: cleanup completed for job {job}")]
    Interrupt { job: String },

    /// No queue has been registered yet.
    #[error("no queue registered; call register(..) first")]
    NotRegistered,

    /// A `Registry` setting failed validation at registration time.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A value read back from the store didn't decode as expected.
    #[error("malformed wire value: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Validation failures for `Registry`/`FaultDetectorConfig` construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("queue name must not be empty")]
    EmptyQueueName,

    #[error("queue name {0:?} contains characters unsafe as a Redis key component")]
    UnsafeQueueName(String),

    #[error(
        "declared worker heartbeat interval ({heartbeat_secs}s) must be at least \
         {safety_factor}x shorter than ftInterval ({ft_interval_secs}s)"
    )]
    HeartbeatTooSlow {
        heartbeat_secs: f64,
        ft_interval_secs: f64,
        safety_factor: u32,
    },

    #[error("two-level reduction is enabled but no combine function was supplied")]
    MissingCombine,
}

/// Job-level policy for how a `CombineError` is handled — spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the submission with the first combine error, after drain.
    Stop,
    /// Let combine errors flow through the accumulator as ordinary values.
    #[default]
    Pass,
}
