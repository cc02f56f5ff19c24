//! Queue Registry (C2) — spec §4.2.
//!
//! Process-wide configuration, threaded explicitly through the internal
//! components (`EnvelopeBuilder`, `TaskProducer`, `Collector`,
//! `FaultDetector`, `Cleanup` each take an explicit `&Registry` /
//! `Arc<dyn StoreFacade>`); the singleton in [`global`] is confined to the
//! public free-function facade in `lib.rs`, per the design notes in spec §9.

use redwork_protocol::defaults::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DB, DEFAULT_ENVELOPE_CAP_BYTES, DEFAULT_FT_INTERVAL, DEFAULT_HOST,
    DEFAULT_PORT, MIN_FT_INTERVAL, MIN_HEARTBEAT_SAFETY_FACTOR,
};
use redwork_protocol::naming::{is_safe_key_component, QueueKeys};
use redwork_protocol::{ConfigError, DispatchError, ReduceSpec};
use redwork_store::{RedisStore, StoreFacade};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Options accepted by [`Registry::register`] — the caller-facing
/// `register(queue, host, port, password?, ...)` operation from spec §6.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub queue: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// `ftInterval`; clamped to `MIN_FT_INTERVAL` if lower.
    pub ft_interval: Option<Duration>,
    /// The worker heartbeat interval the caller intends to use, validated
    /// against `ft_interval` at registration time (spec §9 open question).
    pub heartbeat_interval: Option<Duration>,
}

impl RegisterOptions {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            db: DEFAULT_DB,
            ft_interval: None,
            heartbeat_interval: None,
        }
    }
}

/// Process-wide configuration — spec §4.2's table of options, each with a
/// default.
pub struct Registry {
    pub queue: Option<String>,
    pub chunk_size: NonZeroUsize,
    pub export: HashSet<String>,
    pub packages: Vec<String>,
    pub reduce: ReduceSpec,
    pub ft_interval: Duration,
    pub heartbeat_interval: Option<Duration>,
    pub envelope_cap_bytes: u64,
    store: Option<Arc<dyn StoreFacade>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            queue: None,
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).expect("default chunk size is nonzero"),
            export: HashSet::new(),
            packages: Vec::new(),
            reduce: ReduceSpec::None,
            ft_interval: DEFAULT_FT_INTERVAL,
            heartbeat_interval: None,
            envelope_cap_bytes: DEFAULT_ENVELOPE_CAP_BYTES,
            store: None,
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store connection and writes `Q.live` if absent — spec
    /// §4.2: "Connection opening to the store is part of registration."
    pub async fn register(&mut self, opts: RegisterOptions) -> Result<(), DispatchError> {
        if opts.queue.is_empty() {
            return Err(ConfigError::EmptyQueueName.into());
        }
        if !is_safe_key_component(&opts.queue) {
            return Err(ConfigError::UnsafeQueueName(opts.queue).into());
        }

        let ft_interval = opts.ft_interval.unwrap_or(DEFAULT_FT_INTERVAL).max(MIN_FT_INTERVAL);
        if let Some(heartbeat) = opts.heartbeat_interval {
            let safety_factor = MIN_HEARTBEAT_SAFETY_FACTOR as f64;
            if heartbeat.as_secs_f64() * safety_factor >= ft_interval.as_secs_f64() {
                return Err(ConfigError::HeartbeatTooSlow {
                    heartbeat_secs: heartbeat.as_secs_f64(),
                    ft_interval_secs: ft_interval.as_secs_f64(),
                    safety_factor: MIN_HEARTBEAT_SAFETY_FACTOR,
                }
                .into());
            }
        }

        let store = RedisStore::connect(&opts.host, opts.port, opts.db, opts.password.as_deref())
            .await
            .map_err(DispatchError::StoreUnavailable)?;
        let store: Arc<dyn StoreFacade> = Arc::new(store);

        let keys = QueueKeys::new(&opts.queue);
        if !store.exists(&keys.live()).await? {
            store.set(&keys.live(), Vec::new()).await?;
        }

        self.queue = Some(opts.queue);
        self.store = Some(store);
        self.ft_interval = ft_interval;
        self.heartbeat_interval = opts.heartbeat_interval;
        tracing::info!(queue = self.queue.as_deref(), "queue registered");
        Ok(())
    }

    /// Deletes `Q`, and all keys matching `Q.env.*`, `Q.out.*`, `Q.count`,
    /// `Q.live` — spec §4.2. Idempotent: a second call with nothing
    /// registered returns `Ok(())` rather than erroring, matching the
    /// "`removeQueue` followed by `removeQueue` is a no-op" property.
    pub async fn teardown(&mut self, queue: &str) -> Result<(), DispatchError> {
        let store = match &self.store {
            Some(store) if self.queue.as_deref() == Some(queue) => store.clone(),
            _ => return Ok(()),
        };
        let keys = QueueKeys::new(queue);
        let mut to_delete = vec![keys.tasks(), keys.live(), keys.count()];
        to_delete.extend(store.keys(&keys.env_pattern()).await?);
        to_delete.extend(store.keys(&keys.out_pattern()).await?);
        store.del(&to_delete).await?;

        self.queue = None;
        self.store = None;
        tracing::info!(queue, "queue removed");
        Ok(())
    }

    pub fn store(&self) -> Result<Arc<dyn StoreFacade>, DispatchError> {
        self.store.clone().ok_or(DispatchError::NotRegistered)
    }

    pub fn queue_name(&self) -> Result<String, DispatchError> {
        self.queue.clone().ok_or(DispatchError::NotRegistered)
    }
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

/// The process-wide singleton — confined to the public API facade in
/// `lib.rs`. Internal components never reach into this directly.
pub fn global() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}
