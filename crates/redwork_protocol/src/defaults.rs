//! Canonical default values shared across the dispatcher.

use std::time::Duration;

/// Default Redis host for `register(..)` when the caller doesn't specify one.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;
/// Default Redis logical database index.
pub const DEFAULT_DB: i64 = 0;

/// Default chunk size (tasks per pushed chunk) — spec §4.2.
pub const DEFAULT_CHUNK_SIZE: usize = 1;

/// Default fault-tolerance poll interval — spec §4.6.
pub const DEFAULT_FT_INTERVAL: Duration = Duration::from_secs(30);
/// The floor `ftInterval` is clamped to — spec §4.6.
pub const MIN_FT_INTERVAL: Duration = Duration::from_secs(3);

/// Default envelope size cap — spec §4.3 step 4.
pub const DEFAULT_ENVELOPE_CAP_BYTES: u64 = 500 * 1024 * 1024;

/// How often the fault detector's stale-worker sweep may run at minimum, so a
/// misconfigured caller can't busy-loop MGET against the store.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Safety factor a declared worker heartbeat interval must clear relative to
/// `ftInterval` — spec §9 open question, resolved in DESIGN.md.
pub const MIN_HEARTBEAT_SAFETY_FACTOR: u32 = 2;

/// The constant identifier returned by `info(Name)`.
pub const PRODUCT_NAME: &str = "redwork";
